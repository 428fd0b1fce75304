use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tradedesk_models::{AnalystKind, DecisionStatus, RunState, TradedeskConfig};

const DEFAULT_CONFIG: &str = "config/tradedesk.toml";

/// Exit code when no decision was possible.
const EXIT_NO_DECISION: u8 = 2;
/// Exit code when a decision exists but needs manual review.
const EXIT_UNCERTAIN: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "tradedesk", about = "Multi-agent trading decision pipeline")]
struct Cli {
    /// Ticker to decide on, e.g. NVDA
    subject: String,

    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: String,

    /// As-of date (YYYY-MM-DD); defaults to today
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Comma-separated analysts to run, e.g. market,news
    #[arg(short, long, value_delimiter = ',')]
    analysts: Option<Vec<AnalystKind>>,

    /// Research debate rounds
    #[arg(long)]
    debate_rounds: Option<u32>,

    /// Risk debate rounds
    #[arg(long)]
    risk_rounds: Option<u32>,

    /// Print every state snapshot as a JSON line while the run progresses
    #[arg(long)]
    stream: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Archive the final state under the configured results directory
    #[arg(long)]
    save: bool,

    /// Record a lesson for this run's situation in memory
    #[arg(long)]
    lesson: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &str) -> Result<TradedeskConfig> {
    if path == DEFAULT_CONFIG && !Path::new(path).exists() {
        warn!(path, "No config file found, using defaults");
        return Ok(TradedeskConfig::default());
    }
    tradedesk::load_config(path)
}

fn print_state(state: &RunState, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(state)?
    } else {
        serde_json::to_string(state)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing (respects RUST_LOG env var)
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;

    let as_of_date = cli
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let mut request = tradedesk::request_for(&config.run, &cli.subject, as_of_date);
    if let Some(analysts) = cli.analysts {
        request.analysts = analysts;
    }
    if let Some(rounds) = cli.debate_rounds {
        request.max_debate_rounds = rounds;
    }
    if let Some(rounds) = cli.risk_rounds {
        request.max_risk_rounds = rounds;
    }

    let coordinator =
        tradedesk::build_coordinator(&config).context("Failed to build coordinator")?;

    let mut handle = coordinator.start(request);
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let mut last = None;
    while let Some(update) = handle.next().await {
        match update {
            Ok(state) => {
                if cli.stream {
                    print_state(&state, false)?;
                }
                last = Some(state);
            }
            Err(e) if e.is_no_decision() => {
                error!(error = %e, "No decision possible");
                eprintln!("No decision possible: {e}");
                return Ok(ExitCode::from(EXIT_NO_DECISION));
            }
            Err(e) => return Err(anyhow::Error::new(e).context("Run failed")),
        }
    }

    let state = last
        .filter(RunState::is_concluded)
        .context("Run ended without a decision")?;

    if cli.save {
        tradedesk::archive_run(&config.run.results_dir, &state)?;
    }
    if let Some(lesson) = &cli.lesson {
        match coordinator.remember(&state, lesson).await {
            Ok(_) => info!(subject = state.subject(), "Lesson stored"),
            Err(e) => warn!(error = %e, "Failed to store lesson"),
        }
    }
    if !cli.stream {
        print_state(&state, cli.pretty)?;
    }

    match state.decision_status() {
        DecisionStatus::Decided(signal) => {
            info!(subject = state.subject(), %signal, "Decision reached");
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            warn!(subject = state.subject(), "No action signal, manual review required");
            Ok(ExitCode::from(EXIT_UNCERTAIN))
        }
    }
}
