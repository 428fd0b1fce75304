pub mod analyst;
pub mod config;
pub mod debate;
pub mod decision;
pub mod error;
pub mod memory_record;
pub mod request;
pub mod run_state;

pub use analyst::AnalystKind;
pub use config::{MemoryConfig, ProviderKind, ReasoningConfig, RunConfig, TradedeskConfig};
pub use debate::{
    DebateDelta, DebateRole, DebateState, ResearchDebateState, ResearchRole, RiskDebateState,
    RiskRole,
};
pub use decision::{ActionSignal, DecisionStatus, ExtractedSignal, ExtractionMethod};
pub use error::{ConfigError, StateError};
pub use memory_record::{MemoryMode, MemoryRecord};
pub use request::RunRequest;
pub use run_state::{
    AnalystReports, ReportOutcome, RunMessage, RunState, Stage, StateDelta, NOT_AVAILABLE,
};
