use chrono::Utc;
use rusqlite::Connection;

use crate::error::MemoryError;

/// Schema for the situation memory.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS memory_entries (
///     id              INTEGER PRIMARY KEY AUTOINCREMENT,
///     situation       TEXT NOT NULL,
///     recommendation  TEXT NOT NULL,
///     embedding_json  TEXT,
///     created_at      TEXT NOT NULL
/// );
/// ```
pub const MEMORY_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS memory_entries (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    situation       TEXT NOT NULL,
    recommendation  TEXT NOT NULL,
    embedding_json  TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memory_created ON memory_entries(created_at);
";

/// A stored (situation, recommendation) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRow {
    pub id: i64,
    pub situation: String,
    pub recommendation: String,
    /// Present only for entries recorded in similarity mode.
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
}

/// SQLite accessor for the memory table. Owns the schema.
pub struct SqliteMemory {
    conn: Connection,
}

impl SqliteMemory {
    /// Open (or create) the memory database at `path`.
    pub fn open(path: &str) -> Result<Self, MemoryError> {
        if path == ":memory:" {
            return Self::open_in_memory();
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(MEMORY_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MEMORY_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Append an entry and return its id.
    pub fn insert(
        &self,
        situation: &str,
        recommendation: &str,
        embedding: Option<&[f32]>,
    ) -> Result<i64, MemoryError> {
        let embedding_json = embedding.map(serde_json::to_string).transpose()?;
        self.conn.execute(
            "INSERT INTO memory_entries (situation, recommendation, embedding_json, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                situation,
                recommendation,
                embedding_json,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All entries in insertion order.
    pub fn all(&self) -> Result<Vec<MemoryRow>, MemoryError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, situation, recommendation, embedding_json, created_at \
             FROM memory_entries ORDER BY id ASC",
        )?;

        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(id, situation, recommendation, embedding_json, created_at)| {
                let embedding = embedding_json
                    .map(|json| serde_json::from_str::<Vec<f32>>(&json))
                    .transpose()?;
                Ok(MemoryRow {
                    id,
                    situation,
                    recommendation,
                    embedding,
                    created_at,
                })
            })
            .collect()
    }

    pub fn count(&self) -> Result<u64, MemoryError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM memory_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
