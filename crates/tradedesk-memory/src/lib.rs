pub mod embedder;
pub mod error;
pub mod memory;
pub mod scoring;
pub mod sqlite;
pub mod store;

pub use embedder::{Embedder, OpenAiEmbedder};
pub use error::MemoryError;
pub use sqlite::SqliteMemory;
pub use store::{MemoryStore, SqliteMemoryStore};
