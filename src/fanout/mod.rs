//! Propagation of committed groups into the secondary chat store.
//!
//! The relational ledger and the chat store share no transaction. Groups are
//! announced through the `fanout_outbox` table, written in the same
//! transaction as the groups themselves, and [`Publisher`] drains it. Every
//! write is a full overwrite keyed by the canonical room id, so publishing the
//! same announcement again converges to the same state.

pub mod docs;
mod memory;
pub mod outbox;
mod publisher;
mod rtdb;

use async_trait::async_trait;
use serde_json::Value;

pub use memory::MemoryStore;
pub use publisher::{Publisher, RelayReport};
pub use rtdb::RealtimeDb;

#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    #[error("fan-out request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("fan-out store answered {status} for {path}")]
    Status { path: String, status: u16 },
    #[error("fan-out document could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid fan-out document: {0}")]
    Invalid(String),
    #[error("fan-out store unavailable: {0}")]
    Unavailable(String),
}

/// Document store the chat clients read from.
#[async_trait]
pub trait FanoutStore: Send + Sync {
    /// Replaces whatever is stored at `path`.
    async fn set(&self, path: &str, document: Value) -> Result<(), FanoutError>;

    /// Creates a new child under `path` and returns its generated key.
    async fn push(&self, path: &str) -> Result<String, FanoutError>;
}
