use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Engine-wide failure taxonomy. Per-node probe failures are not errors,
/// they are aggregated into the probe batch; everything here aborts (or has
/// already unwound) the operation that produced it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("subscription fetch failed: {0}")]
    Fetch(String),

    #[error("subscription parse failed: {msg} ({dropped} entries dropped)")]
    Parse { msg: String, dropped: usize },

    #[error("no reachable node in probe batch")]
    NoReachableNode,

    #[error("node {id}: last successful probe is {age_ms}ms old (freshness window {window_ms}ms)")]
    StaleProbe { id: String, age_ms: u64, window_ms: u64 },

    #[error("node not found: {0}")]
    NotFound(String),

    #[error("duplicate node id: {0}")]
    DuplicateId(String),

    #[error("chained mode requires a configured static proxy")]
    MissingStaticProxy,

    #[error("no active configuration has been applied yet")]
    NoActiveConfig,

    #[error("another switch is already in progress")]
    Busy,

    #[error("no restorable backup")]
    NoBackup,

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("serialize: {0}")]
    Json(#[from] serde_json::Error),

    /// The forward swap failed and the previous configuration was restored.
    #[error("switch rolled back: {0}")]
    RolledBack(String),

    /// The rollback itself failed; the daemon is in an unknown state and
    /// needs operator intervention. Never retried automatically.
    #[error("fatal: daemon could not be returned to a known-good state: {0}")]
    Fatal(String),
}

impl Error {
    /// Errors after which the previous good configuration is still in effect.
    pub fn preserved_previous_config(&self) -> bool {
        !matches!(self, Error::Fatal(_))
    }
}
