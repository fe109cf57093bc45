// File: src/error.rs
use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, LatticeError>;

/// Failures surfaced to callers. Data insufficiency is never an error;
/// it shows up as statuses and counters on the produced artifacts.
#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("invalid configuration for `{field}`: {reason}")]
    Config { field: &'static str, reason: String },
    #[error("corpus contains no tokens")]
    EmptyCorpus,
    #[error("transition graph has no usable nodes")]
    EmptyGraph,
    #[error("requested {requested} windows but only {available} tokens are available")]
    WindowCountExceedsVocabulary { requested: usize, available: usize },
    #[error("lattice invariant violated: {0}")]
    InvariantViolation(String),
    #[error("unsupported artifact schema: {0}")]
    UnsupportedSchema(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("atomic write failed: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl LatticeError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        LatticeError::Config { field, reason: reason.into() }
    }
}
