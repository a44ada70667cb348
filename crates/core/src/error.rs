use thiserror::Error;

/// Errors surfaced by the frontier and its store adapter.
///
/// `NothingToClaim` and the `FINISHED*` transitions it can trigger are
/// expected control flow, not failures: callers loop on `NothingToClaim`
/// with backoff. `UnexpectedDbResult` is always fatal to the operation that
/// raised it and should be logged and aborted, not retried.
#[derive(Error, Debug)]
pub enum FrontierError {
    #[error("nothing to claim")]
    NothingToClaim,

    #[error("reached limit: {marker}")]
    ReachedLimit { marker: String },

    #[error("unexpected db result: {detail}")]
    UnexpectedDbResult { detail: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Transport/store failure. Treated as transient by callers, who retry
    /// the outer claim/disclaim loop.
    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, FrontierError>;
