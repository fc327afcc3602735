use thiserror::Error;

/// Top-level error taxonomy. Adapter failures are deliberately absent:
/// they are invocation-local, retried inside the orchestrator, and never
/// propagate past it. Only configuration and store-write failures are fatal.
#[derive(Error, Debug)]
pub enum VansweepError {
    #[error("Unknown strategy: {0}")]
    InvalidStrategy(String),

    #[error("Custom strategy requires at least one explicit key")]
    MissingCustomKeys,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store write error: {0}")]
    StoreWrite(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
