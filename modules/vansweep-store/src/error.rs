use thiserror::Error;

/// Durable-layer failures. All of these are fatal for the run: silent data
/// loss is unacceptable, so callers surface them instead of swallowing.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store write error: {0}")]
    Write(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
