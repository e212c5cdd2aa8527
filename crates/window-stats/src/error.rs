use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Out of order merge: bucket starting at minute {next} folded after minute {previous}")]
    OutOfOrder { previous: u64, next: u64 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StatsError>;
