use thiserror::Error;

/// Errors that can occur in the cache's index or file layers
///
/// An unreadable content file is not one of them: reads degrade to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Seed table is missing a '{0}' column")]
    MissingColumn(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
