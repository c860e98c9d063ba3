use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Observation rejected before any write; nothing was stored.
    #[error("invalid endpoint observation: {0}")]
    Validation(String),
    /// The database stayed locked through every retry.
    #[error("database busy after {attempts} attempts")]
    Contention { attempts: u32 },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
