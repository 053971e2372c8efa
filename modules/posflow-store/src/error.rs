use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("stored record {key} is unreadable: {reason}")]
    Corrupt { key: String, reason: String },

    /// Raised by `MemoryStore::fail_next`.
    #[error("injected store failure")]
    Injected,
}
