use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type EventsResult<T> = Result<T, EventsError>;
