//! Error types for the session profiler.
//!
//! Each collaborator owns its own error enum and the consumer resolves those
//! per delivery. [`ProfilerError`] only covers bootstrap, where everything is
//! fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Startup error: {0}")]
    Startup(String),
}

impl From<sqlx::Error> for ProfilerError {
    fn from(err: sqlx::Error) -> Self {
        ProfilerError::Database(err.to_string())
    }
}

pub type ProfilerResult<T> = std::result::Result<T, ProfilerError>;
