use std::fmt::{Display, Formatter};

use lmdb::Error as LmdbError;
use serde_json::Error as SerdeError;

/// Failure kinds surfaced by every mutating call of the library.
///
/// `Validation` is a user-correctable input problem, `Storage` wraps any
/// failure of the underlying record store and passes its message through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Validation(String),
    Storage(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        AppError::Storage(msg.into())
    }

    /// The raw message without the kind prefix, as shown to the user.
    pub fn message(&self) -> &str {
        match self {
            AppError::Validation(msg) | AppError::Storage(msg) => msg,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<LmdbError> for AppError {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::MapFull => AppError::Storage("Database map is full".to_string()),
            LmdbError::Corrupted => AppError::Storage("Database is corrupted".to_string()),
            LmdbError::Other(code) => AppError::Storage(format!("LMDB error code {}", code)),
            _ => AppError::Storage(format!("LMDB error: {}", err)),
        }
    }
}

impl From<SerdeError> for AppError {
    fn from(err: SerdeError) -> Self {
        AppError::Storage(format!("Record encoding error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(format!("IO error: {}", err))
    }
}
