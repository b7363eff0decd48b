use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

use crate::app_error::AppError;

/// JSON envelope returned by every C ABI call.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppResponse {
    DatabaseError(String),
    SerializationError(String),
    ValidationError(String),
    BadRequest(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl From<AppError> for AppResponse {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => AppResponse::ValidationError(msg),
            AppError::Storage(msg) => AppResponse::DatabaseError(msg),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    /// `Ok` carrying `value` encoded as JSON.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => AppResponse::Ok(json),
            Err(e) => AppResponse::from(e),
        }
    }

    pub fn from_result<T: Serialize>(result: Result<T, AppError>) -> Self {
        match result {
            Ok(value) => AppResponse::json(&value),
            Err(e) => AppResponse::from(e),
        }
    }
}
