use thiserror::Error;

use crate::rest::Method;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{method} {path} failed with status {status}: {message}")]
    Status {
        method: Method,
        path: String,
        status: u16,
        message: String,
    },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("core error: {0}")]
    Core(#[from] annolog_core::CoreError),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
