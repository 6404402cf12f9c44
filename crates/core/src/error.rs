use thiserror::Error;

use crate::ids::PlaceholderId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unresolved placeholder: {0}")]
    UnresolvedPlaceholder(PlaceholderId),

    #[error("empty operation group")]
    EmptyGroup,

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
