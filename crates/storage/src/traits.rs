use async_trait::async_trait;
use serde_json::{Map, Value};

use annolog_core::{Collection, EntityId};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateResponse {
    pub ids: Vec<EntityId>,
    pub message: Option<String>,
    pub body: Value,
}

impl CreateResponse {
    pub fn first_id(&self) -> Result<EntityId, StoreError> {
        self.ids
            .first()
            .copied()
            .ok_or_else(|| StoreError::Malformed("create response carried no id".into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateResponse {
    pub message: Option<String>,
    /// Full resource returned by listable/versioned entities.
    pub object: Option<Value>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteResponse {
    pub message: Option<String>,
    pub body: Value,
}

/// CRUD over JSON entities with server-assigned ids.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Current state of one entity (the pre-image before a mutation).
    async fn fetch(
        &self,
        collection: &Collection,
        id: EntityId,
    ) -> Result<Map<String, Value>, StoreError>;

    async fn create(
        &self,
        collection: &Collection,
        body: Map<String, Value>,
    ) -> Result<CreateResponse, StoreError>;

    async fn update(
        &self,
        collection: &Collection,
        id: EntityId,
        body: Map<String, Value>,
    ) -> Result<UpdateResponse, StoreError>;

    async fn delete(
        &self,
        collection: &Collection,
        id: EntityId,
    ) -> Result<DeleteResponse, StoreError>;
}
