use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use annolog_core::{Collection, EntityId};

use crate::error::StoreError;
use crate::traits::{CreateResponse, DeleteResponse, RemoteStore, UpdateResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(StoreError::Serialization(format!("unknown method: {s}"))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub status: u16,
    pub body: Value,
}

impl RestResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }
}

/// Moves one request to the backend and back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RestRequest) -> Result<RestResponse, StoreError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: RestRequest) -> Result<RestResponse, StoreError> {
        (**self).send(request).await
    }
}

/// [`RemoteStore`] speaking the `/{collection}/{id}` REST contract over a [`Transport`].
pub struct RestStore<T> {
    transport: T,
    project: Option<i64>,
}

impl<T: Transport> RestStore<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            project: None,
        }
    }

    /// Creation paths become `/{plural}/{project}`.
    pub fn with_project(mut self, project: i64) -> Self {
        self.project = Some(project);
        self
    }

    fn item_path(collection: &Collection, id: EntityId) -> String {
        format!("/{}/{}", collection.singular(), id)
    }

    fn list_path(&self, collection: &Collection) -> String {
        match self.project {
            Some(project) => format!("/{}/{}", collection.plural(), project),
            None => format!("/{}", collection.plural()),
        }
    }

    async fn call(
        &self,
        method: Method,
        path: String,
        body: Option<Value>,
    ) -> Result<Value, StoreError> {
        debug!(%method, %path, "sending request");
        let response = self
            .transport
            .send(RestRequest {
                method,
                path: path.clone(),
                body,
            })
            .await?;
        if !response.is_success() {
            return Err(StoreError::Status {
                method,
                path,
                status: response.status,
                message: response.message().unwrap_or("request failed").to_string(),
            });
        }
        Ok(response.body)
    }
}

fn message_of(body: &Value) -> Option<String> {
    body.get("message").and_then(Value::as_str).map(str::to_string)
}

/// A create response carries an `id` list; a bare integer is accepted too.
fn parse_ids(body: &Value) -> Result<Vec<EntityId>, StoreError> {
    let malformed = || StoreError::Malformed(format!("create response has no usable id: {body}"));
    match body.get("id") {
        Some(Value::Array(ids)) => ids
            .iter()
            .map(|v| v.as_i64().map(EntityId::new).ok_or_else(malformed))
            .collect(),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|id| vec![EntityId::new(id)])
            .ok_or_else(malformed),
        _ => Err(malformed()),
    }
}

#[async_trait]
impl<T: Transport> RemoteStore for RestStore<T> {
    async fn fetch(
        &self,
        collection: &Collection,
        id: EntityId,
    ) -> Result<Map<String, Value>, StoreError> {
        match self
            .call(Method::Get, Self::item_path(collection, id), None)
            .await?
        {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Malformed(format!(
                "expected an object for {collection} {id}, got {other}"
            ))),
        }
    }

    async fn create(
        &self,
        collection: &Collection,
        body: Map<String, Value>,
    ) -> Result<CreateResponse, StoreError> {
        let wrapped = Value::Array(vec![Value::Object(body)]);
        let body = self
            .call(Method::Post, self.list_path(collection), Some(wrapped))
            .await?;
        Ok(CreateResponse {
            ids: parse_ids(&body)?,
            message: message_of(&body),
            body,
        })
    }

    async fn update(
        &self,
        collection: &Collection,
        id: EntityId,
        body: Map<String, Value>,
    ) -> Result<UpdateResponse, StoreError> {
        let body = self
            .call(
                Method::Patch,
                Self::item_path(collection, id),
                Some(Value::Object(body)),
            )
            .await?;
        Ok(UpdateResponse {
            message: message_of(&body),
            object: body.get("object").filter(|o| o.is_object()).cloned(),
            body,
        })
    }

    async fn delete(
        &self,
        collection: &Collection,
        id: EntityId,
    ) -> Result<DeleteResponse, StoreError> {
        let body = self
            .call(Method::Delete, Self::item_path(collection, id), None)
            .await?;
        Ok(DeleteResponse {
            message: message_of(&body),
            body,
        })
    }
}
