use std::sync::Arc;

use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use annolog_core::{
    Body, Collection, CoreError, Deferred, EntityId, EntityType, IdRef, Operation, OperationGroup,
    Verb,
};
use annolog_storage::{RemoteStore, StoreError};

use crate::error::LedgerError;
use crate::inverse::{inverse_update_body, recreate_body};
use crate::notify::{Applied, Notifier};
use crate::reconcile::Rebind;

/// Outcome of one network operation.
#[derive(Debug, Clone)]
pub struct Response {
    pub verb: Verb,
    pub collection: Collection,
    /// Created id, or the target of an update/delete.
    pub id: Option<EntityId>,
    pub body: Value,
    /// Full resource echoed back by versioned updates.
    pub object: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyPolicy {
    All,
    /// Leave update notifications to the caller.
    SkipUpdates,
}

/// A failed group: the error plus identities changed while compensating.
#[derive(Debug)]
pub struct GroupFailure {
    pub error: LedgerError,
    pub rebinds: Vec<Rebind>,
}

impl From<LedgerError> for GroupFailure {
    fn from(error: LedgerError) -> Self {
        Self {
            error,
            rebinds: Vec::new(),
        }
    }
}

/// An operation with every reference resolved, ready for the wire.
#[derive(Debug, Clone)]
enum Request {
    Create {
        collection: Collection,
        body: Map<String, Value>,
    },
    Update {
        collection: Collection,
        id: EntityId,
        body: Map<String, Value>,
    },
    Delete {
        collection: Collection,
        id: EntityId,
    },
}

impl Request {
    fn prepare(op: &Operation) -> Result<Self, LedgerError> {
        let request = match op {
            Operation::Create {
                collection, body, ..
            } => Self::Create {
                collection: collection.clone(),
                body: body.resolve()?,
            },
            Operation::Update {
                collection,
                id,
                body,
                ..
            } => Self::Update {
                collection: collection.clone(),
                id: id.resolve()?,
                body: body.resolve()?,
            },
            Operation::Delete { collection, id, .. } => Self::Delete {
                collection: collection.clone(),
                id: id.resolve()?,
            },
            Operation::Deferred(_) => {
                return Err(CoreError::InvalidOperation(
                    "deferred operations are not sent".into(),
                )
                .into());
            }
        };
        Ok(request)
    }

    fn target(&self) -> Option<(&Collection, EntityId)> {
        match self {
            Self::Update { collection, id, .. } | Self::Delete { collection, id } => {
                Some((collection, *id))
            }
            Self::Create { .. } => None,
        }
    }
}

/// One network op of a group alongside the request built from it.
struct Prepared<'a> {
    op: &'a Operation,
    entity_type: &'a Arc<EntityType>,
    request: Request,
}

/// Issues operations against the remote store.
pub struct Executor {
    store: Arc<dyn RemoteStore>,
    notifier: Notifier,
}

impl Executor {
    pub fn new(store: Arc<dyn RemoteStore>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Current state of `id`, as the pre-image of a mutation.
    pub async fn fetch(
        &self,
        collection: &Collection,
        id: EntityId,
    ) -> Result<Map<String, Value>, LedgerError> {
        self.store
            .fetch(collection, id)
            .await
            .map_err(|source| LedgerError::PreImage {
                collection: collection.clone(),
                id,
                source,
            })
    }

    async fn issue(&self, request: &Request) -> Result<Response, StoreError> {
        self.notifier.in_flight(true);
        let result = self.send(request).await;
        self.notifier.in_flight(false);
        result
    }

    async fn send(&self, request: &Request) -> Result<Response, StoreError> {
        match request {
            Request::Create { collection, body } => {
                let response = self.store.create(collection, body.clone()).await?;
                Ok(Response {
                    verb: Verb::Create,
                    collection: collection.clone(),
                    id: Some(response.first_id()?),
                    body: response.body,
                    object: None,
                })
            }
            Request::Update {
                collection,
                id,
                body,
            } => {
                let response = self.store.update(collection, *id, body.clone()).await?;
                Ok(Response {
                    verb: Verb::Update,
                    collection: collection.clone(),
                    id: Some(*id),
                    body: response.body,
                    object: response.object,
                })
            }
            Request::Delete { collection, id } => {
                let response = self.store.delete(collection, *id).await?;
                Ok(Response {
                    verb: Verb::Delete,
                    collection: collection.clone(),
                    id: Some(*id),
                    body: response.body,
                    object: None,
                })
            }
        }
    }

    /// Apply a group as a unit: validate, capture pre-images, issue every
    /// network op concurrently, then either run deferred callbacks or undo
    /// the partial success.
    pub async fn apply_group(
        &self,
        group: &OperationGroup,
        policy: NotifyPolicy,
    ) -> Result<Vec<Response>, GroupFailure> {
        let mut prepared = Vec::new();
        let mut deferred: Vec<&Deferred> = Vec::new();
        for op in group {
            match op {
                Operation::Deferred(callback) => deferred.push(callback),
                _ => {
                    let entity_type = op.entity_type().ok_or_else(|| {
                        LedgerError::from(CoreError::InvalidOperation(
                            "network operation without a type".into(),
                        ))
                    })?;
                    prepared.push(Prepared {
                        op,
                        entity_type,
                        request: Request::prepare(op)?,
                    });
                }
            }
        }

        let pre_images = if prepared.len() > 1 {
            self.pre_images(&prepared).await?
        } else {
            vec![None; prepared.len()]
        };

        debug!(ops = prepared.len(), deferred = deferred.len(), "issuing group");
        let results = join_all(prepared.iter().map(|p| self.issue(&p.request))).await;

        let Some(failed) = results.iter().position(Result::is_err) else {
            let responses: Vec<Response> = results.into_iter().flatten().collect();
            for (p, response) in prepared.iter().zip(&responses) {
                self.notify(p, response, policy);
            }
            for callback in deferred {
                callback.run();
            }
            return Ok(responses);
        };

        let failures: Vec<String> = results
            .iter()
            .filter_map(|r| r.as_ref().err().map(ToString::to_string))
            .collect();
        warn!(?failures, "group failed; compensating applied operations");
        let rebinds = self.compensate(&prepared, &results, &pre_images).await;
        let culprit = &prepared[failed];
        Err(GroupFailure {
            error: LedgerError::Apply {
                verb: culprit.op.verb(),
                entity_type: culprit.entity_type.name.clone(),
                failures,
            },
            rebinds,
        })
    }

    async fn pre_images(
        &self,
        prepared: &[Prepared<'_>],
    ) -> Result<Vec<Option<Map<String, Value>>>, LedgerError> {
        join_all(prepared.iter().map(|p| async move {
            match p.request.target() {
                Some((collection, id)) => self.fetch(collection, id).await.map(Some),
                None => Ok(None),
            }
        }))
        .await
        .into_iter()
        .collect()
    }

    fn notify(&self, prepared: &Prepared<'_>, response: &Response, policy: NotifyPolicy) {
        let body = match &prepared.request {
            Request::Create { body, .. } => {
                let mut body = body.clone();
                if let Some(id) = response.id {
                    body.insert("id".into(), Value::from(id.get()));
                }
                Value::Object(body)
            }
            Request::Update { body, .. } => {
                if policy == NotifyPolicy::SkipUpdates {
                    return;
                }
                Value::Object(body.clone())
            }
            Request::Delete { .. } => response.body.clone(),
        };
        self.notifier.applied(Applied {
            verb: response.verb,
            collection: response.collection.clone(),
            id: response.id,
            body,
            entity_type: prepared.entity_type.clone(),
            type_id: Some(prepared.entity_type.id),
        });
    }

    /// Revert every successful op of a failed group, newest first. Failures
    /// here are logged and skipped.
    async fn compensate(
        &self,
        prepared: &[Prepared<'_>],
        results: &[Result<Response, StoreError>],
        pre_images: &[Option<Map<String, Value>>],
    ) -> Vec<Rebind> {
        let mut rebinds = Vec::new();
        for ((p, result), pre) in prepared.iter().zip(results).zip(pre_images).rev() {
            let Ok(response) = result else { continue };
            match self.compensate_one(p, response, pre.as_ref()).await {
                Ok(Some(rebind)) => rebinds.push(rebind),
                Ok(None) => {}
                Err(e) => warn!(
                    error = %e,
                    verb = %p.op.verb(),
                    collection = %response.collection,
                    "compensation failed"
                ),
            }
        }
        rebinds
    }

    async fn compensate_one(
        &self,
        prepared: &Prepared<'_>,
        response: &Response,
        pre: Option<&Map<String, Value>>,
    ) -> Result<Option<Rebind>, LedgerError> {
        let missing = || CoreError::InvalidData("no pre-image to compensate with".into());
        let undo = match &prepared.request {
            Request::Create { collection, .. } => {
                let id = response
                    .id
                    .ok_or_else(|| CoreError::InvalidData("created without an id".into()))?;
                Request::Delete {
                    collection: collection.singular(),
                    id,
                }
            }
            Request::Update {
                collection,
                id,
                body,
            } => {
                let pre = pre.ok_or_else(missing)?;
                Request::Update {
                    collection: collection.clone(),
                    id: *id,
                    body: inverse_update_body(
                        pre,
                        &Body::from_map(body.clone()),
                        prepared.entity_type,
                    )
                    .resolve()?,
                }
            }
            Request::Delete { collection, .. } => {
                let pre = pre.ok_or_else(missing)?;
                Request::Create {
                    collection: collection.plural(),
                    body: recreate_body(pre, prepared.entity_type).resolve()?,
                }
            }
        };
        let undone = self.issue(&undo).await?;
        debug!(verb = %undone.verb, collection = %undone.collection, "compensated");

        Ok(match (&prepared.request, undone.id) {
            (Request::Delete { collection, id }, Some(to)) => Some(Rebind {
                collection: collection.singular(),
                from: IdRef::Known(*id),
                to,
            }),
            _ => None,
        })
    }
}
