pub mod compound;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod inverse;
pub mod notify;
pub mod reconcile;
pub mod session;

pub use compound::Compound;
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use executor::{Executor, NotifyPolicy, Response};
pub use history::History;
pub use notify::{Applied, LedgerEvent, Notice, NoticeLevel, Notifier};
pub use reconcile::Rebind;
pub use session::{EditSession, SessionSummary};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use annolog_core::{
    Body, Collection, EntityId, EntityRef, EntityType, IdRef, Operation, OperationGroup, Verb,
};
use annolog_storage::RemoteStore;

use crate::compound::merge;
use crate::inverse::{inverse_update_body, recreate_body};
use crate::reconcile::{apply_rebinds, created_rebinds};

#[derive(Debug)]
pub enum StepOutcome {
    Applied(Vec<Response>),
    Empty,
}

/// Point-in-time copy of the ledger.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub cursor: usize,
    pub forward: Vec<OperationGroup>,
    pub backward: Vec<OperationGroup>,
}

impl LedgerSnapshot {
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

/// Undo/redo ledger over a remote store.
///
/// Every public mutating call holds the history lock for its whole
/// duration, so overlapping calls queue and run one at a time.
pub struct Ledger {
    history: Mutex<History>,
    executor: Executor,
    notifier: Notifier,
    dirty: AtomicBool,
}

impl Ledger {
    pub fn new(store: Arc<dyn RemoteStore>, config: &LedgerConfig) -> Self {
        let notifier = Notifier::new(config.event_capacity);
        Self {
            history: Mutex::new(History::new(config.max_depth)),
            executor: Executor::new(store, notifier.clone()),
            notifier,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.notifier.subscribe()
    }

    /// Whether any mutation has been applied since construction.
    pub fn has_edits(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub async fn can_undo(&self) -> bool {
        self.history.lock().await.can_undo()
    }

    pub async fn can_redo(&self) -> bool {
        self.history.lock().await.can_redo()
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let history = self.history.lock().await;
        LedgerSnapshot {
            cursor: history.cursor(),
            forward: history.forward().to_vec(),
            backward: history.backward().to_vec(),
        }
    }

    pub async fn create(
        &self,
        collection: impl Into<Collection>,
        body: Body,
        entity_type: Arc<EntityType>,
    ) -> Result<Vec<Response>, LedgerError> {
        let collection = collection.into();
        let mut history = self.history.lock().await;

        let placeholder = IdRef::pending();
        let forward = Operation::create(collection.clone(), body, entity_type.clone())
            .restoring(EntityRef::new(collection.singular(), placeholder));
        let backward = Operation::delete(collection.singular(), placeholder, entity_type.clone());

        let (_, responses) = self
            .push_and_apply(
                &mut history,
                OperationGroup::single(forward),
                OperationGroup::single(backward),
            )
            .await?;
        info!(%collection, id = ?responses.first().and_then(|r| r.id), "created");
        self.notifier.success(&entity_type.name, Verb::Create);
        Ok(responses)
    }

    pub async fn update(
        &self,
        collection: impl Into<Collection>,
        id: EntityId,
        body: Body,
        entity_type: Arc<EntityType>,
    ) -> Result<Vec<Response>, LedgerError> {
        self.update_compound(collection, id, body, entity_type, Compound::new())
            .await
    }

    /// Update `id` and fold `compound`'s operations into the same ledger
    /// entry, so one undo reverts all of it.
    pub async fn update_compound(
        &self,
        collection: impl Into<Collection>,
        id: EntityId,
        body: Body,
        entity_type: Arc<EntityType>,
        mut compound: Compound,
    ) -> Result<Vec<Response>, LedgerError> {
        let collection = collection.into().singular();
        let mut history = self.history.lock().await;

        let request = body.resolve()?;
        let pre = self
            .pre_image(&collection, id, &entity_type, Verb::Update)
            .await?;
        let inverse = inverse_update_body(&pre, &body, &entity_type);

        let (index, mut responses) = self
            .push_and_apply(
                &mut history,
                OperationGroup::single(Operation::update(
                    collection.clone(),
                    id,
                    body,
                    entity_type.clone(),
                )),
                OperationGroup::single(Operation::update(
                    collection.clone(),
                    id,
                    inverse,
                    entity_type.clone(),
                )),
            )
            .await?;

        let object = responses.first().and_then(|r| r.object.clone());
        let confirmed = object
            .as_ref()
            .and_then(|o| o.get("id"))
            .and_then(Value::as_i64)
            .map_or(id, EntityId::new);
        let applied = Applied {
            verb: Verb::Update,
            collection: collection.clone(),
            id: Some(confirmed),
            type_id: object
                .as_ref()
                .and_then(|o| o.get("type"))
                .and_then(Value::as_i64)
                .or(Some(entity_type.id)),
            body: object.clone().unwrap_or(Value::Object(request)),
            entity_type: entity_type.clone(),
        };
        let versioned = object.is_some();
        if versioned {
            self.notifier.applied(applied.clone());
        }

        if !compound.is_empty() {
            let bound = compound.bind(&collection, confirmed);
            debug!(%collection, id = %confirmed, bound, "bound compound subject");
            let (forward, backward, replace) = compound.into_parts();
            if !forward.is_empty() {
                let group = OperationGroup::new(forward.clone())?;
                let extra = match self
                    .executor
                    .apply_group(&group, NotifyPolicy::All)
                    .await
                {
                    Ok(extra) => extra,
                    Err(failure) => {
                        apply_rebinds(&mut history, &failure.rebinds);
                        self.notifier.failure(&entity_type.name, Verb::Update);
                        return Err(failure.error);
                    }
                };
                merge(&mut history, index, forward, backward, replace)?;
                apply_rebinds(&mut history, &created_rebinds(&group, &extra));
                responses.extend(extra);
            } else {
                merge(&mut history, index, forward, backward, replace)?;
            }
        }

        if !versioned {
            self.notifier.applied(applied);
        }
        info!(%collection, id = %confirmed, cursor = history.cursor(), "updated");
        self.notifier.success(&entity_type.name, Verb::Update);
        Ok(responses)
    }

    pub async fn delete(
        &self,
        collection: impl Into<Collection>,
        id: EntityId,
        entity_type: Arc<EntityType>,
    ) -> Result<Vec<Response>, LedgerError> {
        let collection = collection.into().singular();
        let mut history = self.history.lock().await;

        let pre = self
            .pre_image(&collection, id, &entity_type, Verb::Delete)
            .await?;
        let body = recreate_body(&pre, &entity_type);
        let forward = Operation::delete(collection.clone(), id, entity_type.clone());
        let backward = Operation::create(collection.plural(), body, entity_type.clone())
            .restoring(EntityRef::new(collection.clone(), id));

        let (_, responses) = self
            .push_and_apply(
                &mut history,
                OperationGroup::single(forward),
                OperationGroup::single(backward),
            )
            .await?;
        info!(%collection, %id, "deleted");
        self.notifier.success(&entity_type.name, Verb::Delete);
        Ok(responses)
    }

    pub async fn undo(&self) -> Result<StepOutcome, LedgerError> {
        let mut history = self.history.lock().await;
        self.step_outcome(&mut history, Direction::Undo).await
    }

    pub async fn redo(&self) -> Result<StepOutcome, LedgerError> {
        let mut history = self.history.lock().await;
        self.step_outcome(&mut history, Direction::Redo).await
    }

    async fn step_outcome(
        &self,
        history: &mut History,
        direction: Direction,
    ) -> Result<StepOutcome, LedgerError> {
        match self.step(history, direction, NotifyPolicy::All).await? {
            Some(responses) => {
                info!(?direction, cursor = history.cursor(), len = history.len(), "stepped");
                Ok(StepOutcome::Applied(responses))
            }
            None => {
                debug!(?direction, "nothing to step");
                Ok(StepOutcome::Empty)
            }
        }
    }

    async fn pre_image(
        &self,
        collection: &Collection,
        id: EntityId,
        entity_type: &EntityType,
        verb: Verb,
    ) -> Result<serde_json::Map<String, Value>, LedgerError> {
        self.executor.fetch(collection, id).await.inspect_err(|e| {
            warn!(error = %e, "pre-image read failed; ledger unchanged");
            self.notifier.failure(&entity_type.name, verb);
        })
    }

    /// Truncate, append and apply a new entry. Returns its index.
    async fn push_and_apply(
        &self,
        history: &mut History,
        forward: OperationGroup,
        backward: OperationGroup,
    ) -> Result<(usize, Vec<Response>), LedgerError> {
        history.truncate_from_cursor();
        let index = history.append(forward, backward);
        let responses = self
            .step(history, Direction::Redo, NotifyPolicy::SkipUpdates)
            .await?
            .unwrap_or_default();
        Ok((index, responses))
    }

    /// Apply the group next to the cursor and move the cursor on success.
    /// `None` when there is nothing to step.
    async fn step(
        &self,
        history: &mut History,
        direction: Direction,
        policy: NotifyPolicy,
    ) -> Result<Option<Vec<Response>>, LedgerError> {
        let (index, group) = match direction {
            Direction::Undo => match history.undo_index() {
                Some(i) => (i, history.backward()[i].clone()),
                None => return Ok(None),
            },
            Direction::Redo => match history.redo_index() {
                Some(i) => (i, history.forward()[i].clone()),
                None => return Ok(None),
            },
        };
        debug!(?direction, index, ops = group.len(), "applying group");

        match self.executor.apply_group(&group, policy).await {
            Ok(responses) => {
                apply_rebinds(history, &created_rebinds(&group, &responses));
                match direction {
                    Direction::Undo => history.retreat(),
                    Direction::Redo => history.advance(),
                }
                self.dirty.store(true, Ordering::Release);
                Ok(Some(responses))
            }
            Err(failure) => {
                apply_rebinds(history, &failure.rebinds);
                let (verb, type_name) = match &failure.error {
                    LedgerError::Apply {
                        verb, entity_type, ..
                    } => (*verb, entity_type.clone()),
                    _ => group
                        .network_ops()
                        .next()
                        .and_then(|op| Some((op.verb(), op.entity_type()?.name.clone())))
                        .unwrap_or((Verb::Deferred, String::from("Entity"))),
                };
                warn!(?direction, index, error = %failure.error, "group not applied; cursor unchanged");
                self.notifier.failure(&type_name, verb);
                Err(failure.error)
            }
        }
    }
}
