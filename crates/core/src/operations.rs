use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::body::{Body, EntityRef};
use crate::collection::Collection;
use crate::entity_type::EntityType;
use crate::error::CoreError;
use crate::ids::{EntityId, IdRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verb {
    Create,
    Update,
    Delete,
    Deferred,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Deferred => "deferred",
        }
    }

    /// Used in user-facing notices ("Box created!").
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Create => "created",
            Self::Update => "updated",
            Self::Delete => "deleted",
            Self::Deferred => "run",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local callback run after the network operations of its group complete.
/// `Fn` rather than `FnOnce`: a group may be replayed any number of times.
#[derive(Clone)]
pub struct Deferred(Arc<dyn Fn() + Send + Sync>);

impl Deferred {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn run(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

#[derive(Debug, Clone)]
pub enum Operation {
    Create {
        collection: Collection,
        body: Body,
        entity_type: Arc<EntityType>,
        /// The reference this creation stands in for. Once the server assigns
        /// an id, every occurrence of it in the ledger is rewritten.
        restores: Option<EntityRef>,
    },
    Update {
        collection: Collection,
        id: IdRef,
        body: Body,
        entity_type: Arc<EntityType>,
    },
    Delete {
        collection: Collection,
        id: IdRef,
        entity_type: Arc<EntityType>,
    },
    Deferred(Deferred),
}

fn id_matches(own: &Collection, id: &IdRef, collection: &Collection, from: &IdRef) -> bool {
    id == from && (from.is_pending() || own.same_resource(collection))
}

impl Operation {
    pub fn create(
        collection: impl Into<Collection>,
        body: Body,
        entity_type: Arc<EntityType>,
    ) -> Self {
        Self::Create {
            collection: collection.into(),
            body,
            entity_type,
            restores: None,
        }
    }

    pub fn update(
        collection: impl Into<Collection>,
        id: impl Into<IdRef>,
        body: Body,
        entity_type: Arc<EntityType>,
    ) -> Self {
        Self::Update {
            collection: collection.into(),
            id: id.into(),
            body,
            entity_type,
        }
    }

    pub fn delete(
        collection: impl Into<Collection>,
        id: impl Into<IdRef>,
        entity_type: Arc<EntityType>,
    ) -> Self {
        Self::Delete {
            collection: collection.into(),
            id: id.into(),
            entity_type,
        }
    }

    pub fn deferred(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::Deferred(Deferred::new(f))
    }

    /// Mark a creation as standing in for `target`. No effect on other verbs.
    pub fn restoring(mut self, target: EntityRef) -> Self {
        if let Self::Create { restores, .. } = &mut self {
            *restores = Some(target);
        }
        self
    }

    pub fn verb(&self) -> Verb {
        match self {
            Self::Create { .. } => Verb::Create,
            Self::Update { .. } => Verb::Update,
            Self::Delete { .. } => Verb::Delete,
            Self::Deferred(_) => Verb::Deferred,
        }
    }

    pub fn is_network(&self) -> bool {
        !matches!(self, Self::Deferred(_))
    }

    pub fn collection(&self) -> Option<&Collection> {
        match self {
            Self::Create { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => Some(collection),
            Self::Deferred(_) => None,
        }
    }

    pub fn id(&self) -> Option<&IdRef> {
        match self {
            Self::Update { id, .. } | Self::Delete { id, .. } => Some(id),
            Self::Create { .. } | Self::Deferred(_) => None,
        }
    }

    pub fn body(&self) -> Option<&Body> {
        match self {
            Self::Create { body, .. } | Self::Update { body, .. } => Some(body),
            Self::Delete { .. } | Self::Deferred(_) => None,
        }
    }

    pub fn entity_type(&self) -> Option<&Arc<EntityType>> {
        match self {
            Self::Create { entity_type, .. }
            | Self::Update { entity_type, .. }
            | Self::Delete { entity_type, .. } => Some(entity_type),
            Self::Deferred(_) => None,
        }
    }

    pub fn restores(&self) -> Option<&EntityRef> {
        match self {
            Self::Create { restores, .. } => restores.as_ref(),
            _ => None,
        }
    }

    /// Fails if the target id or any body reference is still pending.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(id) = self.id() {
            id.resolve()?;
        }
        if let Some(body) = self.body() {
            body.resolve()?;
        }
        Ok(())
    }

    pub fn references(&self, collection: &Collection, from: &IdRef) -> bool {
        let by_id = match (self.collection(), self.id()) {
            (Some(own), Some(id)) => id_matches(own, id, collection, from),
            _ => false,
        };
        let by_restores = self
            .restores()
            .is_some_and(|r| r.matches(collection, from));
        by_id || by_restores || self.body().is_some_and(|b| b.references(collection, from))
    }

    /// Rewrite every reference to `from` (target id, body refs, restores) as `to`.
    pub fn replace_ref(&mut self, collection: &Collection, from: &IdRef, to: EntityId) -> usize {
        match self {
            Self::Create { body, restores, .. } => {
                let mut count = body.replace_ref(collection, from, to);
                if let Some(r) = restores
                    && r.matches(collection, from)
                {
                    r.id = IdRef::Known(to);
                    count += 1;
                }
                count
            }
            Self::Update {
                collection: own,
                id,
                body,
                ..
            } => {
                let mut count = body.replace_ref(collection, from, to);
                if id_matches(own, id, collection, from) {
                    *id = IdRef::Known(to);
                    count += 1;
                }
                count
            }
            Self::Delete {
                collection: own,
                id,
                ..
            } => {
                if id_matches(own, id, collection, from) {
                    *id = IdRef::Known(to);
                    1
                } else {
                    0
                }
            }
            Self::Deferred(_) => 0,
        }
    }
}

/// Operations applied or reverted together as one ledger entry. Never empty.
#[derive(Debug, Clone)]
pub struct OperationGroup(Vec<Operation>);

impl OperationGroup {
    pub fn new(ops: Vec<Operation>) -> Result<Self, CoreError> {
        if ops.is_empty() {
            return Err(CoreError::EmptyGroup);
        }
        Ok(Self(ops))
    }

    pub fn single(op: Operation) -> Self {
        Self(vec![op])
    }

    pub fn ops(&self) -> &[Operation] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn network_ops(&self) -> impl Iterator<Item = &Operation> {
        self.0.iter().filter(|op| op.is_network())
    }

    pub fn extend(&mut self, ops: impl IntoIterator<Item = Operation>) {
        self.0.extend(ops);
    }

    /// Swap in a new set of operations; rejected (and `self` untouched) if empty.
    pub fn replace(&mut self, ops: Vec<Operation>) -> Result<(), CoreError> {
        if ops.is_empty() {
            return Err(CoreError::EmptyGroup);
        }
        self.0 = ops;
        Ok(())
    }

    pub fn replace_ref(&mut self, collection: &Collection, from: &IdRef, to: EntityId) -> usize {
        self.0
            .iter_mut()
            .map(|op| op.replace_ref(collection, from, to))
            .sum()
    }

    pub fn references(&self, collection: &Collection, from: &IdRef) -> bool {
        self.0.iter().any(|op| op.references(collection, from))
    }
}

impl<'a> IntoIterator for &'a OperationGroup {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
