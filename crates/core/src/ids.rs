use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier assigned by the server when an entity is created.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Stands for an entity whose server id is not known yet.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlaceholderId(Uuid);

impl PlaceholderId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PlaceholderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlaceholderId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an entity that is either still pending creation or known to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdRef {
    Pending(PlaceholderId),
    Known(EntityId),
}

impl IdRef {
    pub fn pending() -> Self {
        Self::Pending(PlaceholderId::new())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn known(&self) -> Option<EntityId> {
        match self {
            Self::Known(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }

    /// The server id, or an error naming the placeholder still outstanding.
    pub fn resolve(&self) -> Result<EntityId, crate::CoreError> {
        match self {
            Self::Known(id) => Ok(*id),
            Self::Pending(p) => Err(crate::CoreError::UnresolvedPlaceholder(*p)),
        }
    }
}

impl From<EntityId> for IdRef {
    fn from(id: EntityId) -> Self {
        Self::Known(id)
    }
}

impl From<PlaceholderId> for IdRef {
    fn from(p: PlaceholderId) -> Self {
        Self::Pending(p)
    }
}

impl fmt::Display for IdRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(id) => write!(f, "{id}"),
            Self::Pending(p) => write!(f, "pending:{}", &p.to_string()[..8]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;

    #[test]
    fn placeholders_are_unique() {
        assert_ne!(PlaceholderId::new(), PlaceholderId::new());
    }

    #[test]
    fn pending_never_equals_known() {
        let pending = IdRef::pending();
        assert!(pending.is_pending());
        assert_eq!(pending.known(), None);
        assert_ne!(pending, IdRef::Known(EntityId::new(0)));
    }

    #[test]
    fn resolve_reports_the_outstanding_placeholder() {
        let p = PlaceholderId::new();
        match IdRef::Pending(p).resolve() {
            Err(CoreError::UnresolvedPlaceholder(found)) => assert_eq!(found, p),
            other => panic!("expected UnresolvedPlaceholder, got {other:?}"),
        }
        assert_eq!(IdRef::Known(EntityId::new(7)).resolve().unwrap(), EntityId::new(7));
    }

    #[test]
    fn entity_id_serializes_as_integer() {
        let json = serde_json::to_string(&EntityId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
