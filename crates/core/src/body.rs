use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::collection::Collection;
use crate::error::CoreError;
use crate::ids::{EntityId, IdRef};

/// A typed pointer from one entity's body to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub collection: Collection,
    pub id: IdRef,
}

impl EntityRef {
    pub fn new(collection: impl Into<Collection>, id: impl Into<IdRef>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Whether this reference points at `from`. Pending placeholders are
    /// globally unique; known ids only match within the same resource.
    pub fn matches(&self, collection: &Collection, from: &IdRef) -> bool {
        self.id == *from && (from.is_pending() || self.collection.same_resource(collection))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefSlot {
    One(EntityRef),
    Many(Vec<EntityRef>),
}

impl RefSlot {
    fn resolve(&self) -> Result<Value, CoreError> {
        match self {
            Self::One(r) => Ok(Value::from(r.id.resolve()?.get())),
            Self::Many(refs) => refs
                .iter()
                .map(|r| r.id.resolve().map(|id| Value::from(id.get())))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    /// Collection the slot points into; `None` for an empty list.
    pub fn collection(&self) -> Option<&Collection> {
        self.iter().next().map(|r| &r.collection)
    }

    fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        let refs: &[EntityRef] = match self {
            Self::One(r) => std::slice::from_ref(r),
            Self::Many(refs) => refs,
        };
        refs.iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut EntityRef> {
        let refs: &mut [EntityRef] = match self {
            Self::One(r) => std::slice::from_mut(r),
            Self::Many(refs) => refs,
        };
        refs.iter_mut()
    }
}

/// Request body: plain JSON fields plus entity references that are resolved
/// to integers only when the request goes on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    fields: Map<String, Value>,
    refs: BTreeMap<String, RefSlot>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            refs: BTreeMap::new(),
        }
    }

    /// Build from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(fields) => Ok(Self::from_map(fields)),
            other => Err(CoreError::InvalidData(format!(
                "request body must be an object, got {other}"
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_ref(
        mut self,
        key: impl Into<String>,
        collection: impl Into<Collection>,
        id: impl Into<IdRef>,
    ) -> Self {
        self.insert_ref(key, EntityRef::new(collection, id));
        self
    }

    pub fn with_refs(
        mut self,
        key: impl Into<String>,
        collection: impl Into<Collection>,
        ids: impl IntoIterator<Item = IdRef>,
    ) -> Self {
        let collection = collection.into();
        let refs = ids
            .into_iter()
            .map(|id| EntityRef::new(collection.clone(), id))
            .collect();
        self.insert_refs(key, refs);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        self.refs.remove(&key);
        self.fields.insert(key, value.into());
    }

    pub fn insert_ref(&mut self, key: impl Into<String>, r: EntityRef) {
        let key = key.into();
        self.fields.remove(&key);
        self.refs.insert(key, RefSlot::One(r));
    }

    pub fn insert_refs(&mut self, key: impl Into<String>, refs: Vec<EntityRef>) {
        let key = key.into();
        self.fields.remove(&key);
        self.refs.insert(key, RefSlot::Many(refs));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_ref(&self, key: &str) -> Option<&RefSlot> {
        self.refs.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key) || self.refs.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) {
        self.fields.remove(key);
        self.refs.remove(key);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields
            .keys()
            .chain(self.refs.keys())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.refs.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Wire form: every reference replaced by its server id.
    pub fn resolve(&self) -> Result<Map<String, Value>, CoreError> {
        let mut out = self.fields.clone();
        for (key, slot) in &self.refs {
            out.insert(key.clone(), slot.resolve()?);
        }
        Ok(out)
    }

    pub fn is_resolved(&self) -> bool {
        self.refs
            .values()
            .flat_map(RefSlot::iter)
            .all(|r| !r.id.is_pending())
    }

    pub fn references(&self, collection: &Collection, id: &IdRef) -> bool {
        self.refs
            .values()
            .flat_map(RefSlot::iter)
            .any(|r| r.matches(collection, id))
    }

    /// Rewrite every reference to `from` as `to`; returns the number rewritten.
    pub fn replace_ref(&mut self, collection: &Collection, from: &IdRef, to: EntityId) -> usize {
        let mut count = 0;
        for r in self.refs.values_mut().flat_map(RefSlot::iter_mut) {
            if r.matches(collection, from) {
                r.id = IdRef::Known(to);
                count += 1;
            }
        }
        count
    }
}

impl From<Map<String, Value>> for Body {
    fn from(fields: Map<String, Value>) -> Self {
        Self::from_map(fields)
    }
}
