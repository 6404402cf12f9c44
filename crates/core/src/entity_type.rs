use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Keys the server owns on every entity; never written back.
pub const DEFAULT_SERVER_MANAGED: &[&str] = &[
    "id",
    "project",
    "created_by",
    "modified_by",
    "created_datetime",
    "modified_datetime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Localizations: boxes, lines, dots, polygons on a frame.
    Spatial,
    /// States and tracks spanning frames or grouping localizations.
    Interval,
    Media,
    Generic,
}

/// Describes the kind of entity an operation touches: used for user-facing
/// messages and for rebuilding bodies from pre-images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: i64,
    pub name: String,
    pub kind: EntityKind,
    #[serde(default = "default_server_managed")]
    pub server_managed: BTreeSet<String>,
}

fn default_server_managed() -> BTreeSet<String> {
    DEFAULT_SERVER_MANAGED.iter().map(|k| k.to_string()).collect()
}

impl EntityType {
    pub fn new(id: i64, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            server_managed: default_server_managed(),
        }
    }

    pub fn with_server_managed(mut self, key: impl Into<String>) -> Self {
        self.server_managed.insert(key.into());
        self
    }

    pub fn is_server_managed(&self, key: &str) -> bool {
        self.server_managed.contains(key)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
