use serde::{Deserialize, Serialize};
use std::fmt;

/// REST collection name. Creation goes to the plural form ("Localizations"),
/// single-resource calls to the singular form ("Localization").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection(String);

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_plural(&self) -> bool {
        self.0.ends_with('s')
    }

    pub fn singular(&self) -> Collection {
        match self.0.strip_suffix('s') {
            Some(stem) if !stem.is_empty() => Collection(stem.to_string()),
            _ => self.clone(),
        }
    }

    pub fn plural(&self) -> Collection {
        if self.is_plural() {
            self.clone()
        } else {
            Collection(format!("{}s", self.0))
        }
    }

    /// Same resource regardless of singular/plural spelling.
    pub fn same_resource(&self, other: &Collection) -> bool {
        self.singular() == other.singular()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Collection {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Collection {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&Collection> for Collection {
    fn from(c: &Collection) -> Self {
        c.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_and_plural() {
        let plural = Collection::from("Localizations");
        assert_eq!(plural.singular().as_str(), "Localization");
        assert_eq!(plural.plural().as_str(), "Localizations");

        let singular = Collection::from("State");
        assert_eq!(singular.plural().as_str(), "States");
        assert_eq!(singular.singular().as_str(), "State");
    }

    #[test]
    fn same_resource_ignores_number() {
        assert!(Collection::from("Media").same_resource(&Collection::from("Medias")));
        assert!(Collection::from("States").same_resource(&Collection::from("State")));
        assert!(!Collection::from("State").same_resource(&Collection::from("Localization")));
    }
}
