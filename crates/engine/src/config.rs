use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Oldest entries are dropped beyond this many. `None` keeps everything.
    pub max_depth: Option<usize>,
    /// Buffer of the event broadcast; slow subscribers lag past this.
    pub event_capacity: usize,
    /// Automation jobs launched when an edited session closes.
    pub close_jobs: Vec<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            close_jobs: Vec::new(),
        }
    }
}

impl LedgerConfig {
    pub fn from_json(text: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(text).map_err(|e| LedgerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = LedgerConfig::from_json(r#"{"close_jobs": ["tracker"]}"#).unwrap();
        assert_eq!(config.max_depth, None);
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.close_jobs, vec!["tracker".to_string()]);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            LedgerConfig::from_json("{max_depth: 3"),
            Err(LedgerError::Config(_))
        ));
    }
}
