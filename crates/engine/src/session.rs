use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tracing::{debug, info};

use annolog_core::{Collection, EntityId};
use annolog_storage::RemoteStore;

use crate::Ledger;
use crate::config::LedgerConfig;
use crate::error::LedgerError;

pub const SESSION_START_KEY: &str = "_annotation_session_start";
pub const SESSION_END_KEY: &str = "_annotation_session_end";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub media: EntityId,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    /// Ids of the launched jobs.
    pub jobs: Vec<EntityId>,
}

/// An annotation session on one media. Closing an edited session stamps
/// the media and launches the configured jobs.
pub struct EditSession {
    media: EntityId,
    started_at_ms: u64,
    ledger: Arc<Ledger>,
    store: Arc<dyn RemoteStore>,
    jobs: Vec<String>,
}

impl EditSession {
    pub fn start(
        media: EntityId,
        ledger: Arc<Ledger>,
        store: Arc<dyn RemoteStore>,
        config: &LedgerConfig,
    ) -> Result<Self, LedgerError> {
        let started_at_ms = now_ms()?;
        debug!(%media, started_at_ms, "annotation session started");
        Ok(Self {
            media,
            started_at_ms,
            ledger,
            store,
            jobs: config.close_jobs.clone(),
        })
    }

    pub fn media(&self) -> EntityId {
        self.media
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// `None` when nothing was edited; the media is left untouched.
    pub async fn close(self) -> Result<Option<SessionSummary>, LedgerError> {
        if !self.ledger.has_edits() {
            debug!(media = %self.media, "session closed without edits");
            return Ok(None);
        }
        let ended_at_ms = now_ms()?;

        let mut attributes = Map::new();
        attributes.insert(SESSION_START_KEY.into(), Value::from(self.started_at_ms));
        attributes.insert(SESSION_END_KEY.into(), Value::from(ended_at_ms));
        let mut body = Map::new();
        body.insert("attributes".into(), Value::Object(attributes));
        self.store
            .update(&Collection::from("Media"), self.media, body)
            .await?;

        let mut jobs = Vec::new();
        for algorithm in &self.jobs {
            let mut request = Map::new();
            request.insert("algorithm_name".into(), Value::from(algorithm.as_str()));
            request.insert("media_ids".into(), Value::from(vec![self.media.get()]));
            let response = self.store.create(&Collection::from("Jobs"), request).await?;
            jobs.extend(response.ids);
        }

        info!(media = %self.media, jobs = jobs.len(), "annotation session closed");
        Ok(Some(SessionSummary {
            media: self.media,
            started_at_ms: self.started_at_ms,
            ended_at_ms,
            jobs,
        }))
    }
}

fn now_ms() -> Result<u64, LedgerError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| LedgerError::Clock(e.to_string()))?;
    u64::try_from(elapsed.as_millis()).map_err(|e| LedgerError::Clock(e.to_string()))
}
