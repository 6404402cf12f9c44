use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::broadcast::{self, error::TryRecvError};

use annolog_core::{Collection, EntityId};
use annolog_engine::{Applied, Ledger, LedgerConfig, LedgerEvent, Notice};
use annolog_storage::{LoggedRequest, Method, RemoteStore, RestStore, SqliteBackend, StoreError};

use crate::faults::FaultyTransport;

const DB_FILE: &str = "backend.db";

/// A ledger wired to an in-process backend, with its event stream.
pub struct TestSession {
    pub backend: Arc<SqliteBackend>,
    pub transport: Arc<FaultyTransport>,
    pub store: Arc<dyn RemoteStore>,
    pub ledger: Arc<Ledger>,
    events: broadcast::Receiver<LedgerEvent>,
    dir: Option<TempDir>,
}

impl TestSession {
    pub fn new() -> Result<Self, StoreError> {
        Self::with_config(&LedgerConfig::default())
    }

    pub fn with_config(config: &LedgerConfig) -> Result<Self, StoreError> {
        Ok(Self::assemble(SqliteBackend::open_in_memory()?, config, None))
    }

    /// Updates to `collections` answer with the full resource.
    pub fn versioned(collections: &[&str]) -> Result<Self, StoreError> {
        let backend = collections
            .iter()
            .fold(SqliteBackend::open_in_memory()?, |b, c| b.with_versioned(*c));
        Ok(Self::assemble(backend, &LedgerConfig::default(), None))
    }

    /// Backed by a database file in a temporary directory.
    pub fn on_disk() -> Result<Self, StoreError> {
        let dir = TempDir::new().map_err(|e| StoreError::Backend(e.to_string()))?;
        let backend = SqliteBackend::open(dir.path().join(DB_FILE))?;
        Ok(Self::assemble(backend, &LedgerConfig::default(), Some(dir)))
    }

    fn assemble(backend: SqliteBackend, config: &LedgerConfig, dir: Option<TempDir>) -> Self {
        let backend = Arc::new(backend);
        let transport = Arc::new(FaultyTransport::new(backend.clone()));
        let store: Arc<dyn RemoteStore> = Arc::new(RestStore::new(transport.clone()));
        let ledger = Arc::new(Ledger::new(store.clone(), config));
        let events = ledger.subscribe();
        Self {
            backend,
            transport,
            store,
            ledger,
            events,
            dir,
        }
    }

    /// Database file of an [`TestSession::on_disk`] session.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.path().join(DB_FILE))
    }

    /// Seed an entity directly in the backend.
    pub fn seed(&self, collection: &str, id: i64, body: Value) -> Result<EntityId, StoreError> {
        let id = EntityId::new(id);
        self.backend.put(collection, id, body)?;
        Ok(id)
    }

    pub fn entity(&self, collection: &str, id: EntityId) -> Result<Option<Value>, StoreError> {
        Ok(self.backend.entity(collection, id)?.map(Value::Object))
    }

    pub fn ids(&self, collection: &str) -> Result<Vec<EntityId>, StoreError> {
        self.backend.ids(Collection::from(collection))
    }

    /// Mutating requests the backend answered, as `(method, path)`.
    pub fn mutations(&self) -> Result<Vec<(Method, String)>, StoreError> {
        Ok(self
            .backend
            .mutations()?
            .into_iter()
            .map(|LoggedRequest { method, path, .. }| (method, path))
            .collect())
    }

    /// Everything emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
            }
        }
    }

    pub fn applied(&mut self) -> Vec<Applied> {
        self.drain_events()
            .into_iter()
            .filter_map(|e| match e {
                LedgerEvent::Applied(applied) => Some(applied),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&mut self) -> Vec<Notice> {
        self.drain_events()
            .into_iter()
            .filter_map(|e| match e {
                LedgerEvent::Notice(notice) => Some(notice),
                _ => None,
            })
            .collect()
    }
}
