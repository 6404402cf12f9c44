use annolog_core::{Collection, CoreError, EntityId, Verb};
use annolog_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The read before an update/delete failed; the ledger is unchanged.
    #[error("could not read {collection} {id} before mutating it: {source}")]
    PreImage {
        collection: Collection,
        id: EntityId,
        #[source]
        source: StoreError,
    },

    /// A mutating call failed after its group was pushed.
    #[error("{} was not {}: {}", .entity_type, .verb.past_tense(), .failures.join("; "))]
    Apply {
        verb: Verb,
        entity_type: String,
        failures: Vec<String>,
    },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("system clock error: {0}")]
    Clock(String),
}
