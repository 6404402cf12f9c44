use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use annolog_core::{Collection, EntityId, EntityType, Verb};

/// A remote mutation that completed.
#[derive(Debug, Clone)]
pub struct Applied {
    pub verb: Verb,
    pub collection: Collection,
    pub id: Option<EntityId>,
    pub body: Value,
    pub entity_type: Arc<EntityType>,
    /// Type id confirmed by the server when the response carried one.
    pub type_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Failure,
}

/// Transient user-facing banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(type_name: &str, verb: Verb) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: format!("{type_name} {}!", verb.past_tense()),
        }
    }

    pub fn failure(type_name: &str, verb: Verb) -> Self {
        Self {
            level: NoticeLevel::Failure,
            message: format!("{type_name} was not {}", verb.past_tense()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LedgerEvent {
    Applied(Applied),
    /// Brackets each network mutation. Advisory: observers may disable
    /// conflicting input while `enabled` is true.
    MutationInFlight { enabled: bool },
    Notice(Notice),
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<LedgerEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }

    /// Nobody listening is fine.
    pub fn emit(&self, event: LedgerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn applied(&self, applied: Applied) {
        self.emit(LedgerEvent::Applied(applied));
    }

    pub fn in_flight(&self, enabled: bool) {
        self.emit(LedgerEvent::MutationInFlight { enabled });
    }

    pub fn success(&self, type_name: &str, verb: Verb) {
        self.emit(LedgerEvent::Notice(Notice::success(type_name, verb)));
    }

    pub fn failure(&self, type_name: &str, verb: Verb) {
        self.emit(LedgerEvent::Notice(Notice::failure(type_name, verb)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_read_like_banners() {
        assert_eq!(Notice::success("Box", Verb::Create).message, "Box created!");
        assert_eq!(Notice::failure("Track", Verb::Delete).message, "Track was not deleted");
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let notifier = Notifier::new(0);
        notifier.in_flight(true);

        let mut rx = notifier.subscribe();
        notifier.success("Box", Verb::Update);
        match rx.try_recv() {
            Ok(LedgerEvent::Notice(n)) => assert_eq!(n.level, NoticeLevel::Success),
            other => panic!("expected a notice, got {other:?}"),
        }
    }
}
