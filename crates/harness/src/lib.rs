pub mod faults;
pub mod session;

pub use faults::FaultyTransport;
pub use session::TestSession;

use std::sync::Arc;

use annolog_core::{EntityKind, EntityType};
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test writer. `LOG_LEVEL` or
/// `RUST_LOG` picks the filter; safe to call from every test.
pub fn init_tracing() {
    let filter = match std::env::var("LOG_LEVEL") {
        Ok(level) => EnvFilter::new(level),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn box_type() -> Arc<EntityType> {
    Arc::new(EntityType::new(1, "Box", EntityKind::Spatial))
}

pub fn track_type() -> Arc<EntityType> {
    Arc::new(EntityType::new(2, "Track", EntityKind::Interval))
}

pub fn video_type() -> Arc<EntityType> {
    Arc::new(EntityType::new(3, "Video", EntityKind::Media))
}
