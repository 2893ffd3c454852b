use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::database::{MemoryStore, Store};
use crate::services::{Clock, SystemClock};

/// Shared handles injected into every handler through an `Extension` layer
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Empty in-memory store on the system clock
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
