pub mod error;
pub mod messages;
pub mod reactions;
pub mod search;
pub mod threads;
pub mod users;
pub mod workspace;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use connect_db::Database;
use connect_gateway::dispatcher::Dispatcher;
use uuid::Uuid;

use crate::threads::ThreadSessions;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub threads: ThreadSessions,
    pub delivery: DeliveryLocks,
}

/// Per-key async locks for the delivery path, keyed by channel id for
/// posts and by thread root id for replies. A writer holds the lock from
/// store commit through broadcast send, so subscribers observe events in
/// append order; the store lock alone only orders the commits.
pub struct DeliveryLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl DeliveryLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_key(&self, key: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .lock()
            .expect("delivery lock table poisoned")
            .entry(key)
            .or_default()
            .clone()
    }
}

impl Default for DeliveryLocks {
    fn default() -> Self {
        Self::new()
    }
}
