use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::wizard::{Wizard, WizardError};

const IDLE_TTL: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_CAPACITY: usize = 500;

struct Entry {
    wizard: Wizard,
    touched: Instant,
}

/// Wizards in progress, keyed by a random id. Nothing is persisted; idle
/// wizards are dropped on the next access to the store. At most `capacity`
/// wizards are live at once.
#[derive(Clone)]
pub struct WizardStore {
    inner: Arc<Mutex<HashMap<Uuid, Entry>>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for WizardStore {
    fn default() -> Self {
        Self::with_limits(IDLE_TTL, DEFAULT_CAPACITY)
    }
}

impl WizardStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_limits(IDLE_TTL, capacity)
    }

    pub fn with_limits(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            capacity,
        }
    }

    fn evict_idle(&self, entries: &mut HashMap<Uuid, Entry>) {
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.touched.elapsed() <= ttl);
        if entries.len() < before {
            debug!("Evicted {} idle wizards", before - entries.len());
        }
    }

    pub async fn create(&self, wizard: Wizard) -> Result<Uuid, WizardError> {
        let mut entries = self.inner.lock().await;
        self.evict_idle(&mut entries);
        if entries.len() >= self.capacity {
            warn!("Wizard store full ({} live)", entries.len());
            return Err(WizardError::StoreFull);
        }
        let id = Uuid::new_v4();
        entries.insert(
            id,
            Entry {
                wizard,
                touched: Instant::now(),
            },
        );
        Ok(id)
    }

    /// Runs `f` on the wizard and marks it as used.
    pub async fn with_wizard<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Wizard) -> R,
    ) -> Result<R, WizardError> {
        let mut entries = self.inner.lock().await;
        self.evict_idle(&mut entries);
        let entry = entries.get_mut(&id).ok_or(WizardError::NotFound)?;
        entry.touched = Instant::now();
        Ok(f(&mut entry.wizard))
    }

    pub async fn remove(&self, id: Uuid) -> Option<Wizard> {
        self.inner.lock().await.remove(&id).map(|e| e.wizard)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
