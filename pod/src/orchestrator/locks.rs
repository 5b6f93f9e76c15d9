//! Per-app operation locks

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One mutex per app name. Operations on the same app run one at a time,
/// operations on different apps run concurrently.
#[derive(Debug, Default)]
pub struct AppLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `app`. The guard can be moved into a
    /// background task to keep the app locked until that task finishes.
    pub async fn acquire(&self, app: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(app.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Whether an operation on `app` is in flight
    pub async fn is_locked(&self, app: &str) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(app)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }
}
