use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Called after an entry is evicted by its inactivity watchdog. Used to
/// send the best-effort closing notice.
pub type ExpiryHook<S> =
    Arc<dyn Fn(String, S) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Entry<S> {
    state: S,
    /// Distinguishes the watchdog armed for this entry from one armed
    /// for an earlier entry under the same identity, so a timer that
    /// already fired but lost the lock race never evicts a fresh entry.
    epoch: u64,
    guard: CancellationToken,
}

/// Process-local keyed session store with a per-entry inactivity
/// watchdog.
///
/// # Timer system
///
/// Every `put` and `touch` cancels the entry's previous watchdog and
/// arms a new one for the full window. `remove` cancels the watchdog
/// before the entry is handed back, so a terminal transition never
/// leaves a stale timer to fire against a reused identity. On expiry the
/// entry is removed and the expiry hook runs with the evicted state.
///
/// The map lives in this process only; running more than one instance
/// needs an external session store. Known scaling constraint.
pub struct SessionStore<S> {
    inner: Arc<Mutex<HashMap<String, Entry<S>>>>,
    timeout: Duration,
    hook: Option<ExpiryHook<S>>,
    root: CancellationToken,
    epochs: AtomicU64,
}

impl<S: Clone + Send + 'static> SessionStore<S> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            hook: None,
            root: CancellationToken::new(),
            epochs: AtomicU64::new(0),
        }
    }

    pub fn with_expiry_hook(mut self, hook: ExpiryHook<S>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub async fn get(&self, identity: &str) -> Option<S> {
        self.inner
            .lock()
            .await
            .get(identity)
            .map(|e| e.state.clone())
    }

    pub async fn contains(&self, identity: &str) -> bool {
        self.inner.lock().await.contains_key(identity)
    }

    /// Stores (or replaces) the session and arms a fresh watchdog.
    pub async fn put(&self, identity: &str, state: S) {
        let mut inner = self.inner.lock().await;
        if let Some(old) = inner.remove(identity) {
            old.guard.cancel();
        }
        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed);
        let guard = self.root.child_token();
        inner.insert(
            identity.to_string(),
            Entry {
                state,
                epoch,
                guard: guard.clone(),
            },
        );
        drop(inner);
        self.arm_watchdog(identity.to_string(), epoch, guard);
    }

    /// Re-arms the watchdog without touching the state. No-op for an
    /// unknown identity.
    pub async fn touch(&self, identity: &str) {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.get_mut(identity) else {
            return;
        };
        entry.guard.cancel();
        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed);
        let guard = self.root.child_token();
        entry.epoch = epoch;
        entry.guard = guard.clone();
        drop(inner);
        self.arm_watchdog(identity.to_string(), epoch, guard);
    }

    /// Removes the session and cancels its watchdog.
    pub async fn remove(&self, identity: &str) -> Option<S> {
        let mut inner = self.inner.lock().await;
        inner.remove(identity).map(|entry| {
            entry.guard.cancel();
            entry.state
        })
    }

    /// Cancels every pending watchdog. The store stays usable; existing
    /// sessions simply stop expiring.
    pub fn close(&self) {
        self.root.cancel();
    }

    fn arm_watchdog(&self, identity: String, epoch: u64, guard: CancellationToken) {
        let inner = self.inner.clone();
        let hook = self.hook.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            select! {
                _ = guard.cancelled() => return,
                _ = sleep(timeout) => {}
            }
            let evicted = {
                let mut map = inner.lock().await;
                match map.get(&identity) {
                    Some(entry) if entry.epoch == epoch => map.remove(&identity),
                    _ => None,
                }
            };
            if let Some(entry) = evicted {
                debug!(identity = %identity, "session expired after inactivity");
                if let Some(hook) = hook {
                    hook(identity, entry.state).await;
                }
            }
        });
    }
}

/// Per-identity processing lanes: one inbound event for an identity runs
/// to completion before the next is admitted, while different identities
/// proceed fully concurrently.
#[derive(Default)]
pub struct IdentityLanes {
    lanes: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLanes {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, identity: &str) -> OwnedMutexGuard<()> {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap();
            lanes
                .entry(identity.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lane.lock_owned().await
    }
}
