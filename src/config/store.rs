//! Reactive Config Store - the single observable `PipelineConfig`
//!
//! Lifecycle: `Uninitialized → Loaded → (Updating → Loaded)*`.
//!
//! - `init()` fetches from the authority; on failure the previous (or default)
//!   config stays active and startup continues.
//! - `get()` hands out a deep copy; the live value sits behind an `ArcSwap`
//!   so a reader never observes a half-applied update.
//! - `update()` submits a patch and merges it locally only after the authority
//!   confirms. A rejected or failed submit leaves local state untouched.
//! - Observers are notified synchronously, in subscription order, over the
//!   observer set captured at the time of the change. A failing or panicking
//!   observer is logged and skipped.
//! - Observers cannot await `update()`. A change requested from inside a
//!   notification goes through [`ReactiveConfigStore::defer_update`] and is
//!   applied once the current pass has finished.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::authority::ConfigAuthority;
use super::pipeline::{PipelineConfig, PipelineConfigPatch};

/// Upper bound on deferred patches applied after one update, so an observer
/// that always defers cannot spin the store forever.
const MAX_DEFERRED_PER_PASS: usize = 16;

/// Store lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Uninitialized,
    Loaded,
    Updating,
}

/// What triggered a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    Load,
    Update,
}

/// Errors absorbed by the store. Logged, never returned from `get()`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("config load failed: {0}")]
    LoadFailed(String),
    #[error("config update rejected: {0}")]
    UpdateRejected(String),
    #[error("config authority unreachable: {0}")]
    Transport(String),
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Delivered to every observer after a confirmed change.
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub previous: Arc<PipelineConfig>,
    pub current: Arc<PipelineConfig>,
    pub changed_fields: Vec<&'static str>,
    pub origin: ChangeOrigin,
}

/// Config change listener.
pub trait ConfigObserver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "observer"
    }

    /// Called synchronously for each confirmed change.
    fn on_config_changed(&self, change: &ConfigChange) -> anyhow::Result<()>;
}

/// Handle returned by `subscribe`.
pub type SubscriptionId = u64;

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    observer: Arc<dyn ConfigObserver>,
}

fn same_observer(a: &Arc<dyn ConfigObserver>, b: &Arc<dyn ConfigObserver>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Observable, authority-backed pipeline configuration.
pub struct ReactiveConfigStore {
    current: ArcSwap<PipelineConfig>,
    state: Mutex<StoreState>,
    authority: Arc<dyn ConfigAuthority>,
    observers: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    deferred: Mutex<VecDeque<PipelineConfigPatch>>,
    /// Serialises load, update and notification passes.
    write_lock: tokio::sync::Mutex<()>,
}

impl ReactiveConfigStore {
    /// Create a store holding `initial` until `init()` succeeds.
    pub fn new(authority: Arc<dyn ConfigAuthority>, initial: PipelineConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            state: Mutex::new(StoreState::Uninitialized),
            authority,
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            deferred: Mutex::new(VecDeque::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> StoreState {
        *lock(&self.state)
    }

    fn set_state(&self, state: StoreState) {
        *lock(&self.state) = state;
    }

    /// Deep copy of the current configuration.
    pub fn get(&self) -> PipelineConfig {
        PipelineConfig::clone(&self.current.load())
    }

    /// Shared immutable view of the current configuration.
    pub fn snapshot(&self) -> Arc<PipelineConfig> {
        self.current.load_full()
    }

    /// Fetch configuration from the authority.
    ///
    /// Best-effort: returns `true` when a fetched config was applied, `false`
    /// when the previous config was retained. Never fails the caller.
    pub async fn init(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        let applied = match self.load_from_authority().await {
            Ok(fetched) => {
                let previous = self.current.load_full();
                let fetched = Arc::new(fetched);
                self.current.store(Arc::clone(&fetched));
                info!(authority = self.authority.name(), "Pipeline config loaded");
                self.set_state(StoreState::Loaded);
                self.notify(previous, fetched, ChangeOrigin::Load);
                true
            }
            Err(e) => {
                warn!(authority = self.authority.name(), error = %e, "Keeping previous pipeline config");
                if self.state() == StoreState::Uninitialized {
                    self.set_state(StoreState::Loaded);
                }
                false
            }
        };
        self.drain_deferred().await;
        applied
    }

    async fn load_from_authority(&self) -> Result<PipelineConfig, ConfigStoreError> {
        let fetched = self
            .authority
            .fetch()
            .await
            .map_err(|e| ConfigStoreError::LoadFailed(e.to_string()))?;
        fetched.validate().map_err(ConfigStoreError::Invalid)?;
        Ok(fetched)
    }

    /// Submit a partial update. Local state changes only after the authority
    /// confirms; returns whether the update was applied.
    ///
    /// Observer failures never affect the return value.
    pub async fn update(&self, patch: PipelineConfigPatch) -> bool {
        let _guard = self.write_lock.lock().await;
        let applied = match self.apply_update(&patch).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Pipeline config update not applied");
                false
            }
        };
        self.drain_deferred().await;
        applied
    }

    /// Caller must hold `write_lock`.
    async fn apply_update(&self, patch: &PipelineConfigPatch) -> Result<(), ConfigStoreError> {
        let before_state = self.state();
        self.set_state(StoreState::Updating);
        let result = self.submit_and_merge(patch).await;
        // Updating always settles back to Loaded (or stays Uninitialized)
        self.set_state(match before_state {
            StoreState::Uninitialized => StoreState::Uninitialized,
            _ => StoreState::Loaded,
        });
        let (previous, next) = result?;
        self.notify(previous, next, ChangeOrigin::Update);
        Ok(())
    }

    async fn submit_and_merge(
        &self,
        patch: &PipelineConfigPatch,
    ) -> Result<(Arc<PipelineConfig>, Arc<PipelineConfig>), ConfigStoreError> {
        let previous = self.current.load_full();
        let candidate = previous.merged(patch);
        candidate.validate().map_err(ConfigStoreError::Invalid)?;

        let ack = self
            .authority
            .submit(patch)
            .await
            .map_err(|e| ConfigStoreError::Transport(e.to_string()))?;
        if !ack.success {
            return Err(ConfigStoreError::UpdateRejected(
                ack.error.unwrap_or_else(|| "rejected by authority".to_string()),
            ));
        }

        let next = Arc::new(candidate);
        self.current.store(Arc::clone(&next));
        info!(
            changed = ?previous.changed_fields(&next),
            "Pipeline config updated"
        );
        Ok((previous, next))
    }

    /// Queue a patch to be applied after the current notification pass.
    ///
    /// Safe to call from inside an observer. Outside a pass the patch waits
    /// for the next `update`, `init` or `flush_deferred`.
    pub fn defer_update(&self, patch: PipelineConfigPatch) {
        debug!("Pipeline config update deferred");
        lock(&self.deferred).push_back(patch);
    }

    /// Apply queued patches now. Returns how many were applied.
    pub async fn flush_deferred(&self) -> usize {
        let _guard = self.write_lock.lock().await;
        self.drain_deferred().await
    }

    /// Caller must hold `write_lock`.
    async fn drain_deferred(&self) -> usize {
        let mut applied = 0;
        for _ in 0..MAX_DEFERRED_PER_PASS {
            let Some(patch) = lock(&self.deferred).pop_front() else {
                return applied;
            };
            match self.apply_update(&patch).await {
                Ok(()) => applied += 1,
                Err(e) => warn!(error = %e, "Deferred pipeline config update not applied"),
            }
        }
        let left = lock(&self.deferred).len();
        if left > 0 {
            warn!(pending = left, "Deferred config updates left queued for the next pass");
        }
        applied
    }

    /// Register an observer. Registering the same `Arc` twice is a no-op and
    /// returns the original id.
    pub fn subscribe(&self, observer: Arc<dyn ConfigObserver>) -> SubscriptionId {
        let mut observers = lock(&self.observers);
        if let Some(existing) = observers.iter().find(|r| same_observer(&r.observer, &observer)) {
            return existing.id;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(observer = observer.name(), id, "Config observer subscribed");
        observers.push(Registration { id, observer });
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&self, observer: &Arc<dyn ConfigObserver>) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|r| !same_observer(&r.observer, observer));
        before != observers.len()
    }

    /// Remove an observer by subscription id.
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|r| r.id != id);
        before != observers.len()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// One synchronous notification pass. Caller must hold `write_lock`.
    fn notify(&self, previous: Arc<PipelineConfig>, current: Arc<PipelineConfig>, origin: ChangeOrigin) {
        let changed_fields = previous.changed_fields(&current);
        if changed_fields.is_empty() {
            return;
        }
        let change = ConfigChange {
            previous,
            current,
            changed_fields,
            origin,
        };

        // Observers may (un)subscribe during the pass; that affects the next one
        let observers: Vec<Registration> = lock(&self.observers).clone();
        for reg in &observers {
            let outcome = catch_unwind(AssertUnwindSafe(|| reg.observer.on_config_changed(&change)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    observer = reg.observer.name(),
                    error = %e,
                    "Config observer failed"
                ),
                Err(_) => warn!(observer = reg.observer.name(), "Config observer panicked"),
            }
        }
    }
}
