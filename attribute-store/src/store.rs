//! Current-snapshot storage with change detection and observer fan-out
//!
//! This module provides the core storage primitive for device attributes:
//! - `AttributeStore`: holds exactly one current snapshot, replaces it
//!   wholesale when a structurally different one is published, and notifies
//!   registered observers once per distinct change
//! - `AttributeObserver`: the host-side receiver of whole-snapshot updates
//! - `PushPolicy`: how notifications behave for pull-oriented sessions

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::change::AttributeChange;
use crate::snapshot::AttributeSnapshot;
use crate::value::{AttributeSchema, AttributeValue};

// ============================================================================
// Observers
// ============================================================================

/// Receiver of attribute updates, typically a host-platform service
pub trait AttributeObserver: Send + Sync {
    /// Called with the new snapshot after it replaced the previous one
    fn on_attributes_updated(&self, snapshot: &AttributeSnapshot);

    /// Called when the device is presumed off because it became unreachable
    fn on_power_off(&self) {}
}

// ============================================================================
// PushPolicy
// ============================================================================

/// Push-notification behavior applied to changed snapshots
///
/// Sessions that are read through blocking pulls usually do not want pushes as
/// well; `Suppress` matches that. `RateLimited` pushes at most once per window
/// and delivers the latest snapshot on the first publication after the window
/// reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PushPolicy {
    Always,
    #[default]
    Suppress,
    RateLimited { min_interval_ms: u64 },
}

impl PushPolicy {
    pub fn rate_limited(min_interval: Duration) -> Self {
        PushPolicy::RateLimited {
            min_interval_ms: min_interval.as_millis() as u64,
        }
    }
}

/// What a single publication did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Publication {
    /// Attributes that changed; empty when the snapshot was equal
    pub changes: Vec<AttributeChange>,

    /// Whether observers were notified
    pub notified: bool,
}

impl Publication {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Default)]
struct PushState {
    last_push: Option<Instant>,
    deferred: bool,
}

// ============================================================================
// AttributeStore
// ============================================================================

/// Holder of the current attribute snapshot
///
/// # Example
///
/// ```rust,ignore
/// use attribute_store::{AttributeSchema, AttributeStore, PushPolicy};
///
/// let schema = AttributeSchema::yeelight();
/// let store = AttributeStore::new(&schema, PushPolicy::Always);
/// store.subscribe(service.clone());
///
/// let update = store.snapshot().with_values([("power", true.into())]);
/// assert!(store.diff_and_publish(update.clone()).notified);
///
/// // Equal snapshot: no notification
/// assert!(store.diff_and_publish(update).is_unchanged());
/// ```
pub struct AttributeStore {
    current: RwLock<Arc<AttributeSnapshot>>,
    observers: RwLock<Vec<Arc<dyn AttributeObserver>>>,
    power_attributes: Vec<String>,
    policy: PushPolicy,
    push: Mutex<PushState>,
}

impl AttributeStore {
    /// Create a store holding the schema's empty snapshot
    pub fn new(schema: &AttributeSchema, policy: PushPolicy) -> Self {
        Self {
            current: RwLock::new(Arc::new(schema.empty_snapshot())),
            observers: RwLock::new(Vec::new()),
            power_attributes: schema.power_attributes().map(str::to_string).collect(),
            policy,
            push: Mutex::new(PushState::default()),
        }
    }

    pub fn policy(&self) -> PushPolicy {
        self.policy
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<AttributeSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn subscribe(&self, observer: Arc<dyn AttributeObserver>) {
        self.observers.write().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Replace the snapshot if it differs and notify observers per policy
    pub fn diff_and_publish(&self, snapshot: AttributeSnapshot) -> Publication {
        self.diff_and_publish_at(snapshot, Instant::now())
    }

    /// Same as [`diff_and_publish`](Self::diff_and_publish) with an explicit clock
    pub fn diff_and_publish_at(&self, snapshot: AttributeSnapshot, now: Instant) -> Publication {
        let (changes, published) = {
            let mut current = self.current.write();
            if **current == snapshot {
                (Vec::new(), None)
            } else {
                let changes = current.diff(&snapshot);
                *current = Arc::new(snapshot);
                (changes, Some(Arc::clone(&current)))
            }
        };

        let to_push = match published {
            Some(snapshot) => self.admit(now).then_some(snapshot),
            // An equal snapshot can still release a push deferred by the rate limit
            None => self.release_deferred(now).then(|| self.snapshot()),
        };

        let notified = match to_push {
            Some(snapshot) => {
                self.notify(&snapshot);
                true
            }
            None => false,
        };

        Publication { changes, notified }
    }

    /// Build a new snapshot from the current one with local overrides
    ///
    /// Used for optimistic updates after a command was accepted. Observers are
    /// not notified: the caller already knows about the change.
    pub fn apply_local<'a>(&self, overrides: impl IntoIterator<Item = (&'a str, AttributeValue)>) {
        let mut current = self.current.write();
        let updated = current.with_values(overrides);
        *current = Arc::new(updated);
    }

    /// Force every power attribute off and tell observers the device is off
    pub fn power_off(&self) {
        self.apply_local(
            self.power_attributes
                .iter()
                .map(|name| (name.as_str(), AttributeValue::Bool(false))),
        );
        for observer in self.observers.read().iter() {
            observer.on_power_off();
        }
    }

    fn admit(&self, now: Instant) -> bool {
        match self.policy {
            PushPolicy::Always => true,
            PushPolicy::Suppress => false,
            PushPolicy::RateLimited { min_interval_ms } => {
                let mut push = self.push.lock();
                let open = push.last_push.map_or(true, |last| {
                    now.saturating_duration_since(last) >= Duration::from_millis(min_interval_ms)
                });
                if open {
                    push.last_push = Some(now);
                    push.deferred = false;
                } else {
                    push.deferred = true;
                }
                open
            }
        }
    }

    fn release_deferred(&self, now: Instant) -> bool {
        let PushPolicy::RateLimited { min_interval_ms } = self.policy else {
            return false;
        };
        let mut push = self.push.lock();
        let due = push.deferred
            && push.last_push.map_or(true, |last| {
                now.saturating_duration_since(last) >= Duration::from_millis(min_interval_ms)
            });
        if due {
            push.last_push = Some(now);
            push.deferred = false;
        }
        due
    }

    fn notify(&self, snapshot: &AttributeSnapshot) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_attributes_updated(snapshot);
        }
    }
}

impl std::fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeStore")
            .field("policy", &self.policy)
            .field("observer_count", &self.observer_count())
            .finish()
    }
}
