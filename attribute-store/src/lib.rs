//! Device Attribute Store
//!
//! Keeps the last known, always fully populated snapshot of a device's
//! attributes and tells observers when it changes.
//!
//! # Features
//!
//! - **Schema-shaped snapshots**: every tracked attribute always has a value,
//!   starting from a well-defined empty value per kind
//! - **Whole-snapshot replacement**: snapshots are immutable; updates swap in
//!   a new one
//! - **Change detection**: structurally equal snapshots never notify
//! - **Push policy**: notify always, never, or at most once per window
//!
//! # Quick Start
//!
//! ```rust
//! use attribute_store::{AttributeSchema, AttributeStore, PushPolicy};
//!
//! let schema = AttributeSchema::yeelight();
//! let store = AttributeStore::new(&schema, PushPolicy::Always);
//!
//! let update = store.snapshot().with_values([("power", true.into())]);
//! let publication = store.diff_and_publish(update);
//! assert_eq!(publication.changes.len(), 1);
//!
//! assert_eq!(store.snapshot().bool("power"), Some(true));
//! ```
//!
//! # Architecture
//!
//! ```text
//! AttributeStore
//!     │
//!     ├── current: Arc<AttributeSnapshot>   (replaced, never mutated)
//!     │
//!     ├── observers: Vec<Arc<dyn AttributeObserver>>
//!     │
//!     └── policy: PushPolicy
//! ```

pub mod change;
pub mod snapshot;
pub mod store;
pub mod value;

pub use change::AttributeChange;
pub use snapshot::{AttributeSnapshot, SnapshotBuilder};
pub use store::{AttributeObserver, AttributeStore, Publication, PushPolicy};
pub use value::{AttributeKind, AttributeSchema, AttributeSpec, AttributeValue};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::snapshot::AttributeSnapshot;
    pub use crate::store::{AttributeObserver, AttributeStore, PushPolicy};
    pub use crate::value::{AttributeKind, AttributeSchema, AttributeValue};
}
