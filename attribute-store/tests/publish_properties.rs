//! Property-based tests for snapshot publication
//!
//! Observers must see exactly one notification per distinct change, no matter
//! how the sequence of published snapshots repeats itself.

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use attribute_store::{AttributeObserver, AttributeSchema, AttributeSnapshot, AttributeStore, PushPolicy};

#[derive(Default)]
struct Counter(AtomicUsize);

impl AttributeObserver for Counter {
    fn on_attributes_updated(&self, _snapshot: &AttributeSnapshot) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Brightness sequences drawn from a small range so repeats are common
fn brightness_sequence() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..4, 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Notifications equal the number of adjacent distinct values
    #[test]
    fn prop_notifies_once_per_distinct_change(values in brightness_sequence()) {
        let schema = AttributeSchema::yeelight();
        let store = AttributeStore::new(&schema, PushPolicy::Always);
        let counter = Arc::new(Counter::default());
        store.subscribe(counter.clone());

        let mut expected = 0;
        let mut previous = 0i64;
        for value in &values {
            if *value != previous {
                expected += 1;
                previous = *value;
            }
            let snapshot = schema.empty_snapshot().with_values([("bright", (*value).into())]);
            store.diff_and_publish(snapshot);
        }

        prop_assert_eq!(counter.0.load(Ordering::SeqCst), expected);
        prop_assert_eq!(store.snapshot().number("bright"), Some(previous));
    }

    /// Publishing the same snapshot twice never notifies on the second call
    #[test]
    fn prop_repeat_publication_is_silent(value in 0i64..100, power in any::<bool>()) {
        let schema = AttributeSchema::yeelight();
        let store = AttributeStore::new(&schema, PushPolicy::Always);
        let counter = Arc::new(Counter::default());
        store.subscribe(counter.clone());

        let snapshot = schema
            .empty_snapshot()
            .with_values([("bright", value.into()), ("power", power.into())]);
        store.diff_and_publish(snapshot.clone());
        let after_first = counter.0.load(Ordering::SeqCst);

        let second = store.diff_and_publish(snapshot);
        prop_assert!(second.is_unchanged());
        prop_assert_eq!(counter.0.load(Ordering::SeqCst), after_first);
        prop_assert!(after_first <= 1);
    }
}
