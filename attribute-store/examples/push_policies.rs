//! Push policies - what observers see for the same stream of updates
//!
//! Run: cargo run -p yeelight-sdk-attribute-store --example push_policies

use attribute_store::{change, AttributeObserver, AttributeSchema, AttributeSnapshot, AttributeStore, PushPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Printer(&'static str);

impl AttributeObserver for Printer {
    fn on_attributes_updated(&self, snapshot: &AttributeSnapshot) {
        println!("  [{}] bright={:?}", self.0, snapshot.number("bright"));
    }
}

fn main() {
    let schema = AttributeSchema::yeelight();
    let policies = [
        ("always", PushPolicy::Always),
        ("suppress", PushPolicy::Suppress),
        ("rate-limited", PushPolicy::rate_limited(Duration::from_secs(2))),
    ];

    for (label, policy) in policies {
        println!("{}:", label);
        let store = AttributeStore::new(&schema, policy);
        store.subscribe(Arc::new(Printer(label)));

        let start = Instant::now();
        for (second, bright) in [(0u64, 10i64), (1, 20), (1, 20), (3, 30)] {
            let update = store.snapshot().with_values([("bright", bright.into())]);
            let publication = store.diff_and_publish_at(update, start + Duration::from_secs(second));
            if publication.is_unchanged() {
                println!("  t={}s unchanged", second);
            } else {
                println!("  t={}s {}", second, change::describe(&publication.changes));
            }
        }
    }
}
