//! Reference marshalling integration tests.
//!
//! # Current Test Coverage
//!
//! 1. **Inter-host round-trip** (2 tests)
//!    - an unmarshalled handle reaches the same actor across a loopback
//!      TCP connection and observes its mutated state
//!    - `marshall`/`unmarshall` are both idempotent per actor id

#![allow(clippy::unwrap_used, clippy::expect_used)]

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use transept::actor::{ActorConfig, SystemContext, TopicMap};
use transept::system::ActorSystem;

// ============================================================================
// TEST GROUP 1: Inter-host round-trip
// ============================================================================

#[tokio::test]
async fn unmarshalled_handle_reaches_the_same_counter_actor() {
    let system = ActorSystem::builder().build();
    let count = Arc::new(AtomicI64::new(0));
    let behavior_count = count.clone();
    let behavior = TopicMap::new().on("bump", move |args, _proxy| {
        let count = behavior_count.clone();
        async move {
            let by = args.first().and_then(Value::as_i64).unwrap_or(1);
            let total = count.fetch_add(by, Ordering::SeqCst) + by;
            Ok(Value::from(total))
        }
    });

    let counter = system
        .root_actor(Box::new(behavior), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let descriptor = system
        .inter_host_marshaller()
        .marshall_inter_host(&counter)
        .await
        .expect("marshalling a live handle should bind a listener");
    assert_eq!(descriptor.actor_id, counter.id());

    let remote = system
        .inter_host_marshaller()
        .unmarshall(&descriptor, system.clone() as Arc<dyn SystemContext>)
        .await
        .expect("unmarshalling should dial the bound listener");
    assert_eq!(remote.id(), counter.id(), "an unmarshalled handle addresses the original actor's id");

    let reply = remote.send_and_receive("bump", vec![Value::from(5)]).await.expect("bump over the marshalled connection should succeed");
    assert_eq!(reply, Value::from(5));

    // The mutation is visible through the original, local handle too:
    // both proxies reach the same actor, not two independent copies.
    let reply = counter.send_and_receive("bump", vec![Value::from(2)]).await.expect("bump over the local handle should succeed");
    assert_eq!(reply, Value::from(7));
}

#[tokio::test]
async fn marshall_and_unmarshall_are_both_idempotent_per_actor_id() {
    let system = ActorSystem::builder().build();
    let behavior = TopicMap::new().on("ping", |_args, _proxy| async move { Ok(Value::String("pong".into())) });
    let actor = system
        .root_actor(Box::new(behavior), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let first = system.inter_host_marshaller().marshall_inter_host(&actor).await.expect("first marshall should succeed");
    let second = system.inter_host_marshaller().marshall_inter_host(&actor).await.expect("second marshall should succeed");
    assert_eq!(first, second, "marshalling the same actor twice must return the cached descriptor, not bind a second listener");

    let proxy_a = system
        .inter_host_marshaller()
        .unmarshall(&first, system.clone() as Arc<dyn SystemContext>)
        .await
        .expect("first unmarshall should dial the listener");
    let proxy_b = system
        .inter_host_marshaller()
        .unmarshall(&first, system.clone() as Arc<dyn SystemContext>)
        .await
        .expect("second unmarshall should return the cached source");
    assert_eq!(proxy_a.id(), proxy_b.id());

    let reply = proxy_b.send_and_receive("ping", vec![]).await.expect("ping over the cached source should succeed");
    assert_eq!(reply, Value::String("pong".into()));
}
