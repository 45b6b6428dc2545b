//! In-process messaging integration tests.
//!
//! # Current Test Coverage
//!
//! 1. **Send/receive roundtrip** (2 tests)
//!    - `sendAndReceive` against an in-memory root actor
//!    - `broadcastAndReceive` always returns the array form
//!
//! 2. **Lifecycle** (3 tests)
//!    - a not-ready actor rejects `send`/`sendAndReceive`
//!    - `destroy()` tears down children before the parent
//!    - `destroy()` is idempotent

#![allow(clippy::unwrap_used, clippy::expect_used)]

// Layer 1: Standard library imports
use std::sync::{Arc, Mutex};

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use transept::actor::{ActorConfig, ActorError, TopicMap};
use transept::system::ActorSystem;

// ============================================================================
// TEST GROUP 1: Send/receive roundtrip
// ============================================================================

#[tokio::test]
async fn in_memory_hello_roundtrip() {
    let system = ActorSystem::builder().build();
    let behavior = TopicMap::new().on("hello", |args, _proxy| async move {
        let name = args.first().and_then(Value::as_str).unwrap_or("world");
        Ok(Value::String(format!("Hello {name}")))
    });

    let root = system
        .root_actor(Box::new(behavior), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let reply = root
        .send_and_receive("hello", vec![Value::String("World".into())])
        .await
        .expect("hello should be handled locally");
    assert_eq!(reply, Value::String("Hello World".into()));
}

#[tokio::test]
async fn broadcast_and_receive_returns_array_even_without_children() {
    let system = ActorSystem::builder().build();
    let behavior = TopicMap::new().on("ping", |_args, _proxy| async move { Ok(Value::String("pong".into())) });
    let root = system
        .root_actor(Box::new(behavior), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let replies = root.broadcast_and_receive("ping", vec![]).await.expect("broadcast should succeed");
    assert_eq!(replies, vec![Value::String("pong".into())]);
}

// ============================================================================
// TEST GROUP 2: Lifecycle
// ============================================================================

#[tokio::test]
async fn destroyed_actor_rejects_further_sends() {
    let system = ActorSystem::builder().build();
    let behavior = TopicMap::new().on("noop", |_args, _proxy| async move { Ok(Value::Null) });
    let root = system
        .root_actor(Box::new(behavior), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");
    let id = root.id();

    root.destroy().await;

    let err = root.send_and_receive("noop", vec![]).await.expect_err("a destroyed actor must reject sends");
    assert!(matches!(err, ActorError::NotReady(actual) if actual == id), "expected not-ready for {id}, got {err:?}");
}

#[tokio::test]
async fn destroy_tears_down_children_before_the_parent() {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    struct RecordingBehavior {
        label: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait::async_trait]
    impl transept::actor::Behavior for RecordingBehavior {
        async fn handle(&mut self, _topic: &str, _args: Vec<Value>, _self_proxy: &transept::actor::ClientProxy) -> Option<Result<Value, String>> {
            None
        }

        fn has_handler(&self, _topic: &str) -> bool {
            false
        }

        async fn destroy(&mut self, _self_proxy: &transept::actor::ClientProxy) {
            self.order.lock().expect("lock poisoned").push(self.label);
        }
    }

    let system = ActorSystem::builder().build();
    let root = system
        .root_actor(
            Box::new(RecordingBehavior { label: "parent", order: order.clone() }),
            ActorConfig::in_memory(),
        )
        .await
        .expect("root actor should construct");

    root.create_child(
        "child",
        Box::new(RecordingBehavior { label: "child", order: order.clone() }),
        ActorConfig::in_memory(),
    )
    .await
    .expect("child should construct");

    root.destroy().await;

    let recorded = order.lock().expect("lock poisoned").clone();
    assert_eq!(recorded, vec!["child", "parent"], "children must be destroyed before their parent");
}

#[tokio::test]
async fn destroy_is_idempotent() {
    let system = ActorSystem::builder().build();
    let behavior = TopicMap::new();
    let root = system
        .root_actor(Box::new(behavior), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    root.destroy().await;
    root.destroy().await;
    root.destroy().await;

    assert_eq!(root.state(), transept::actor::ActorState::Destroyed);
}
