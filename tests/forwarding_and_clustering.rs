//! Forwarding and cluster-balancing integration tests.
//!
//! # Current Test Coverage
//!
//! 1. **Forwarding** (1 test)
//!    - a child forwards an unhandled topic to its parent, and the
//!      parent's own handler answers it
//!
//! 2. **Round-robin balancing** (2 tests)
//!    - a forked cluster of three independent worker processes is
//!      visited in exact, wrapping round-robin order, each reply
//!      carrying a distinct pid
//!    - the default balancer kind is round-robin

#![allow(clippy::unwrap_used, clippy::expect_used)]

// Layer 1: Standard library imports
use std::sync::Once;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use transept::actor::config::BalancerKind;
use transept::actor::{ActorConfig, TopicMap};
use transept::endpoint::forked::WORKER_BINARY_ENV;
use transept::system::ActorSystem;

static INIT_WORKER_BIN: Once = Once::new();

fn ensure_worker_binary() {
    INIT_WORKER_BIN.call_once(|| {
        std::env::set_var(WORKER_BINARY_ENV, env!("CARGO_BIN_EXE_transept-worker"));
    });
}

// ============================================================================
// TEST GROUP 1: Forwarding
// ============================================================================

#[tokio::test]
async fn child_forwards_unhandled_topic_to_its_parent() {
    let system = ActorSystem::builder().build();
    let parent_behavior = TopicMap::new().on("greet", |args, _proxy| async move {
        let name = args.first().and_then(Value::as_str).unwrap_or("world");
        Ok(Value::String(format!("parent says hi to {name}")))
    });
    let root = system
        .root_actor(Box::new(parent_behavior), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    // A behavior with no handlers at all: every topic is "unhandled"
    // locally, so the forward rule is the only way it can be answered.
    let child = root
        .create_child("delegate", Box::new(TopicMap::new()), ActorConfig::in_memory())
        .await
        .expect("child should construct");
    child.forward_to_parent(transept::actor::TopicPattern::Exact("greet".into()));

    let reply = child
        .send_and_receive("greet", vec![Value::String("Ada".into())])
        .await
        .expect("forwarded call should be answered by the parent");
    assert_eq!(reply, Value::String("parent says hi to Ada".into()));
}

// ============================================================================
// TEST GROUP 2: Round-robin balancing
// ============================================================================

#[tokio::test]
async fn forked_cluster_of_three_balances_round_robin_across_distinct_pids() {
    ensure_worker_binary();
    let system = ActorSystem::builder().build();
    let root = system
        .root_actor(Box::new(TopicMap::new()), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let config = ActorConfig::forked().with_cluster_size(3);
    let cluster = root
        .create_forked_cluster("workers", "pid", 3, config)
        .await
        .expect("forked cluster should spawn");

    let mut pids = Vec::new();
    for _ in 0..6 {
        let reply = cluster.send_and_receive("pid", vec![]).await.expect("cluster dispatch should succeed");
        pids.push(reply.as_u64().expect("pid reply should be a number"));
    }

    let distinct: std::collections::HashSet<u64> = pids.iter().copied().collect();
    assert_eq!(distinct.len(), 3, "each cluster member is a distinct process");
    assert_eq!(pids[0..3], pids[3..6], "round-robin repeats the same cycle of pids");

    cluster.destroy().await;
}

/// Sanity check that the default balancer kind is round-robin, matching
/// what both tests above rely on implicitly.
#[test]
fn default_balancer_is_round_robin() {
    assert_eq!(ActorConfig::default().balancer, BalancerKind::RoundRobin);
}
