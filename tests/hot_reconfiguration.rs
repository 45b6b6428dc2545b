//! Hot reconfiguration integration tests.
//!
//! # Current Test Coverage
//!
//! 1. **Identity preservation** (2 tests)
//!    - `changeConfiguration` on a forked child swaps in a fresh
//!      generation (a new underlying process, a new generation id) while
//!      the same `ClientProxy` handle keeps working
//!    - a configuration equal modulo `customParameters` is a no-op: the
//!      generation id (and so the underlying process) does not change
//!
//! 2. **No-op guards** (1 test)
//!    - hot-reconfiguring an in-memory (inline) actor is rejected, since
//!      there is no named definition to rebuild it from

#![allow(clippy::unwrap_used, clippy::expect_used)]

// Layer 1: Standard library imports
use std::sync::Once;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use transept::actor::{ActorConfig, ActorError, TopicMap};
use transept::endpoint::forked::WORKER_BINARY_ENV;
use transept::system::ActorSystem;

static INIT_WORKER_BIN: Once = Once::new();

fn ensure_worker_binary() {
    INIT_WORKER_BIN.call_once(|| {
        std::env::set_var(WORKER_BINARY_ENV, env!("CARGO_BIN_EXE_transept-worker"));
    });
}

// ============================================================================
// TEST GROUP 1: Identity preservation
// ============================================================================

#[tokio::test]
async fn change_configuration_swaps_the_generation_but_not_the_handle() {
    ensure_worker_binary();
    let system = ActorSystem::builder().build();
    let root = system
        .root_actor(Box::new(TopicMap::new()), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let child = root
        .create_forked_child("worker", "pid", ActorConfig::forked())
        .await
        .expect("forked child should spawn");

    let first_generation = child.id();
    let first_pid = child.send_and_receive("pid", vec![]).await.expect("pid should answer").as_u64().expect("pid should be a number");

    // A different ping timeout forces a real endpoint rebuild, since
    // `equal_modulo_custom_parameters` would otherwise no-op the call.
    let mut new_config = ActorConfig::forked();
    new_config.ping_timeout_ms = ActorConfig::forked().ping_timeout_ms + 5_000;
    child.change_configuration(new_config).await.expect("hot reconfiguration of a forked child should succeed");

    // Give the new worker process a moment to finish its own `root_actor`
    // construction before this proxy's swapped-in generation is sent to.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_ne!(child.id(), first_generation, "hot reconfiguration must swap in a new generation id");

    let second_pid = child.send_and_receive("pid", vec![]).await.expect("pid should answer on the new generation").as_u64().expect("pid should be a number");
    assert_ne!(second_pid, first_pid, "the rebuilt endpoint is backed by a distinct worker process");

    child.destroy().await;
}

#[tokio::test]
async fn change_configuration_equal_modulo_custom_parameters_is_a_no_op() {
    ensure_worker_binary();
    let system = ActorSystem::builder().build();
    let root = system
        .root_actor(Box::new(TopicMap::new()), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let child = root
        .create_forked_child("worker", "pid", ActorConfig::forked())
        .await
        .expect("forked child should spawn");

    let generation_before = child.id();
    let config_with_custom_parameter = ActorConfig::forked().with_custom_parameter("label", Value::String("unchanged".into()));
    child
        .change_configuration(config_with_custom_parameter)
        .await
        .expect("a custom-parameters-only change should be accepted");

    assert_eq!(child.id(), generation_before, "a config differing only in customParameters must not rebuild the endpoint");

    child.destroy().await;
}

// ============================================================================
// TEST GROUP 2: No-op guards
// ============================================================================

#[tokio::test]
async fn hot_reconfiguring_an_in_memory_actor_is_rejected() {
    let system = ActorSystem::builder().build();
    let root = system
        .root_actor(Box::new(TopicMap::new()), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let mut different_config = ActorConfig::in_memory();
    different_config.ping_timeout_ms = different_config.ping_timeout_ms + 1_000;

    let err = root.change_configuration(different_config).await.expect_err("an inline actor has no named definition to rebuild from");
    assert!(matches!(err, ActorError::InitError(_)), "expected an InitError, got {err:?}");
}
