//! Forked-process worker integration tests.
//!
//! These tests fork the crate's own `transept-worker` binary, built by
//! Cargo ahead of the test run and located via `CARGO_BIN_EXE_*`.
//!
//! # Current Test Coverage
//!
//! 1. **Forked dispatch** (2 tests)
//!    - a forked child answers on its own process, with its own pid
//!    - a forked child's `sendAndReceive` round-trips a value
//!
//! 2. **Crash and respawn** (1 test)
//!    - an `onCrash: respawn` child survives three consecutive crashes,
//!      each time coming back with a fresh pid and accepting messages again

#![allow(clippy::unwrap_used, clippy::expect_used)]

// Layer 1: Standard library imports
use std::sync::Once;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde_json::Value;

// Layer 3: Internal module imports
use transept::actor::{ActorConfig, OnCrash};
use transept::endpoint::forked::WORKER_BINARY_ENV;
use transept::system::ActorSystem;

static INIT_WORKER_BIN: Once = Once::new();

fn ensure_worker_binary() {
    INIT_WORKER_BIN.call_once(|| {
        std::env::set_var(WORKER_BINARY_ENV, env!("CARGO_BIN_EXE_transept-worker"));
    });
}

// ============================================================================
// TEST GROUP 1: Forked dispatch
// ============================================================================

#[tokio::test]
async fn forked_child_reports_its_own_pid() {
    ensure_worker_binary();
    let system = ActorSystem::builder().build();
    let root = system
        .root_actor(Box::new(transept::actor::TopicMap::new()), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let child = root
        .create_forked_child("worker", "pid", ActorConfig::forked())
        .await
        .expect("forked child should spawn");

    let pid = child.send_and_receive("pid", vec![]).await.expect("pid should be answered");
    let pid = pid.as_u64().expect("pid response should be a number");
    assert_ne!(pid, std::process::id() as u64, "the forked child must report its own pid, not the parent's");

    child.destroy().await;
}

#[tokio::test]
async fn forked_child_echoes_arguments() {
    ensure_worker_binary();
    let system = ActorSystem::builder().build();
    let root = system
        .root_actor(Box::new(transept::actor::TopicMap::new()), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let child = root
        .create_forked_child("worker", "echo", ActorConfig::forked())
        .await
        .expect("forked child should spawn");

    let reply = child
        .send_and_receive("echo", vec![Value::String("round-trip".into())])
        .await
        .expect("echo should be answered");
    assert_eq!(reply, Value::String("round-trip".into()));

    child.destroy().await;
}

// ============================================================================
// TEST GROUP 2: Crash and respawn
// ============================================================================

#[tokio::test]
async fn crashing_child_respawns_three_times_with_a_fresh_pid_each_time() {
    ensure_worker_binary();
    let system = ActorSystem::builder().build();
    let root = system
        .root_actor(Box::new(transept::actor::TopicMap::new()), ActorConfig::in_memory())
        .await
        .expect("root actor should construct");

    let config = ActorConfig::forked().with_on_crash(OnCrash::Respawn);
    let child = root
        .create_forked_child("worker", "crashing", config)
        .await
        .expect("forked child should spawn");

    let mut last_pid = child
        .send_and_receive("pid", vec![])
        .await
        .expect("pid should be answered")
        .as_u64()
        .expect("pid response should be a number");

    for attempt in 1..=3 {
        // Fire-and-forget: the handler calls `std::process::exit(1)` and
        // never replies, so the channel closing is what the parent
        // observes as a crash.
        let _ = child.send("crash", vec![]).await;

        let pid = wait_for_respawn(&child, last_pid).await.unwrap_or_else(|| panic!("child did not respawn after crash #{attempt}"));
        assert_ne!(pid, last_pid, "respawn #{attempt} should hand out a fresh pid");
        last_pid = pid;
    }

    child.destroy().await;
}

/// Polls `pid` until it answers with something other than `previous_pid`,
/// tolerating the brief window where the state is `crashed` and a respawn
/// is still in flight.
async fn wait_for_respawn(child: &transept::actor::ClientProxy, previous_pid: u64) -> Option<u64> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        if let Ok(value) = child.send_and_receive("pid", vec![]).await {
            if let Some(pid) = value.as_u64() {
                if pid != previous_pid {
                    return Some(pid);
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}
