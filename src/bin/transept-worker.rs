//! A worker-process bootstrap binary (spec §4.8, §4.5.2 "Child side").
//!
//! Forked and remote children run this binary (or one just like it).
//! It registers the small set of demo behaviors this crate's own
//! integration tests fork against, builds a [`BehaviorRegistry`] from
//! them, and hands off to [`run_stdio_worker`]. An application embedding
//! `transept` for its own actors builds its own such binary, registering
//! its own behavior factories under the names it passes to
//! [`transept::actor::ClientProxy::create_forked_child`], and points
//! [`ForkedEndpoint`] at it via the `TRANSEPT_WORKER_BIN` environment
//! variable (see [`transept::endpoint::forked::WORKER_BINARY_ENV`]).

use std::sync::Arc;

use serde_json::Value;
use transept::actor::{Behavior, TopicMap};
use transept::message::{MarshalError, MarshallerRegistry, ValueMarshaller};
use transept::system::BehaviorRegistry;
use transept::worker::{run_listen_worker, run_stdio_worker};

fn echo_behavior() -> Box<dyn Behavior> {
    Box::new(TopicMap::new().on("echo", |args, _proxy| async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) }))
}

fn pid_behavior() -> Box<dyn Behavior> {
    Box::new(
        TopicMap::new()
            .on("pid", |_args, _proxy| async move { Ok(Value::from(std::process::id())) })
            .on("echo", |args, _proxy| async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) }),
    )
}

/// Exits the process without replying, so the parent observes the
/// channel close and treats it as a crash (spec §4.4.5, scenario S3).
fn crashing_behavior() -> Box<dyn Behavior> {
    Box::new(
        TopicMap::new()
            .on("pid", |_args, _proxy| async move { Ok(Value::from(std::process::id())) })
            .on("crash", |_args, _proxy| async move { std::process::exit(1) }),
    )
}

fn build_registry() -> Arc<BehaviorRegistry> {
    let registry = BehaviorRegistry::new();
    registry.register("echo", echo_behavior);
    registry.register("pid", pid_behavior);
    registry.register("crashing", crashing_behavior);
    Arc::new(registry)
}

/// Demo marshaller exercised by this crate's own cross-process tests
/// (spec §4.3, testable property #2). An application embedding `transept`
/// registers its own marshallers here under the same type names its
/// parent process registers on its own [`transept::system::ActorSystem`].
struct UppercaseStringMarshaller;

impl ValueMarshaller for UppercaseStringMarshaller {
    fn type_name(&self) -> &str {
        "uppercase-string"
    }

    fn marshall(&self, value: &Value) -> Result<Value, MarshalError> {
        let s = value.as_str().ok_or_else(|| MarshalError::Failed {
            type_name: self.type_name().to_string(),
            reason: "expected a string".to_string(),
        })?;
        Ok(Value::String(s.to_uppercase()))
    }

    fn unmarshall(&self, value: Value) -> Result<Value, MarshalError> {
        Ok(value)
    }
}

fn build_marshallers() -> Arc<MarshallerRegistry> {
    let registry = MarshallerRegistry::new();
    registry.register(Box::new(UppercaseStringMarshaller));
    Arc::new(registry)
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();
    if std::env::args().any(|arg| arg == "--listen") {
        run_listen_worker(build_registry(), build_marshallers()).await;
    } else {
        run_stdio_worker(build_registry(), build_marshallers()).await;
    }
}
