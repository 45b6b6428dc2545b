//! User-supplied actor behavior (spec DN-2: "behavior polymorphism").
//!
//! The core looks up an entry by topic and invokes it; it does not care
//! whether the behavior was authored as a bag of named handlers or as an
//! object whose methods happen to double as handlers. Both shapes
//! implement the same [`Behavior`] trait.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;

// Layer 3: Internal module imports
use super::proxy::ClientProxy;

/// A boxed, `Send` future resolving to a handler's result.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// The user-supplied mapping *topic → handler*, plus the optional
/// `initialize`/`destroy`/`metrics` hooks (spec §3: "behavior").
///
/// `&mut self` models the "one message at a time, serially" guarantee
/// from spec §5: the actor core never calls these methods concurrently
/// with each other.
#[async_trait]
pub trait Behavior: Send + 'static {
    /// Called once before the actor starts receiving messages. Failure
    /// here aborts startup and propagates to the caller of `createChild`
    /// (spec §4.4.1, §7: `init-error`).
    async fn initialize(&mut self, _self_proxy: &ClientProxy) -> Result<(), String> {
        Ok(())
    }

    /// Dispatch one message. Returns `None` if this behavior has no
    /// handler for `topic` (the core turns that into `no-handler`).
    async fn handle(
        &mut self,
        topic: &str,
        args: Vec<Value>,
        self_proxy: &ClientProxy,
    ) -> Option<Result<Value, String>>;

    /// Whether `topic` would be handled locally, without actually
    /// invoking the handler. Used by forward-table resolution (spec
    /// §4.4.3: "is not in the local behavior").
    fn has_handler(&self, topic: &str) -> bool;

    /// Called when the actor is destroyed, after its children.
    async fn destroy(&mut self, _self_proxy: &ClientProxy) {}

    /// Optional user metrics snapshot, folded into `metrics()` rollups.
    async fn metrics(&self) -> Option<Value> {
        None
    }
}

type SyncHandlerFn = dyn Fn(Vec<Value>, ClientProxy) -> HandlerFuture + Send + Sync;

/// A ready-made [`Behavior`] for the common "mapping topic → handler"
/// shape, so callers don't need to write a struct and `impl Behavior`
/// just to register a handful of closures.
#[derive(Default)]
pub struct TopicMap {
    handlers: HashMap<String, Box<SyncHandlerFn>>,
}

impl TopicMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `topic`. The closure receives the call's
    /// argument array and a proxy it can use to reach its own parent or
    /// children (e.g. `self_proxy.parent()`).
    pub fn on<F, Fut>(mut self, topic: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>, ClientProxy) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.handlers.insert(
            topic.into(),
            Box::new(move |args, proxy| Box::pin(handler(args, proxy))),
        );
        self
    }
}

#[async_trait]
impl Behavior for TopicMap {
    async fn handle(
        &mut self,
        topic: &str,
        args: Vec<Value>,
        self_proxy: &ClientProxy,
    ) -> Option<Result<Value, String>> {
        let handler = self.handlers.get(topic)?;
        Some(handler(args, self_proxy.clone()).await)
    }

    fn has_handler(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn topic_map_dispatches_registered_handler() {
        let mut behavior = TopicMap::new().on("hello", |args, _proxy| async move {
            let name = args.first().and_then(|v| v.as_str()).unwrap_or("world");
            Ok(Value::String(format!("Hello {name}")))
        });

        assert!(behavior.has_handler("hello"));
        assert!(!behavior.has_handler("bye"));

        let proxy = ClientProxy::detached_for_test();
        let result = behavior
            .handle("hello", vec![Value::String("World".into())], &proxy)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, Value::String("Hello World".into()));
    }

    #[tokio::test]
    async fn topic_map_returns_none_for_unknown_topic() {
        let mut behavior = TopicMap::new();
        let proxy = ClientProxy::detached_for_test();
        assert!(behavior.handle("missing", vec![], &proxy).await.is_none());
    }
}
