//! The in-memory endpoint: runs the behavior inline on the hosting
//! process's executor (spec §4.5.1).

// Layer 1: Standard library imports

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

// Layer 3: Internal module imports
use super::traits::Endpoint;
use crate::actor::behavior::Behavior;
use crate::actor::error::ActorError;
use crate::actor::proxy::ClientProxy;
use crate::util::ActorId;

/// Queues nothing: per spec §4.5.1/DN-1, calls made before `state =
/// ready` are rejected, not deferred, so this endpoint never needs a
/// pending-message queue. `Mutex` enforces the "one message at a time"
/// guarantee from spec §5 without the core needing its own lock.
pub struct InMemoryEndpoint {
    id: ActorId,
    behavior: Mutex<Box<dyn Behavior>>,
}

impl InMemoryEndpoint {
    pub fn new(id: ActorId, behavior: Box<dyn Behavior>) -> Self {
        Self {
            id,
            behavior: Mutex::new(behavior),
        }
    }

    pub async fn initialize(&self, self_proxy: &ClientProxy) -> Result<(), ActorError> {
        self.behavior
            .lock()
            .await
            .initialize(self_proxy)
            .await
            .map_err(ActorError::InitError)
    }
}

#[async_trait]
impl Endpoint for InMemoryEndpoint {
    fn id(&self) -> ActorId {
        self.id
    }

    fn has_handler(&self, topic: &str) -> bool {
        self.behavior
            .try_lock()
            .map(|b| b.has_handler(topic))
            .unwrap_or(false)
    }

    async fn send0(&self, topic: &str, args: Vec<Value>, self_proxy: &ClientProxy) -> Result<(), ActorError> {
        let mut behavior = self.behavior.lock().await;
        match behavior.handle(topic, args, self_proxy).await {
            Some(Ok(_)) => Ok(()),
            Some(Err(_)) => Ok(()), // spec §7: handler errors are discarded for `send`
            None => Err(ActorError::NoHandler(self.id, topic.to_string())),
        }
    }

    async fn send_and_receive0(
        &self,
        topic: &str,
        args: Vec<Value>,
        self_proxy: &ClientProxy,
    ) -> Result<Value, ActorError> {
        let mut behavior = self.behavior.lock().await;
        match behavior.handle(topic, args, self_proxy).await {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(ActorError::RemoteError(message)),
            None => Err(ActorError::NoHandler(self.id, topic.to_string())),
        }
    }

    async fn destroy0(&self, self_proxy: &ClientProxy) {
        self.behavior.lock().await.destroy(self_proxy).await;
    }

    async fn metrics0(&self) -> Option<Value> {
        self.behavior.lock().await.metrics().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actor::behavior::TopicMap;

    #[tokio::test]
    async fn dispatches_to_behavior_and_reports_no_handler() {
        let behavior = TopicMap::new().on("hello", |_args, _proxy| async move { Ok(Value::String("hi".into())) });
        let endpoint = InMemoryEndpoint::new(ActorId::new(), Box::new(behavior));
        let proxy = ClientProxy::detached_for_test();

        let result = endpoint.send_and_receive0("hello", vec![], &proxy).await.unwrap();
        assert_eq!(result, Value::String("hi".into()));

        let err = endpoint.send_and_receive0("missing", vec![], &proxy).await.unwrap_err();
        assert!(matches!(err, ActorError::NoHandler(_, _)));
    }
}
