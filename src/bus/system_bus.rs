//! The process-wide, loop-free event bus (spec §4.9, C8).
//!
//! Every emitted event carries a *sender chain*: the ids of every bus
//! that has already relayed it. `emit` fans out to every registered
//! recipient whose id is not yet in the chain, then appends its own id
//! before relaying onward — the only place in the design where a cycle
//! could otherwise form (bus → forked child bus → back, spec DN-4).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

// Layer 3: Internal module imports
use crate::util::ActorId;

/// An event on the System Bus: an opaque topic plus a JSON payload.
/// Actor-local events (`augmented`, `crashed`, ...) are folded in as
/// `topic = "actor.<kind>"`.
#[derive(Debug, Clone, Serialize)]
pub struct SystemEvent {
    pub topic: String,
    pub payload: Value,
    /// Bus ids that have already relayed this event.
    #[serde(skip)]
    pub chain: Vec<ActorId>,
}

impl SystemEvent {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            chain: Vec::new(),
        }
    }
}

/// Something that can receive a relayed event from a `SystemBus` on the
/// far side of a process/thread boundary: a forked-child or threaded
/// endpoint's transport, in practice.
#[async_trait]
pub trait ForkedRecipient: Send + Sync {
    fn recipient_id(&self) -> ActorId;
    async fn relay(&self, event: SystemEvent);
}

/// The bus owned by one Actor System (spec §4.7: "owns ... the system
/// bus").
pub struct SystemBus {
    id: ActorId,
    local: tokio::sync::broadcast::Sender<SystemEvent>,
    recipients: DashMap<ActorId, Arc<dyn ForkedRecipient>>,
}

const LOCAL_CHANNEL_CAPACITY: usize = 1024;

impl SystemBus {
    pub fn new() -> Self {
        let (local, _) = tokio::sync::broadcast::channel(LOCAL_CHANNEL_CAPACITY);
        Self {
            id: ActorId::new(),
            local,
            recipients: DashMap::new(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Subscribe to every event emitted on this bus.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SystemEvent> {
        self.local.subscribe()
    }

    /// Register a forked/threaded peer bus as a relay recipient.
    pub fn add_recipient(&self, recipient: Arc<dyn ForkedRecipient>) {
        self.recipients.insert(recipient.recipient_id(), recipient);
    }

    pub fn remove_recipient(&self, id: ActorId) {
        self.recipients.remove(&id);
    }

    /// Emit a fresh, locally-originated event.
    pub async fn emit(&self, topic: impl Into<String>, payload: Value) {
        self.relay(SystemEvent::new(topic, payload)).await;
    }

    /// Relay an event that may have already traversed other buses.
    pub async fn relay(&self, mut event: SystemEvent) {
        if event.chain.contains(&self.id) {
            trace!(bus = %self.id, topic = %event.topic, "dropping event already seen");
            return;
        }
        let _ = self.local.send(event.clone());
        event.chain.push(self.id);
        for entry in self.recipients.iter() {
            if !event.chain.contains(entry.key()) {
                entry.value().relay(event.clone()).await;
            }
        }
    }
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct RecordingRecipient {
        id: ActorId,
        bus: Arc<SystemBus>,
    }

    #[async_trait]
    impl ForkedRecipient for RecordingRecipient {
        fn recipient_id(&self) -> ActorId {
            self.id
        }

        async fn relay(&self, event: SystemEvent) {
            self.bus.relay(event).await;
        }
    }

    #[tokio::test]
    async fn emit_reaches_local_subscribers() {
        let bus = SystemBus::new();
        let mut rx = bus.subscribe();
        bus.emit("actor.augmented", Value::Null).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, "actor.augmented");
    }

    #[tokio::test]
    async fn relay_never_revisits_a_bus_in_the_chain() {
        let a = Arc::new(SystemBus::new());
        let b = Arc::new(SystemBus::new());

        a.add_recipient(Arc::new(RecordingRecipient { id: b.id(), bus: b.clone() }));
        b.add_recipient(Arc::new(RecordingRecipient { id: a.id(), bus: a.clone() }));

        let mut rx_b = b.subscribe();
        a.emit("actor.crashed", Value::Null).await;

        let event = tokio::time::timeout(std::time::Duration::from_millis(200), rx_b.recv())
            .await
            .expect("b should receive the relayed event")
            .unwrap();
        assert_eq!(event.topic, "actor.crashed");
    }
}
