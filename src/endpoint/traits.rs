//! The common interface every dispatch endpoint implements (spec §4.5:
//! "they differ in how `send0`/`sendAndReceive0`/`destroy0` physically
//! deliver a call").

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use crate::actor::config::ActorConfig;
use crate::actor::context::SystemContext;
use crate::actor::error::ActorError;
use crate::actor::proxy::ClientProxy;
use crate::util::ActorId;

/// A mode-specific implementation of the physical half of an actor.
///
/// `ActorCore` owns exactly one `Endpoint` at a time; hot reconfiguration
/// and respawn both work by constructing a fresh `Endpoint` and swapping
/// it in (spec §4.4.4, §4.4.5).
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// The id this endpoint was assigned when it was created. Changes
    /// across hot reconfiguration/respawn even though the owning
    /// `ClientProxy`'s identity does not (spec §3 invariants).
    fn id(&self) -> ActorId;

    /// Whether this endpoint would handle `topic` locally, without
    /// dispatching. In-memory endpoints answer from their behavior map;
    /// every other endpoint's real behavior lives on the far side of a
    /// transport, so it answers `false` (spec §4.4.3).
    fn has_handler(&self, _topic: &str) -> bool {
        false
    }

    /// Fire-and-forget delivery (spec §4.4.2: "resolves when frame
    /// handed to bus").
    async fn send0(&self, topic: &str, args: Vec<Value>, self_proxy: &ClientProxy) -> Result<(), ActorError>;

    /// Request/response delivery, correlated by message id.
    async fn send_and_receive0(
        &self,
        topic: &str,
        args: Vec<Value>,
        self_proxy: &ClientProxy,
    ) -> Result<Value, ActorError>;

    /// Tear the endpoint down: close transports, run local cleanup.
    async fn destroy0(&self, self_proxy: &ClientProxy);

    /// The endpoint's own metrics hook, if it has one (spec §4.4.1: `metrics()`).
    async fn metrics0(&self) -> Option<Value> {
        None
    }

    /// A one-shot signal that resolves when this endpoint's peer is
    /// observed to have died (process exit, idle ping timeout). Used by
    /// `ActorCore` to drive the crashed → respawn transition
    /// (spec §4.4.5). In-memory endpoints never resolve this.
    fn on_crash(&self) -> oneshot::Receiver<()> {
        let (_tx, rx) = oneshot::channel();
        rx
    }
}

/// Everything an endpoint constructor needs beyond the behavior/config
/// supplied by the caller of `createChild`.
pub struct EndpointContext {
    pub id: ActorId,
    pub name: String,
    pub parent: Option<ClientProxy>,
    pub config: ActorConfig,
    pub system: Arc<dyn SystemContext>,
}
