//! The Client Proxy: the only handle exposed to user code.
//!
//! A proxy's identity (the `Arc<RwLock<..>>` pointer) survives hot
//! reconfiguration and respawn; only the `Arc<ActorCore>` generation it
//! points at changes. Cloning a `ClientProxy` clones the outer `Arc`, so
//! every clone observes the same generation swaps.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use parking_lot::RwLock;
use serde_json::Value;

// Layer 3: Internal module imports
use super::core::ActorCore;
use super::error::ActorError;
use super::state::{ActorMode, ActorState};
use crate::util::ActorId;

/// The stable, user-visible handle to an actor (spec §4.4: "the only
/// handle exposed to user code").
#[derive(Clone)]
pub struct ClientProxy {
    inner: Arc<RwLock<Arc<ActorCore>>>,
}

impl ClientProxy {
    pub(crate) fn new(core: Arc<ActorCore>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(core)),
        }
    }

    pub(crate) fn current(&self) -> Arc<ActorCore> {
        self.inner.read().clone()
    }

    pub(crate) fn swap(&self, next: Arc<ActorCore>) {
        *self.inner.write() = next;
    }

    /// The current generation's id. Changes across hot reconfiguration
    /// and respawn even though this proxy's own identity does not
    /// (spec §8 invariant 5).
    pub fn id(&self) -> ActorId {
        self.current().id()
    }

    pub fn name(&self) -> String {
        self.current().name().to_string()
    }

    pub fn mode(&self) -> ActorMode {
        self.current().mode()
    }

    pub fn state(&self) -> ActorState {
        self.current().state()
    }

    pub fn parent(&self) -> Option<ClientProxy> {
        self.current().parent()
    }

    /// The actor system's message-value marshaller registry (spec §4.3),
    /// used by every transport's frame pump to apply `body.marshalledType`
    /// on either side of a send.
    pub(crate) fn marshallers(&self) -> Arc<crate::message::MarshallerRegistry> {
        self.current().marshallers()
    }

    /// Fire-and-forget send (spec §4.4.1: `send`).
    pub async fn send(&self, topic: &str, args: Vec<Value>) -> Result<(), ActorError> {
        ActorCore::dispatch_send(self, topic, args).await
    }

    /// Request/response send (spec §4.4.1: `sendAndReceive`).
    pub async fn send_and_receive(&self, topic: &str, args: Vec<Value>) -> Result<Value, ActorError> {
        ActorCore::dispatch_send_and_receive(self, topic, args).await
    }

    /// Fan out to every cluster member (spec §4.4.1: `broadcast`).
    pub async fn broadcast(&self, topic: &str, args: Vec<Value>) -> Result<(), ActorError> {
        ActorCore::broadcast(self, topic, args).await
    }

    /// Fan out and collect one response per member (spec §4.4.1:
    /// `broadcastAndReceive`). Per OQ-2, always returns the array form,
    /// even for a non-clustered actor (a one-element array).
    pub async fn broadcast_and_receive(&self, topic: &str, args: Vec<Value>) -> Result<Vec<Value>, ActorError> {
        ActorCore::broadcast_and_receive(self, topic, args).await
    }

    pub async fn create_child(
        &self,
        name: impl Into<String>,
        behavior: Box<dyn super::behavior::Behavior>,
        config: super::config::ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        ActorCore::create_child(self, name.into(), behavior, config).await
    }

    /// `createChildren` over a set of named behaviors (spec §4.4.1).
    pub async fn create_children(
        &self,
        entries: Vec<(String, Box<dyn super::behavior::Behavior>, super::config::ActorConfig)>,
    ) -> Result<Vec<ClientProxy>, ActorError> {
        ActorCore::create_children(self, entries).await
    }

    /// A forked-process child resolved against the Actor System's
    /// [`crate::system::BehaviorRegistry`] by name (spec §4.5.2).
    pub async fn create_forked_child(
        &self,
        name: impl Into<String>,
        behavior_name: impl Into<String>,
        config: super::config::ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        ActorCore::create_forked_child(self, name.into(), behavior_name.into(), config).await
    }

    /// A remote, TCP-dialed child resolved against the peer's own
    /// `BehaviorRegistry` by name (spec §4.5.3).
    pub async fn create_remote_child(
        &self,
        name: impl Into<String>,
        behavior_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        config: super::config::ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        ActorCore::create_remote_child(self, name.into(), behavior_name.into(), host.into(), port, config).await
    }

    /// A clustered forked actor: `cluster_size` independent worker
    /// processes of the same named behavior, balanced exactly like any
    /// other clustered actor (spec §4.6, generalizing the per-TCP-endpoint
    /// construction in §4.5.3 to the forked transport).
    pub async fn create_forked_cluster(
        &self,
        name: impl Into<String>,
        behavior_name: impl Into<String>,
        cluster_size: usize,
        config: super::config::ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        ActorCore::create_forked_cluster(self, name.into(), behavior_name.into(), cluster_size, config).await
    }

    /// A clustered remote actor dialed over N TCP endpoints, balanced the
    /// same way as any other clustered actor (spec §4.5.3: "Clustering").
    pub async fn create_remote_cluster(
        &self,
        name: impl Into<String>,
        behavior_name: impl Into<String>,
        endpoints: Vec<super::config::HostEndpoint>,
        config: super::config::ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let endpoints = endpoints.into_iter().map(|e| (e.host, e.port)).collect();
        ActorCore::create_remote_cluster(self, name.into(), behavior_name.into(), endpoints, config).await
    }

    pub fn forward_to_parent(&self, pattern: super::forward::TopicPattern) {
        self.current().forward_to_parent(pattern);
    }

    pub fn forward_all_unknown_to_parent(&self) {
        self.current().forward_all_unknown_to_parent();
    }

    pub fn forward_to_child(&self, child: ActorId, patterns: Vec<super::forward::TopicPattern>) -> Result<(), ActorError> {
        self.current().forward_to_child(child, patterns)
    }

    /// Hot reconfiguration (spec §4.4.4). Returns `self` for chaining;
    /// the proxy is mutated in place, a new one is never created.
    pub async fn change_configuration(&self, new_config: super::config::ActorConfig) -> Result<(), ActorError> {
        ActorCore::change_configuration(self, new_config).await
    }

    /// Recurse `changeConfiguration` over a name-keyed subtree (spec
    /// §4.4.1: `changeGlobalConfiguration`).
    pub async fn change_global_configuration(&self, configs: &std::collections::HashMap<String, super::config::ActorConfig>) {
        ActorCore::change_global_configuration(self, configs).await;
    }

    /// Destroys the subtree then self. Idempotent (spec §8 invariant 6).
    pub async fn destroy(&self) {
        ActorCore::destroy(self).await;
    }

    pub async fn tree(&self) -> Value {
        self.current().tree().await
    }

    pub async fn metrics(&self) -> Value {
        self.current().metrics().await
    }

    /// Subscribe to this actor's own observability events (spec §7:
    /// `augmented`, `destroyed`, `message-dropped-overload`).
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<super::event::ActorEvent> {
        self.current().events()
    }

    /// A proxy wrapping a bare, unattached in-memory core with no
    /// system context, used only by unit tests that need a `ClientProxy`
    /// to pass around without standing up a whole [`crate::system::ActorSystem`].
    pub fn detached_for_test() -> Self {
        ActorCore::detached_for_test()
    }
}

impl std::fmt::Debug for ClientProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.current();
        f.debug_struct("ClientProxy")
            .field("id", &core.id())
            .field("name", &core.name())
            .field("state", &core.state())
            .finish()
    }
}
