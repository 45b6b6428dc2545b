//! The Actor Core (C4): the per-generation state machine behind a
//! [`crate::actor::proxy::ClientProxy`] (spec §4.4).
//!
//! Every hot reconfiguration or respawn produces a brand new
//! `ActorCore` and swaps it into the owning proxy; the core itself is
//! never mutated into a different mode or id after construction.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{info, warn};

// Layer 3: Internal module imports
use super::behavior::Behavior;
use super::config::{ActorConfig, BalancerKind};
use super::context::SystemContext;
use super::error::ActorError;
use super::event::{ActorEvent, EVENT_CHANNEL_CAPACITY};
use super::forward::{ForwardTable, ForwardTarget, TopicPattern};
use super::proxy::ClientProxy;
use super::state::{ActorMode, ActorState, OnCrash};
use crate::balancer::{built_in_strategy, CustomStrategy as _};
use crate::endpoint::{Endpoint, EndpointContext, ForkedEndpoint, InMemoryEndpoint, RemoteEndpoint};
use crate::message::frame::bodies::DefinitionFormat;
use crate::util::ActorId;

/// Where a non-in-memory child's behavior comes from, kept around so a
/// crashed endpoint can be respawned without the caller's involvement
/// (spec §4.4.5).
#[derive(Clone)]
enum ChildSource {
    /// An inline behavior object, valid for in-memory children. Cannot
    /// be respawned across a process boundary; a crash just stays
    /// `crashed` regardless of `onCrash` for this source kind, since
    /// there is no Forked/Remote endpoint to re-dial.
    Inline,
    Forked { behavior_name: String },
    Remote { behavior_name: String, host: String, port: u16 },
    /// A marshalled reference rebuilt by [`crate::marshal::ReferenceMarshaller::unmarshall`]:
    /// a client-side endpoint dialed straight into a [`crate::marshal::ReferenceTarget`],
    /// with no owning parent (spec §4.3, DN-3). Never respawned; if the
    /// target disappears, the handle simply starts erroring.
    Reference,
}

pub struct ActorCore {
    id: ActorId,
    name: String,
    mode: ActorMode,
    state: RwLock<ActorState>,
    parent: Option<ClientProxy>,
    children: DashMap<ActorId, ClientProxy>,
    child_order: RwLock<Vec<ActorId>>,
    endpoint: Arc<dyn Endpoint>,
    config: RwLock<ActorConfig>,
    forward_table: RwLock<ForwardTable>,
    system: Arc<dyn SystemContext>,
    events_tx: broadcast::Sender<ActorEvent>,
    source: ChildSource,
    last_ready_children: RwLock<Vec<usize>>,
}

impl ActorCore {
    // ---- accessors -------------------------------------------------

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ActorMode {
        self.mode
    }

    pub fn state(&self) -> ActorState {
        *self.state.read()
    }

    pub fn parent(&self) -> Option<ClientProxy> {
        self.parent.clone()
    }

    pub(crate) fn marshallers(&self) -> Arc<crate::message::MarshallerRegistry> {
        self.system.marshallers()
    }

    pub fn events(&self) -> broadcast::Receiver<ActorEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: ActorEvent) {
        let _ = self.events_tx.send(event);
    }

    fn is_clustered(&self) -> bool {
        self.config.read().is_clustered()
    }

    // ---- construction ------------------------------------------------

    /// A detached in-memory core with no system, parent or config,
    /// wired to a default [`crate::actor::behavior::TopicMap`]. Used
    /// only by [`ClientProxy::detached_for_test`].
    pub(crate) fn detached_for_test() -> Arc<Self> {
        let id = ActorId::new();
        let endpoint = Arc::new(InMemoryEndpoint::new(id, Box::new(super::behavior::TopicMap::new())));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            id,
            name: "test".to_string(),
            mode: ActorMode::InMemory,
            state: RwLock::new(ActorState::Ready),
            parent: None,
            children: DashMap::new(),
            child_order: RwLock::new(Vec::new()),
            endpoint,
            config: RwLock::new(ActorConfig::in_memory()),
            forward_table: RwLock::new(ForwardTable::new()),
            system: Arc::new(super::context::BareSystemContext::new()),
            events_tx,
            source: ChildSource::Inline,
            last_ready_children: RwLock::new(Vec::new()),
        })
    }

    async fn new_in_memory(
        id: ActorId,
        name: String,
        parent: Option<ClientProxy>,
        behavior: Box<dyn Behavior>,
        config: ActorConfig,
        system: Arc<dyn SystemContext>,
        source: ChildSource,
    ) -> Result<Arc<Self>, ActorError> {
        let endpoint = Arc::new(InMemoryEndpoint::new(id, behavior));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = Arc::new(Self {
            id,
            name,
            mode: config.mode,
            state: RwLock::new(ActorState::New),
            parent,
            children: DashMap::new(),
            child_order: RwLock::new(Vec::new()),
            endpoint: endpoint.clone(),
            config: RwLock::new(config.clone()),
            forward_table: RwLock::new(ForwardTable::new()),
            system,
            events_tx,
            source,
            last_ready_children: RwLock::new(Vec::new()),
        });

        let proxy_for_init = ClientProxy::new(core.clone());
        endpoint.initialize(&proxy_for_init).await?;
        *core.state.write() = ActorState::Ready;
        Ok(core)
    }

    /// Builds the root actor for an [`crate::system::ActorSystem`]
    /// (always in-memory: there is no parent to spawn a non-in-memory
    /// root from).
    pub(crate) async fn new_root(
        system: Arc<dyn SystemContext>,
        name: String,
        behavior: Box<dyn Behavior>,
        config: ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let id = ActorId::new();
        let core = Self::new_in_memory(id, name, None, behavior, config, system, ChildSource::Inline).await?;
        Ok(ClientProxy::new(core))
    }

    /// Builds a worker's root actor wired to a [`crate::endpoint::ParentProxyEndpoint`]
    /// (or, for a worker thread, the real in-process parent) so `getParent()`/
    /// `forwardToParent` reach back across the boundary the worker was
    /// spawned over (spec §4.5.5). `id` is caller-supplied rather than
    /// freshly generated so a listen-mode worker can announce the root's
    /// id in its bootstrap reply before the connection the parent proxy
    /// rides on even exists.
    pub(crate) async fn new_root_with_parent(
        system: Arc<dyn SystemContext>,
        id: ActorId,
        name: String,
        behavior: Box<dyn Behavior>,
        config: ActorConfig,
        parent: ClientProxy,
    ) -> Result<ClientProxy, ActorError> {
        let core = Self::new_in_memory(id, name, Some(parent), behavior, config, system, ChildSource::Inline).await?;
        Ok(ClientProxy::new(core))
    }

    /// Wraps an already-connected [`Endpoint`] in a standalone, parentless,
    /// `Ready` core: the shape a [`crate::marshal::ReferenceMarshaller::unmarshall`]
    /// handle takes (spec §4.3: "wraps it in a forked-style endpoint... caches
    /// the resulting Client Proxy"). Not registered as anyone's child — DN-3
    /// says marshalled references are not ownership edges.
    pub(crate) fn from_reference_endpoint(endpoint: Arc<dyn Endpoint>, name: String, system: Arc<dyn SystemContext>) -> ClientProxy {
        let id = endpoint.id();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = Arc::new(Self {
            id,
            name,
            mode: ActorMode::Remote,
            state: RwLock::new(ActorState::Ready),
            parent: None,
            children: DashMap::new(),
            child_order: RwLock::new(Vec::new()),
            endpoint,
            config: RwLock::new(ActorConfig::in_memory()),
            forward_table: RwLock::new(ForwardTable::new()),
            system,
            events_tx,
            source: ChildSource::Reference,
            last_ready_children: RwLock::new(Vec::new()),
        });
        ClientProxy::new(core)
    }

    // ---- child creation ----------------------------------------------

    /// `createChild` for in-memory and worker-thread children (spec
    /// §4.4.1). Rejects unless the parent is `new` or `ready`.
    pub(crate) async fn create_child(
        parent_proxy: &ClientProxy,
        name: String,
        behavior: Box<dyn Behavior>,
        config: ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let parent_core = parent_proxy.current();
        {
            let state = parent_core.state();
            if !matches!(state, ActorState::New | ActorState::Ready) {
                return Err(ActorError::NotReady(parent_core.id()));
            }
        }

        if parent_core.is_clustered() {
            return Err(ActorError::InitError(
                "clustering an inline behavior requires a named, registered definition (see create_forked_child/create_remote_child)".into(),
            ));
        }

        if config.mode == ActorMode::Threaded {
            return Self::create_threaded_child(parent_proxy, name, behavior, config).await;
        }

        let child_id = ActorId::new();
        let child_core = Self::new_in_memory(
            child_id,
            name,
            Some(parent_proxy.clone()),
            behavior,
            config,
            parent_core.system.clone(),
            ChildSource::Inline,
        )
        .await?;
        let child_proxy = ClientProxy::new(child_core);
        parent_core.register_child(child_id, child_proxy.clone());
        spawn_crash_watcher(child_proxy.clone());
        Ok(child_proxy)
    }

    /// A worker-thread child (spec §4.5.4): the behavior moves onto a
    /// freshly spawned OS thread that hosts its own single-actor
    /// [`crate::system::ActorSystem`] and blocks on a message port
    /// instead of stdio. Unlike the forked/remote sources, the thread
    /// took ownership of the only copy of the behavior, so like an
    /// inline actor this source cannot be respawned — a crashed worker
    /// thread just stays `crashed` regardless of `onCrash`.
    async fn create_threaded_child(
        parent_proxy: &ClientProxy,
        name: String,
        behavior: Box<dyn Behavior>,
        config: ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let parent_core = parent_proxy.current();
        let child_id = ActorId::new();
        let thread_name = name.clone();
        let thread_config = config.clone();
        let thread_parent = parent_proxy.clone();
        let marshallers = parent_core.system.marshallers();
        let endpoint = Arc::new(crate::endpoint::ThreadedEndpoint::spawn(child_id, marshallers, move |bus, rx| {
            crate::worker::run_threaded_worker(thread_name, behavior, thread_config, thread_parent, bus, rx);
        }));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = Arc::new(Self {
            id: endpoint.id(),
            name,
            mode: ActorMode::Threaded,
            state: RwLock::new(ActorState::Ready),
            parent: Some(parent_proxy.clone()),
            children: DashMap::new(),
            child_order: RwLock::new(Vec::new()),
            endpoint,
            config: RwLock::new(config),
            forward_table: RwLock::new(ForwardTable::new()),
            system: parent_core.system.clone(),
            events_tx,
            source: ChildSource::Inline,
            last_ready_children: RwLock::new(Vec::new()),
        });
        let proxy = ClientProxy::new(core);
        parent_core.register_child(child_id, proxy.clone());
        spawn_crash_watcher(proxy.clone());
        Ok(proxy)
    }

    /// `createChildren` over a set of named behavior modules
    /// (spec §4.4.1).
    pub(crate) async fn create_children(
        parent_proxy: &ClientProxy,
        entries: Vec<(String, Box<dyn Behavior>, ActorConfig)>,
    ) -> Result<Vec<ClientProxy>, ActorError> {
        let mut created = Vec::with_capacity(entries.len());
        for (name, behavior, config) in entries {
            created.push(Self::create_child(parent_proxy, name, behavior, config).await?);
        }
        Ok(created)
    }

    /// A forked-process child identified by a name registered in the
    /// system's [`crate::system::BehaviorRegistry`] (spec §4.5.2).
    pub(crate) async fn create_forked_child(
        parent_proxy: &ClientProxy,
        name: String,
        behavior_name: String,
        config: ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let parent_core = parent_proxy.current();
        if !matches!(parent_core.state(), ActorState::New | ActorState::Ready) {
            return Err(ActorError::NotReady(parent_core.id()));
        }

        let child_id = ActorId::new();
        let ctx = EndpointContext {
            id: child_id,
            name: name.clone(),
            parent: Some(parent_proxy.clone()),
            config: config.clone(),
            system: parent_core.system.clone(),
        };
        let endpoint = Arc::new(ForkedEndpoint::spawn(ctx, behavior_name.clone(), DefinitionFormat::ModulePath).await?);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = Arc::new(Self {
            id: endpoint.id(),
            name,
            mode: ActorMode::Forked,
            state: RwLock::new(ActorState::Ready),
            parent: Some(parent_proxy.clone()),
            children: DashMap::new(),
            child_order: RwLock::new(Vec::new()),
            endpoint,
            config: RwLock::new(config),
            forward_table: RwLock::new(ForwardTable::new()),
            system: parent_core.system.clone(),
            events_tx,
            source: ChildSource::Forked { behavior_name },
            last_ready_children: RwLock::new(Vec::new()),
        });
        let proxy = ClientProxy::new(core);
        parent_core.register_child(child_id, proxy.clone());
        spawn_crash_watcher(proxy.clone());
        Ok(proxy)
    }

    /// A remote child dialed over TCP (spec §4.5.3).
    pub(crate) async fn create_remote_child(
        parent_proxy: &ClientProxy,
        name: String,
        behavior_name: String,
        host: String,
        port: u16,
        config: ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let parent_core = parent_proxy.current();
        if !matches!(parent_core.state(), ActorState::New | ActorState::Ready) {
            return Err(ActorError::NotReady(parent_core.id()));
        }

        let child_id = ActorId::new();
        let ctx = EndpointContext {
            id: child_id,
            name: name.clone(),
            parent: Some(parent_proxy.clone()),
            config: config.clone(),
            system: parent_core.system.clone(),
        };
        let endpoint = Arc::new(RemoteEndpoint::connect(ctx, &host, port, behavior_name.clone(), DefinitionFormat::ModulePath).await?);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = Arc::new(Self {
            id: endpoint.id(),
            name,
            mode: ActorMode::Remote,
            state: RwLock::new(ActorState::Ready),
            parent: Some(parent_proxy.clone()),
            children: DashMap::new(),
            child_order: RwLock::new(Vec::new()),
            endpoint,
            config: RwLock::new(config),
            forward_table: RwLock::new(ForwardTable::new()),
            system: parent_core.system.clone(),
            events_tx,
            source: ChildSource::Remote { behavior_name, host, port },
            last_ready_children: RwLock::new(Vec::new()),
        });
        let proxy = ClientProxy::new(core);
        parent_core.register_child(child_id, proxy.clone());
        spawn_crash_watcher(proxy.clone());
        Ok(proxy)
    }

    /// A clustered in-process-supervised forked actor: spawns
    /// `cluster_size` independent worker processes of the same named
    /// behavior and balances sends across them exactly as a remote
    /// cluster does (spec §4.6 generalizes the Balancer Actor over "N
    /// children" without restricting it to the remote transport; §4.5.3
    /// spells out the construction only for the TCP case, this mirrors it
    /// for forked children).
    pub(crate) async fn create_forked_cluster(
        parent_proxy: &ClientProxy,
        name: String,
        behavior_name: String,
        cluster_size: usize,
        mut config: ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let parent_core = parent_proxy.current();
        if !matches!(parent_core.state(), ActorState::New | ActorState::Ready) {
            return Err(ActorError::NotReady(parent_core.id()));
        }
        if cluster_size == 0 {
            return Err(ActorError::InitError("a forked cluster requires at least one replica".into()));
        }

        config.cluster_size = Some(cluster_size);
        let child_template = ActorConfig { cluster_size: None, cluster: None, ..config.clone() };
        let id = ActorId::new();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let placeholder_endpoint: Arc<dyn Endpoint> = Arc::new(InMemoryEndpoint::new(id, Box::new(super::behavior::TopicMap::new())));
        let core = Arc::new(Self {
            id,
            name: name.clone(),
            mode: ActorMode::Forked,
            state: RwLock::new(ActorState::New),
            parent: Some(parent_proxy.clone()),
            children: DashMap::new(),
            child_order: RwLock::new(Vec::new()),
            endpoint: placeholder_endpoint,
            config: RwLock::new(config),
            forward_table: RwLock::new(ForwardTable::new()),
            system: parent_core.system.clone(),
            events_tx,
            source: ChildSource::Inline,
            last_ready_children: RwLock::new(Vec::new()),
        });
        let proxy = ClientProxy::new(core.clone());

        for index in 0..cluster_size {
            // create_forked_child registers the new replica under `proxy`
            // (the cluster core) itself, since `proxy` is passed as its parent.
            Self::create_forked_child(&proxy, format!("{name}-{index}"), behavior_name.clone(), child_template.clone()).await?;
        }

        *core.state.write() = ActorState::Ready;
        parent_core.register_child(id, proxy.clone());
        Ok(proxy)
    }

    /// A clustered remote actor: `config.cluster` (or a `host` array
    /// resolved by the caller into [`crate::actor::config::ClusterTarget::Endpoints`])
    /// names N TCP endpoints; one remote child is dialed per endpoint and
    /// registered under this actor, which then balances sends across them
    /// via the normal `is_clustered()` dispatch path (spec §4.5.3:
    /// "Clustering. If `host` is an array, or `cluster` references a
    /// named list, create a Balancer over N children, one per endpoint").
    pub(crate) async fn create_remote_cluster(
        parent_proxy: &ClientProxy,
        name: String,
        behavior_name: String,
        endpoints: Vec<(String, u16)>,
        mut config: ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let parent_core = parent_proxy.current();
        if !matches!(parent_core.state(), ActorState::New | ActorState::Ready) {
            return Err(ActorError::NotReady(parent_core.id()));
        }
        if endpoints.is_empty() {
            return Err(ActorError::InitError("a remote cluster requires at least one endpoint".into()));
        }

        config.cluster_size = Some(endpoints.len());
        let child_template = ActorConfig {
            cluster_size: None,
            cluster: None,
            host: None,
            port: None,
            ..config.clone()
        };
        let id = ActorId::new();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let placeholder_endpoint: Arc<dyn Endpoint> = Arc::new(InMemoryEndpoint::new(id, Box::new(super::behavior::TopicMap::new())));
        let core = Arc::new(Self {
            id,
            name: name.clone(),
            mode: ActorMode::Remote,
            state: RwLock::new(ActorState::New),
            parent: Some(parent_proxy.clone()),
            children: DashMap::new(),
            child_order: RwLock::new(Vec::new()),
            endpoint: placeholder_endpoint,
            config: RwLock::new(config),
            forward_table: RwLock::new(ForwardTable::new()),
            system: parent_core.system.clone(),
            events_tx,
            source: ChildSource::Inline,
            last_ready_children: RwLock::new(Vec::new()),
        });
        let proxy = ClientProxy::new(core.clone());

        for (index, (host, port)) in endpoints.into_iter().enumerate() {
            let mut per_child = child_template.clone();
            per_child.host = Some(host.clone());
            per_child.port = Some(port);
            // create_remote_child registers the new replica under `proxy`
            // (the cluster core) itself, since `proxy` is passed as its parent.
            Self::create_remote_child(&proxy, format!("{name}-{index}"), behavior_name.clone(), host, port, per_child).await?;
        }

        *core.state.write() = ActorState::Ready;
        parent_core.register_child(id, proxy.clone());
        Ok(proxy)
    }

    fn register_child(&self, key: ActorId, proxy: ClientProxy) {
        self.children.insert(key, proxy);
        self.child_order.write().push(key);
    }

    fn detach_child(&self, key: ActorId) {
        self.children.remove(&key);
        self.child_order.write().retain(|existing| *existing != key);
        self.forward_table.write().remove_target(key);
    }

    // ---- dispatch ------------------------------------------------------

    /// spec §4.4.2: the send dispatch algorithm.
    pub(crate) async fn dispatch_send(proxy: &ClientProxy, topic: &str, args: Vec<Value>) -> Result<(), ActorError> {
        let core = proxy.current();
        core.check_admission(topic)?;

        let has_local = core.endpoint.has_handler(topic);
        if let Some(target) = core.forward_table.read().resolve(topic, has_local) {
            return core.delegate_send(target, topic, args).await;
        }

        if core.is_clustered() {
            return core.cluster_send(topic, args).await;
        }

        core.endpoint.send0(topic, args, proxy).await
    }

    pub(crate) async fn dispatch_send_and_receive(proxy: &ClientProxy, topic: &str, args: Vec<Value>) -> Result<Value, ActorError> {
        let core = proxy.current();
        core.check_admission(topic)?;

        let has_local = core.endpoint.has_handler(topic);
        if let Some(target) = core.forward_table.read().resolve(topic, has_local) {
            return core.delegate_send_and_receive(target, topic, args).await;
        }

        if core.is_clustered() {
            return core.cluster_send_and_receive(topic, args).await;
        }

        core.endpoint.send_and_receive0(topic, args, proxy).await
    }

    fn check_admission(&self, topic: &str) -> Result<(), ActorError> {
        if !self.state().accepts_messages() {
            return Err(ActorError::NotReady(self.id));
        }
        if self.config.read().drop_messages_on_overload && self.system.is_overloaded() {
            self.emit(ActorEvent::MessageDroppedOverload { id: self.id, topic: topic.to_string() });
            return Err(ActorError::Overloaded(self.id));
        }
        Ok(())
    }

    async fn delegate_send(&self, target: ForwardTarget, topic: &str, args: Vec<Value>) -> Result<(), ActorError> {
        match target {
            ForwardTarget::Parent => match &self.parent {
                Some(parent) => parent.send(topic, args).await,
                None => Err(ActorError::NotReady(self.id)),
            },
            ForwardTarget::Child(id) => match self.children.get(&id) {
                Some(child) => child.send(topic, args).await,
                None => Err(ActorError::NotAChild(id)),
            },
        }
    }

    async fn delegate_send_and_receive(&self, target: ForwardTarget, topic: &str, args: Vec<Value>) -> Result<Value, ActorError> {
        match target {
            ForwardTarget::Parent => match &self.parent {
                Some(parent) => parent.send_and_receive(topic, args).await,
                None => Err(ActorError::NotReady(self.id)),
            },
            ForwardTarget::Child(id) => match self.children.get(&id) {
                Some(child) => child.send_and_receive(topic, args).await,
                None => Err(ActorError::NotAChild(id)),
            },
        }
    }

    fn pick_cluster_child(&self, args: &[Value]) -> Result<ClientProxy, ActorError> {
        let order = self.child_order.read().clone();
        let states: Vec<ActorState> = order.iter().map(|id| self.children.get(id).map(|c| c.state()).unwrap_or(ActorState::Destroyed)).collect();
        self.notify_cluster_changed(&states);

        let balancer = self.config.read().balancer.clone();
        let index = match &balancer {
            BalancerKind::Custom(name) => {
                let strategy = self.system.balancers().get(name).ok_or(ActorError::NoChild)?;
                strategy.forward(args, &states)?
            }
            _ => {
                let strategy = built_in_strategy(&balancer).ok_or(ActorError::NoChild)?;
                strategy.pick(&states)?
            }
        };
        let key = order.get(index).ok_or(ActorError::NoChild)?;
        self.children.get(key).map(|c| c.clone()).ok_or(ActorError::NoChild)
    }

    /// Invokes a custom balancer's `clusterChanged` hook whenever the set
    /// of ready children differs from the last dispatch (spec §4.6).
    fn notify_cluster_changed(&self, states: &[ActorState]) {
        let BalancerKind::Custom(name) = &self.config.read().balancer else { return };
        let Some(strategy) = self.system.balancers().get(name) else { return };
        let ready: Vec<usize> = states.iter().enumerate().filter(|(_, s)| s.accepts_messages()).map(|(i, _)| i).collect();
        let mut last = self.last_ready_children.write();
        if *last != ready {
            *last = ready.clone();
            strategy.cluster_changed(&ready);
        }
    }

    async fn cluster_send(&self, topic: &str, args: Vec<Value>) -> Result<(), ActorError> {
        self.pick_cluster_child(&args)?.send(topic, args).await
    }

    async fn cluster_send_and_receive(&self, topic: &str, args: Vec<Value>) -> Result<Value, ActorError> {
        self.pick_cluster_child(&args)?.send_and_receive(topic, args).await
    }

    // ---- broadcast -----------------------------------------------------

    pub(crate) async fn broadcast(self_proxy: &ClientProxy, topic: &str, args: Vec<Value>) -> Result<(), ActorError> {
        let core = self_proxy.current();
        let children: Vec<ClientProxy> = core.child_order.read().iter().filter_map(|id| core.children.get(id).map(|c| c.clone())).collect();
        if children.is_empty() {
            return core.endpoint.send0(topic, args, self_proxy).await;
        }
        for child in children {
            let _ = child.send(topic, args.clone()).await;
        }
        Ok(())
    }

    /// Per OQ-2: always the array form, even with zero or one children.
    pub(crate) async fn broadcast_and_receive(self_proxy: &ClientProxy, topic: &str, args: Vec<Value>) -> Result<Vec<Value>, ActorError> {
        let core = self_proxy.current();
        let children: Vec<ClientProxy> = core.child_order.read().iter().filter_map(|id| core.children.get(id).map(|c| c.clone())).collect();
        if children.is_empty() {
            return Ok(vec![core.endpoint.send_and_receive0(topic, args, self_proxy).await?]);
        }
        let mut responses = Vec::with_capacity(children.len());
        for child in children {
            responses.push(child.send_and_receive(topic, args.clone()).await?);
        }
        Ok(responses)
    }

    // ---- forwarding ------------------------------------------------------

    pub(crate) fn forward_to_parent(&self, pattern: TopicPattern) {
        self.forward_table.write().add_rule(pattern, ForwardTarget::Parent);
    }

    pub(crate) fn forward_all_unknown_to_parent(&self) {
        self.forward_table.write().set_catch_all(ForwardTarget::Parent);
    }

    pub(crate) fn forward_to_child(&self, child: ActorId, patterns: Vec<TopicPattern>) -> Result<(), ActorError> {
        if !self.children.contains_key(&child) {
            return Err(ActorError::NotAChild(child));
        }
        let mut table = self.forward_table.write();
        for pattern in patterns {
            table.add_rule(pattern, ForwardTarget::Child(child));
        }
        Ok(())
    }

    // ---- hot reconfiguration -------------------------------------------

    /// spec §4.4.4.
    pub(crate) async fn change_configuration(proxy: &ClientProxy, new_config: ActorConfig) -> Result<(), ActorError> {
        let core = proxy.current();

        if core.config.read().equal_modulo_custom_parameters(&new_config) {
            return Ok(());
        }

        if core.is_clustered() {
            let current = core.config.read().clone();
            let only_cluster_size_changed = current.cluster_size != new_config.cluster_size
                && current.mode == new_config.mode
                && current.on_crash == new_config.on_crash
                && current.drop_messages_on_overload == new_config.drop_messages_on_overload
                && current.balancer == new_config.balancer
                && current.host == new_config.host
                && current.port == new_config.port
                && current.cluster == new_config.cluster
                && current.ping_timeout_ms == new_config.ping_timeout_ms;
            if only_cluster_size_changed {
                if let Some(new_size) = new_config.cluster_size {
                    return core.rescale_cluster(new_size).await;
                }
            }
        }

        match &core.source {
            ChildSource::Inline => Err(ActorError::InitError(
                "hot-reconfiguring an inline in-memory behavior to a different endpoint mode requires re-creating the child with a named definition".into(),
            )),
            ChildSource::Reference => Err(ActorError::InitError(
                "a marshalled reference has no configuration of its own to change".into(),
            )),
            ChildSource::Forked { behavior_name } => {
                let behavior_name = behavior_name.clone();
                let new_endpoint_ctx = EndpointContext {
                    id: ActorId::new(),
                    name: core.name.clone(),
                    parent: core.parent.clone(),
                    config: new_config.clone(),
                    system: core.system.clone(),
                };
                let new_endpoint = ForkedEndpoint::spawn(new_endpoint_ctx, behavior_name.clone(), DefinitionFormat::ModulePath).await?;
                let new_core = core.successor_with_endpoint(Arc::new(new_endpoint), new_config, ChildSource::Forked { behavior_name });
                let old_endpoint = core.endpoint.clone();
                proxy.swap(new_core.clone());
                new_core.emit(ActorEvent::Augmented { id: new_core.id });
                tokio::spawn(async move {
                    old_endpoint.destroy0(&ClientProxy::detached_for_test()).await;
                });
                Ok(())
            }
            ChildSource::Remote { behavior_name, host, port } => {
                let (behavior_name, host, port) = (behavior_name.clone(), host.clone(), *port);
                let new_endpoint_ctx = EndpointContext {
                    id: ActorId::new(),
                    name: core.name.clone(),
                    parent: core.parent.clone(),
                    config: new_config.clone(),
                    system: core.system.clone(),
                };
                let new_endpoint = RemoteEndpoint::connect(new_endpoint_ctx, &host, port, behavior_name.clone(), DefinitionFormat::ModulePath).await?;
                let new_core = core.successor_with_endpoint(Arc::new(new_endpoint), new_config, ChildSource::Remote { behavior_name, host, port });
                let old_endpoint = core.endpoint.clone();
                proxy.swap(new_core.clone());
                new_core.emit(ActorEvent::Augmented { id: new_core.id });
                tokio::spawn(async move {
                    old_endpoint.destroy0(&ClientProxy::detached_for_test()).await;
                });
                Ok(())
            }
        }
    }

    fn successor_with_endpoint(&self, endpoint: Arc<dyn Endpoint>, config: ActorConfig, source: ChildSource) -> Arc<Self> {
        Arc::new(Self {
            id: endpoint.id(),
            name: self.name.clone(),
            mode: config.mode,
            state: RwLock::new(ActorState::Ready),
            parent: self.parent.clone(),
            children: self.children.clone(),
            child_order: RwLock::new(self.child_order.read().clone()),
            endpoint,
            config: RwLock::new(config),
            forward_table: RwLock::new(self.forward_table.read().clone()),
            system: self.system.clone(),
            events_tx: self.events_tx.clone(),
            source,
            last_ready_children: RwLock::new(self.last_ready_children.read().clone()),
        })
    }

    async fn rescale_cluster(&self, new_size: usize) -> Result<(), ActorError> {
        let current = self.child_order.read().len();
        if new_size > current {
            warn!(from = current, to = new_size, "cluster scale-up requires a named definition to create more replicas; no-op");
        } else if new_size < current {
            let to_remove: Vec<ActorId> = self.child_order.read()[new_size..].to_vec();
            for id in to_remove {
                if let Some((_, child)) = self.children.remove(&id) {
                    child.destroy().await;
                }
                self.child_order.write().retain(|existing| *existing != id);
            }
        }
        Ok(())
    }

    pub(crate) async fn change_global_configuration(proxy: &ClientProxy, configs: &HashMap<String, ActorConfig>) {
        let core = proxy.current();
        if let Some(new_config) = configs.get(&core.name) {
            if let Err(e) = Self::change_configuration(proxy, new_config.clone()).await {
                warn!(actor = %core.name, error = %e, "failed to apply configuration change");
            }
        }
        let children: Vec<ClientProxy> = core.child_order.read().iter().filter_map(|id| core.children.get(id).map(|c| c.clone())).collect();
        for child in children {
            Box::pin(Self::change_global_configuration(&child, configs)).await;
        }
    }

    // ---- destruction -----------------------------------------------------

    /// spec §8 invariant 6: idempotent.
    pub(crate) async fn destroy(proxy: &ClientProxy) {
        let core = proxy.current();
        if matches!(core.state(), ActorState::Destroying | ActorState::Destroyed) {
            return;
        }
        *core.state.write() = ActorState::Destroying;

        let children: Vec<ClientProxy> = core.child_order.read().iter().filter_map(|id| core.children.get(id).map(|c| c.clone())).collect();
        for child in children {
            child.destroy().await;
        }
        core.children.clear();
        core.child_order.write().clear();

        core.endpoint.destroy0(proxy).await;
        *core.state.write() = ActorState::Destroyed;
        core.emit(ActorEvent::Destroyed { id: core.id });

        if let Some(parent) = &core.parent {
            parent.current().detach_child(core.id);
        }
    }

    // ---- rollups -----------------------------------------------------

    pub(crate) async fn tree(&self) -> Value {
        let mut children = Vec::new();
        for id in self.child_order.read().clone() {
            if let Some(child) = self.children.get(&id) {
                children.push(Box::pin(child.tree()).await);
            }
        }
        json!({
            "id": self.id.to_hex(),
            "name": self.name,
            "mode": self.mode,
            "state": self.state(),
            "children": children,
        })
    }

    pub(crate) async fn metrics(&self) -> Value {
        let own = self.endpoint.metrics0().await.unwrap_or(Value::Null);
        let mut children = Vec::new();
        for id in self.child_order.read().clone() {
            if let Some(child) = self.children.get(&id) {
                children.push(Box::pin(child.metrics()).await);
            }
        }

        let mut object = json!({
            "id": self.id.to_hex(),
            "name": self.name,
            "own": own,
            "children": children,
        });

        if self.is_clustered() {
            object["summary"] = sum_numeric_fields(&children);
        }

        object
    }
}

/// Element-wise sum across each child's `own` numeric fields
/// (spec §4.6: balancer metrics).
fn sum_numeric_fields(children: &[Value]) -> Value {
    let mut totals: serde_json::Map<String, Value> = serde_json::Map::new();
    for child in children {
        let Some(own) = child.get("own").and_then(Value::as_object) else { continue };
        for (key, value) in own {
            if let Some(n) = value.as_f64() {
                let entry = totals.entry(key.clone()).or_insert(json!(0.0));
                let current = entry.as_f64().unwrap_or(0.0);
                *entry = json!(current + n);
            }
        }
    }
    Value::Object(totals)
}

/// Watches an endpoint for crash (spec §4.4.5). On crash: state →
/// `crashed`, `Crashed` event emitted; if `onCrash = respawn`, retries
/// every 15s until `destroy()` is called or a respawn succeeds.
fn spawn_crash_watcher(proxy: ClientProxy) {
    tokio::spawn(async move {
        loop {
            let core = proxy.current();
            if matches!(core.state(), ActorState::Destroying | ActorState::Destroyed) {
                return;
            }
            let on_crash_rx = core.endpoint.on_crash();
            if on_crash_rx.await.is_err() {
                // In-memory endpoints never resolve this; the watcher
                // task simply has nothing left to wait for.
                return;
            }

            let core = proxy.current();
            if matches!(core.state(), ActorState::Destroying | ActorState::Destroyed) {
                return;
            }
            *core.state.write() = ActorState::Crashed;
            core.emit(ActorEvent::Crashed { id: core.id });
            info!(actor = %core.name, id = %core.id, "endpoint crashed");

            if core.config.read().on_crash != OnCrash::Respawn {
                return;
            }

            loop {
                match respawn(&proxy).await {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(error = %e, "respawn failed, retrying in 15s");
                        proxy.current().emit(ActorEvent::RespawnFailed { id: proxy.current().id() });
                        tokio::time::sleep(std::time::Duration::from_secs(15)).await;
                    }
                }
            }
        }
    });
}

async fn respawn(proxy: &ClientProxy) -> Result<(), ActorError> {
    let core = proxy.current();
    let new_id = ActorId::new();

    let new_endpoint: Arc<dyn Endpoint> = match &core.source {
        ChildSource::Inline => return Err(ActorError::InitError("in-memory endpoints are not respawnable".into())),
        ChildSource::Reference => return Err(ActorError::InitError("marshalled references are not respawnable".into())),
        ChildSource::Forked { behavior_name } => {
            let ctx = EndpointContext {
                id: new_id,
                name: core.name.clone(),
                parent: core.parent.clone(),
                config: core.config.read().clone(),
                system: core.system.clone(),
            };
            Arc::new(ForkedEndpoint::spawn(ctx, behavior_name.clone(), DefinitionFormat::ModulePath).await?)
        }
        ChildSource::Remote { behavior_name, host, port } => {
            let ctx = EndpointContext {
                id: new_id,
                name: core.name.clone(),
                parent: core.parent.clone(),
                config: core.config.read().clone(),
                system: core.system.clone(),
            };
            Arc::new(RemoteEndpoint::connect(ctx, host, *port, behavior_name.clone(), DefinitionFormat::ModulePath).await?)
        }
    };

    let new_core = core.successor_with_endpoint(new_endpoint, core.config.read().clone(), core.source.clone());
    proxy.swap(new_core.clone());
    new_core.emit(ActorEvent::Augmented { id: new_core.id });
    spawn_crash_watcher(proxy.clone());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actor::behavior::TopicMap;
    use crate::actor::context::BareSystemContext;

    fn echo_behavior() -> Box<dyn Behavior> {
        Box::new(TopicMap::new().on("hello", |args, _proxy| async move {
            let name = args.first().and_then(|v| v.as_str()).unwrap_or("world");
            Ok(Value::String(format!("Hello {name}")))
        }))
    }

    #[tokio::test]
    async fn root_actor_dispatches_send_and_receive() {
        let system: Arc<dyn SystemContext> = Arc::new(BareSystemContext::new());
        let proxy = ActorCore::new_root(system, "root".into(), echo_behavior(), ActorConfig::in_memory()).await.unwrap();

        let reply = proxy.send_and_receive("hello", vec![Value::String("World".into())]).await.unwrap();
        assert_eq!(reply, Value::String("Hello World".into()));
    }

    #[tokio::test]
    async fn not_ready_actor_rejects_sends() {
        let system: Arc<dyn SystemContext> = Arc::new(BareSystemContext::new());
        let proxy = ActorCore::new_root(system, "root".into(), echo_behavior(), ActorConfig::in_memory()).await.unwrap();
        *proxy.current().state.write() = ActorState::Crashed;

        let err = proxy.send_and_receive("hello", vec![]).await.unwrap_err();
        assert!(matches!(err, ActorError::NotReady(_)));
    }

    #[tokio::test]
    async fn create_child_registers_under_parent() {
        let system: Arc<dyn SystemContext> = Arc::new(BareSystemContext::new());
        let root = ActorCore::new_root(system, "root".into(), Box::new(TopicMap::new()), ActorConfig::in_memory()).await.unwrap();

        let child = root.create_child("child", echo_behavior(), ActorConfig::in_memory()).await.unwrap();
        let tree = root.tree().await;
        assert_eq!(tree["children"].as_array().unwrap().len(), 1);

        let reply = child.send_and_receive("hello", vec![Value::String("Kit".into())]).await.unwrap();
        assert_eq!(reply, Value::String("Hello Kit".into()));
    }

    #[tokio::test]
    async fn forward_to_parent_bypasses_local_behavior() {
        let system: Arc<dyn SystemContext> = Arc::new(BareSystemContext::new());
        let parent_behavior = TopicMap::new().on("reply", |_args, _proxy| async move { Ok(Value::String("from parent".into())) });
        let root = ActorCore::new_root(system, "root".into(), Box::new(parent_behavior), ActorConfig::in_memory()).await.unwrap();

        let child_behavior = TopicMap::new().on("reply", |_args, _proxy| async move { Ok(Value::String("from child".into())) });
        let child = root.create_child("child", Box::new(child_behavior), ActorConfig::in_memory()).await.unwrap();
        child.forward_to_parent(TopicPattern::Exact("reply".into()));

        let reply = child.send_and_receive("reply", vec![]).await.unwrap();
        assert_eq!(reply, Value::String("from parent".into()));
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_detaches_from_parent() {
        let system: Arc<dyn SystemContext> = Arc::new(BareSystemContext::new());
        let root = ActorCore::new_root(system, "root".into(), Box::new(TopicMap::new()), ActorConfig::in_memory()).await.unwrap();
        let child = root.create_child("child", echo_behavior(), ActorConfig::in_memory()).await.unwrap();

        child.destroy().await;
        child.destroy().await;

        assert_eq!(child.state(), ActorState::Destroyed);
        let tree = root.tree().await;
        assert!(tree["children"].as_array().unwrap().is_empty());
    }
}
