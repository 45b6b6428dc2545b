//! The Actor System (C7): factory and registry owner (spec §4.7).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tokio::net::TcpListener;
use tracing::{error, info};

// Layer 3: Internal module imports
use super::admission::{AdmissionGate, DEFAULT_BUSY_LAG_LIMIT_MS};
use super::balancer_registry::BalancerRegistry;
use super::behavior_registry::BehaviorRegistry;
use super::resource::ResourceRegistry;
use crate::actor::behavior::Behavior;
use crate::actor::config::ActorConfig;
use crate::actor::context::SystemContext;
use crate::actor::core::ActorCore;
use crate::actor::error::ActorError;
use crate::actor::proxy::ClientProxy;
use crate::bus::SystemBus;
use crate::marshal::ReferenceMarshaller;
use crate::message::MarshallerRegistry;

/// Builder for [`ActorSystem`] (teacher idiom: explicit builder over a
/// struct-literal constructor for multi-field setup).
#[derive(Default)]
pub struct ActorSystemBuilder {
    busy_lag_limit_ms: Option<i64>,
    marshallers: Option<Arc<MarshallerRegistry>>,
}

impl ActorSystemBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy_lag_limit_ms(mut self, limit: i64) -> Self {
        self.busy_lag_limit_ms = Some(limit);
        self
    }

    /// Supplies the `typeName -> marshaller` map this system starts with
    /// (spec §4.3). A worker entry point uses this to install the same
    /// statically-registered marshallers its embedding binary registers
    /// behaviors under, so a value marshalled on one side of a transport
    /// boundary can be unmarshalled on the other.
    pub fn marshallers(mut self, marshallers: Arc<MarshallerRegistry>) -> Self {
        self.marshallers = Some(marshallers);
        self
    }

    pub fn build(self) -> Arc<ActorSystem> {
        Arc::new(ActorSystem {
            admission: AdmissionGate::new(self.busy_lag_limit_ms.unwrap_or(DEFAULT_BUSY_LAG_LIMIT_MS)),
            marshallers: self.marshallers.unwrap_or_else(|| Arc::new(MarshallerRegistry::new())),
            behaviors: Arc::new(BehaviorRegistry::new()),
            balancers: Arc::new(BalancerRegistry::new()),
            resources: Arc::new(ResourceRegistry::new()),
            inter_process: Arc::new(ReferenceMarshaller::new()),
            inter_host: Arc::new(ReferenceMarshaller::new()),
            bus: Arc::new(SystemBus::new()),
            root: tokio::sync::OnceCell::new(),
        })
    }
}

/// Owns the root actor, the marshaller/balancer/resource registries,
/// the reference marshallers, and the system bus (spec §4.7). Actors
/// reach it only through the narrow [`SystemContext`] trait.
pub struct ActorSystem {
    admission: Arc<AdmissionGate>,
    marshallers: Arc<MarshallerRegistry>,
    behaviors: Arc<BehaviorRegistry>,
    balancers: Arc<BalancerRegistry>,
    resources: Arc<ResourceRegistry>,
    inter_process: Arc<ReferenceMarshaller>,
    inter_host: Arc<ReferenceMarshaller>,
    bus: Arc<SystemBus>,
    root: tokio::sync::OnceCell<ClientProxy>,
}

impl ActorSystem {
    pub fn builder() -> ActorSystemBuilder {
        ActorSystemBuilder::new()
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.behaviors
    }

    pub fn balancers(&self) -> &BalancerRegistry {
        &self.balancers
    }

    pub fn inter_process_marshaller(&self) -> &ReferenceMarshaller {
        &self.inter_process
    }

    pub fn inter_host_marshaller(&self) -> &ReferenceMarshaller {
        &self.inter_host
    }

    /// Constructs and initializes the root actor. May only be called
    /// once; the marshaller/balancer/resource maps are read-only after
    /// it resolves (spec §5).
    pub async fn root_actor(
        self: &Arc<Self>,
        behavior: Box<dyn Behavior>,
        config: ActorConfig,
    ) -> Result<ClientProxy, ActorError> {
        let proxy = ActorCore::new_root(self.clone(), "root".to_string(), behavior, config).await?;
        self.root
            .set(proxy.clone())
            .map_err(|_| ActorError::InitError("root actor already created".into()))?;
        Ok(proxy)
    }

    /// As [`Self::root_actor`], but wires `parent` in as the root's
    /// parent handle (spec §4.5.5). Used by the worker entry points so a
    /// forked/remote/threaded worker's root can reach back across the
    /// boundary it was spawned over.
    pub async fn root_actor_with_parent(
        self: &Arc<Self>,
        id: crate::util::ActorId,
        behavior: Box<dyn Behavior>,
        config: ActorConfig,
        parent: ClientProxy,
    ) -> Result<ClientProxy, ActorError> {
        let proxy = ActorCore::new_root_with_parent(self.clone(), id, "root".to_string(), behavior, config, parent).await?;
        self.root
            .set(proxy.clone())
            .map_err(|_| ActorError::InitError("root actor already created".into()))?;
        Ok(proxy)
    }

    pub fn root(&self) -> Option<ClientProxy> {
        self.root.get().cloned()
    }

    /// Accepts inbound `create-actor` frames on `host:port`, spawning a
    /// worker process per request and replying `{id, port}` once ready
    /// (spec §4.7: "Listening mode", §6.3).
    pub async fn listen(self: &Arc<Self>, host: &str, port: u16) -> Result<u16, ActorError> {
        let listener = TcpListener::bind((host, port)).await.map_err(ActorError::ProcessError)?;
        let bound_port = listener.local_addr().map_err(ActorError::ProcessError)?.port();
        let system = self.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        info!(%addr, "accepted inbound create-actor connection");
                        let system = system.clone();
                        tokio::spawn(async move {
                            if let Err(e) = super::listener::handle_bootstrap_connection(stream, system).await {
                                error!(error = %e, "failed to service create-actor connection");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "listener accept failed, stopping");
                        break;
                    }
                }
            }
        });

        Ok(bound_port)
    }

    /// Loads `actors.json` (optionally overlaid) and pushes a
    /// `changeGlobalConfiguration` over the root's subtree whenever
    /// either file changes (spec §4.7, §4.12).
    pub async fn watch_configuration_file(
        self: &Arc<Self>,
        primary: std::path::PathBuf,
        secondary: Option<std::path::PathBuf>,
    ) -> Result<(), notify::Error> {
        let initial = super::config_file::load_overlaid(&primary, secondary.as_deref());
        if let Some(root) = self.root() {
            root.change_global_configuration(&initial).await;
        }

        let mut watcher = super::config_file::ConfigWatcher::watch(primary, secondary)?;
        let system = self.clone();
        tokio::spawn(async move {
            while let Some(configs) = watcher.changes.recv().await {
                if let Some(root) = system.root() {
                    root.change_global_configuration(&configs).await;
                }
            }
        });
        Ok(())
    }
}

impl SystemContext for ActorSystem {
    fn is_overloaded(&self) -> bool {
        self.admission.is_overloaded()
    }

    fn marshallers(&self) -> Arc<MarshallerRegistry> {
        self.marshallers.clone()
    }

    fn system_bus(&self) -> Arc<SystemBus> {
        self.bus.clone()
    }

    fn behaviors(&self) -> Arc<BehaviorRegistry> {
        self.behaviors.clone()
    }

    fn balancers(&self) -> Arc<BalancerRegistry> {
        self.balancers.clone()
    }
}
