//! The narrow surface an [`crate::actor::core::ActorCore`] needs from its
//! owning Actor System, expressed as a trait so `actor` does not depend
//! on the concrete `system` module (spec §4.7 owns these; §5 says the
//! admission gate and marshaller map are read-only after start-up).

use std::sync::Arc;

use crate::bus::SystemBus;
use crate::message::MarshallerRegistry;
use crate::system::{BalancerRegistry, BehaviorRegistry};

/// Dependencies an actor needs from its system, injected at creation
/// time (teacher idiom: dependency injection instead of a process-wide
/// singleton, spec DN-6).
pub trait SystemContext: Send + Sync {
    /// spec §4.7: `isOverloaded()` — event-loop lag exceeds `busyLagLimit`.
    fn is_overloaded(&self) -> bool;

    /// The `typeName -> marshaller` map (spec §4.3).
    fn marshallers(&self) -> Arc<MarshallerRegistry>;

    /// The process-wide, loop-free event bus (spec §4.9, C8).
    fn system_bus(&self) -> Arc<SystemBus>;

    /// The `name -> behavior factory` map a forked/remote worker
    /// resolves `definitionFormat: modulePath` definitions against
    /// (spec §4.8).
    fn behaviors(&self) -> Arc<BehaviorRegistry>;

    /// The `name -> custom balancer strategy` map a clustered actor
    /// configured with `BalancerKind::Custom` resolves against
    /// (spec §4.6, §4.7).
    fn balancers(&self) -> Arc<BalancerRegistry>;
}

/// A [`SystemContext`] with no admission control and no registered
/// marshallers, useful for unit tests and for actors created outside a
/// full [`crate::system::ActorSystem`].
#[derive(Default)]
pub struct BareSystemContext {
    marshallers: Arc<MarshallerRegistry>,
    bus: Arc<SystemBus>,
    behaviors: Arc<BehaviorRegistry>,
    balancers: Arc<BalancerRegistry>,
}

impl BareSystemContext {
    pub fn new() -> Self {
        Self {
            marshallers: Arc::new(MarshallerRegistry::new()),
            bus: Arc::new(SystemBus::new()),
            behaviors: Arc::new(BehaviorRegistry::new()),
            balancers: Arc::new(BalancerRegistry::new()),
        }
    }
}

impl SystemContext for BareSystemContext {
    fn is_overloaded(&self) -> bool {
        false
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

