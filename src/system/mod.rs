//! The Actor System (C7): factory, registries, admission control,
//! configuration loading, and the inbound TCP listener.

pub mod actor_system;
pub mod admission;
pub mod balancer_registry;
pub mod behavior_registry;
pub mod config_file;
pub mod listener;
pub mod resource;

pub use actor_system::{ActorSystem, ActorSystemBuilder};
pub use admission::AdmissionGate;
pub use balancer_registry::BalancerRegistry;
pub use behavior_registry::BehaviorRegistry;
pub use resource::ResourceRegistry;
