//! The balancing layer (C6): strategies a clustered actor uses to pick
//! which child handles a given send.

pub mod strategy;

pub use strategy::{BalancerStrategy, CustomStrategy, RandomStrategy, RoundRobin};

use crate::actor::config::BalancerKind;

/// Build the built-in strategy named by a config (spec §4.6). `Custom`
/// strategies are registered with the Actor System under their name and
/// are not constructed here.
pub fn built_in_strategy(kind: &BalancerKind) -> Option<Box<dyn BalancerStrategy>> {
    match kind {
        BalancerKind::RoundRobin => Some(Box::new(RoundRobin::new())),
        BalancerKind::Random => Some(Box::new(RandomStrategy::new())),
        BalancerKind::Custom(_) => None,
    }
}
