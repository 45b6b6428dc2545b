//! Name-keyed custom balancer strategies (spec §4.6: "Custom... User
//! supplies a module with `forward(...args) → childId`"; spec §4.7:
//! "the map `name -> balancer`").

use std::sync::Arc;

use dashmap::DashMap;

use crate::balancer::CustomStrategy;

/// Process-wide `name -> custom strategy` map. A clustered actor whose
/// config names `BalancerKind::Custom(name)` resolves its strategy here
/// at dispatch time; built-in strategies (round-robin, random) never
/// touch this registry.
#[derive(Default)]
pub struct BalancerRegistry {
    strategies: DashMap<String, Arc<dyn CustomStrategy>>,
}

impl BalancerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, strategy: Arc<dyn CustomStrategy>) {
        self.strategies.insert(name.into(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomStrategy>> {
        self.strategies.get(name).map(|entry| entry.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actor::error::ActorError;
    use crate::actor::state::ActorState;

    struct AlwaysFirst;

    impl CustomStrategy for AlwaysFirst {
        fn forward(&self, _args: &[serde_json::Value], states: &[ActorState]) -> Result<usize, ActorError> {
            if states.is_empty() {
                return Err(ActorError::NoChild);
            }
            Ok(0)
        }
    }

    #[test]
    fn registers_and_resolves_by_name() {
        let registry = BalancerRegistry::new();
        registry.register("always-first", Arc::new(AlwaysFirst));
        assert!(registry.contains("always-first"));
        assert!(registry.get("missing").is_none());

        let strategy = registry.get("always-first").unwrap();
        let states = vec![ActorState::Ready];
        assert_eq!(strategy.forward(&[], &states).unwrap(), 0);
    }
}
