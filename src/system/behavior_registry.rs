//! Name-keyed behavior factories (spec §4.8: `definitionFormat:
//! modulePath`). A forked/remote worker can only reconstruct a behavior
//! that both sides registered under the same name ahead of time; there
//! is no cross-process code transfer in this implementation.

use std::sync::Arc;

use dashmap::DashMap;

use crate::actor::behavior::Behavior;

type FactoryFn = dyn Fn() -> Box<dyn Behavior> + Send + Sync;

/// Process-wide `name -> behavior factory` map. Populated by the
/// embedding application before any forked/remote actor is created;
/// worker binaries build the same registry at startup so the names
/// resolve identically on both sides.
#[derive(Default)]
pub struct BehaviorRegistry {
    factories: DashMap<String, Arc<FactoryFn>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Behavior> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn build(&self, name: &str) -> Option<Box<dyn Behavior>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actor::behavior::TopicMap;

    #[test]
    fn registers_and_builds_by_name() {
        let registry = BehaviorRegistry::new();
        registry.register("echo", || Box::new(TopicMap::new()));
        assert!(registry.contains("echo"));
        assert!(registry.build("echo").is_some());
        assert!(registry.build("missing").is_none());
    }
}
