//! The resource registry (spec §4.14): opaque, named handles the Actor
//! System hands to workers by name, without the resource itself being
//! an actor (e.g. a shared database pool).

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

/// A `name -> Arc<dyn Any>` map populated at system construction. Core
/// and workers only store and forward entries; they never interpret
/// them.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, resource: Arc<dyn Any + Send + Sync>) {
        self.resources.insert(name.into(), resource);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.resources.get(name).map(|entry| entry.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.resources.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_retrieves_by_name() {
        let registry = ResourceRegistry::new();
        registry.register("pool", Arc::new(42_u32));
        let resource = registry.get("pool").unwrap();
        assert_eq!(*resource.downcast_ref::<u32>().unwrap(), 42);
        assert!(registry.get("missing").is_none());
    }
}
