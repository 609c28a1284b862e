//! Router registry.
//!
//! Maps qualified function names to their active router. At most one
//! router exists per name; registering again replaces the previous one.

use crate::router::CallRouter;
use indexmap::IndexMap;
use mystic_core::Function;
use parking_lot::RwLock;
use std::sync::Arc;

/// Registry of active routers, in registration order
#[derive(Default)]
pub struct RouterRegistry {
    routers: RwLock<IndexMap<String, Arc<CallRouter>>>,
}

impl RouterRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a router under its qualified name, returning the router it
    /// replaced
    pub fn register(&self, router: Arc<CallRouter>) -> Option<Arc<CallRouter>> {
        let name = router.qualname();
        tracing::info!(function = %name, strategies = ?router.strategy_names(), "function hijacked");
        self.routers.write().insert(name, router)
    }

    /// Remove a router and return it
    pub fn remove(&self, name: &str) -> Option<Arc<CallRouter>> {
        let removed = self.routers.write().shift_remove(name);
        if removed.is_some() {
            tracing::info!(function = name, "function unhijacked");
        }
        removed
    }

    /// Remove a router and return the original function it wrapped
    pub fn unregister(&self, name: &str) -> Option<Function> {
        self.remove(name).map(|router| router.wrapped().clone())
    }

    /// Look up a router
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CallRouter>> {
        self.routers.read().get(name).cloned()
    }

    /// Whether `name` is hijacked
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.routers.read().contains_key(name)
    }

    /// Registered names in registration order
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        self.routers.read().keys().cloned().collect()
    }

    /// All registered routers
    #[must_use]
    pub fn all(&self) -> Vec<(String, Arc<CallRouter>)> {
        self.routers
            .read()
            .iter()
            .map(|(name, router)| (name.clone(), router.clone()))
            .collect()
    }

    /// Number of registered routers
    #[must_use]
    pub fn len(&self) -> usize {
        self.routers.read().len()
    }

    /// True when nothing is hijacked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::BlockStrategy;
    use mystic_core::{CallArgs, FunctionId, Value};
    use serde_json::json;

    fn named(name: &str) -> Function {
        Function::new(FunctionId::new("app", name), |_: &CallArgs| Ok(Value::Null))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = RouterRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(CallRouter::new(named("a"))));
        registry.register(Arc::new(CallRouter::new(named("b"))));

        assert_eq!(registry.list(), vec!["app.a", "app.b"]);
        assert!(registry.contains("app.a"));
        assert!(registry.get("app.c").is_none());
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = RouterRegistry::new();
        let first = Arc::new(CallRouter::new(named("a")));
        assert!(registry.register(first.clone()).is_none());

        let second = Arc::new(
            CallRouter::new(named("a")).with_strategy(BlockStrategy::returning("x")),
        );
        let replaced = registry.register(second).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("app.a").unwrap().call(&CallArgs::new()).unwrap(),
            json!("x")
        );
    }

    #[test]
    fn test_unregister_returns_original() {
        let registry = RouterRegistry::new();
        let original = named("a");
        registry.register(Arc::new(CallRouter::new(original.clone())));

        let restored = registry.unregister("app.a").unwrap();
        assert!(restored.same_body(&original));
        assert!(registry.unregister("app.a").is_none());
        assert!(registry.is_empty());
    }
}
