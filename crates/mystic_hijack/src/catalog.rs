//! Function catalog: the binding site for hijackable functions.
//!
//! The catalog maps qualified names to their current binding, either the
//! original function or the router installed in its place. Hijacking swaps
//! the binding to a router; unhijacking restores the original returned by
//! the registry.

use crate::notify::NotificationHub;
use crate::registry::RouterRegistry;
use crate::router::{CallRouter, SharedStrategy};
use indexmap::IndexMap;
use mystic_core::{CallArgs, CallError, Environment, Function, Value};
use parking_lot::RwLock;
use std::sync::Arc;

/// Catalog error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// No function registered under this name
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    /// The function is not hijacked
    #[error("function is not hijacked: {0}")]
    NotHijacked(String),
    /// The call itself failed
    #[error(transparent)]
    Call(#[from] CallError),
}

#[derive(Clone)]
enum Binding {
    Original(Function),
    Hijacked(Arc<CallRouter>),
}

/// Named functions and their current bindings
pub struct FunctionCatalog {
    bindings: RwLock<IndexMap<String, Binding>>,
    registry: Arc<RouterRegistry>,
    hub: Arc<NotificationHub>,
    environment: Environment,
}

impl FunctionCatalog {
    /// Create a catalog backed by `registry`, publishing to `hub`
    #[must_use]
    pub fn new(registry: Arc<RouterRegistry>, hub: Arc<NotificationHub>) -> Self {
        Self {
            bindings: RwLock::new(IndexMap::new()),
            registry,
            hub,
            environment: Environment::default(),
        }
    }

    /// Environment given to routers created by this catalog
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Router registry
    #[must_use]
    pub fn registry(&self) -> &Arc<RouterRegistry> {
        &self.registry
    }

    /// Notification hub
    #[must_use]
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Register a function under its qualified name. A function that is
    /// already hijacked keeps its router until it is unhijacked.
    pub fn register(&self, function: Function) {
        let name = function.qualname();
        let mut bindings = self.bindings.write();
        match bindings.get(&name) {
            Some(Binding::Hijacked(_)) => {
                tracing::warn!(function = %name, "ignoring registration of hijacked function");
            }
            _ => {
                bindings.insert(name, Binding::Original(function));
            }
        }
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
    }

    /// Registered names
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.bindings.read().keys().cloned().collect()
    }

    /// Original function registered under `name`
    #[must_use]
    pub fn original(&self, name: &str) -> Option<Function> {
        self.bindings.read().get(name).map(|binding| match binding {
            Binding::Original(function) => function.clone(),
            Binding::Hijacked(router) => router.wrapped().clone(),
        })
    }

    /// Active router for `name`
    #[must_use]
    pub fn router(&self, name: &str) -> Option<Arc<CallRouter>> {
        match self.bindings.read().get(name) {
            Some(Binding::Hijacked(router)) => Some(router.clone()),
            _ => None,
        }
    }

    /// Call `name` through whatever is currently bound
    ///
    /// # Errors
    ///
    /// Returns error if the name is unknown or the call fails
    pub fn call(&self, name: &str, args: &CallArgs) -> Result<Value, CatalogError> {
        let binding = self
            .bindings
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownFunction(name.to_string()))?;
        let value = match binding {
            Binding::Original(function) => function.call(args)?,
            Binding::Hijacked(router) => router.call(args)?,
        };
        Ok(value)
    }

    /// Install a router with `strategies`, replacing any existing router
    ///
    /// # Errors
    ///
    /// Returns error if the name is unknown
    pub fn hijack(
        &self,
        name: &str,
        strategies: impl IntoIterator<Item = SharedStrategy>,
    ) -> Result<Arc<CallRouter>, CatalogError> {
        let mut bindings = self.bindings.write();
        let original = match bindings.get(name) {
            Some(Binding::Original(function)) => function.clone(),
            Some(Binding::Hijacked(router)) => router.wrapped().clone(),
            None => return Err(CatalogError::UnknownFunction(name.to_string())),
        };

        let router = Arc::new(
            CallRouter::new(original)
                .with_environment(self.environment)
                .with_hub(self.hub.clone())
                .with_strategies(strategies),
        );
        self.registry.register(router.clone());
        bindings.insert(name.to_string(), Binding::Hijacked(router.clone()));
        Ok(router)
    }

    /// Remove the router for `name` and rebind the original.
    /// Returns the removed router so its final metrics can be read.
    ///
    /// # Errors
    ///
    /// Returns error if the name is not hijacked
    pub fn unhijack(&self, name: &str) -> Result<Arc<CallRouter>, CatalogError> {
        let mut bindings = self.bindings.write();
        let router = self
            .registry
            .remove(name)
            .ok_or_else(|| CatalogError::NotHijacked(name.to_string()))?;
        bindings.insert(name.to_string(), Binding::Original(router.wrapped().clone()));
        Ok(router)
    }
}
