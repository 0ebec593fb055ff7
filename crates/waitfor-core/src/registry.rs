//! Scheme-to-waiter dispatch.
//!
//! An open mapping from URI scheme to a factory producing a fresh waiter
//! per attempt. The orchestrator never sees a concrete waiter type; new
//! schemes are added by registering a factory, not by editing the loop.

use std::collections::HashMap;

use crate::adapters::http::HttpWaiter;
use crate::adapters::redis::RedisWaiter;
use crate::adapters::sql::{DbDriver, DbWaiter};
use crate::error::{WaitError, WaitResult};
use crate::target::ResolvedTarget;
use crate::waiter::Waiter;

/// Constructs a fresh waiter for one attempt against a resolved target.
pub type WaiterFactory = Box<dyn Fn(&ResolvedTarget) -> Box<dyn Waiter> + Send + Sync>;

/// Registry of waiter factories keyed by URI scheme.
pub struct Registry {
    factories: HashMap<String, WaiterFactory>,
}

impl Registry {
    /// A registry with no schemes registered.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// The built-in schemes: `http`, `https`, `redis`, `postgres`, `mysql`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("http", |t| Box::new(HttpWaiter::new(t)));
        registry.register("https", |t| Box::new(HttpWaiter::new(t)));
        registry.register("redis", |t| Box::new(RedisWaiter::new(t)));
        registry.register("postgres", |t| Box::new(DbWaiter::new(t, DbDriver::Postgres)));
        registry.register("mysql", |t| Box::new(DbWaiter::new(t, DbDriver::MySql)));
        registry
    }

    /// Register (or replace) the factory for a scheme.
    pub fn register<F>(&mut self, scheme: &str, factory: F)
    where
        F: Fn(&ResolvedTarget) -> Box<dyn Waiter> + Send + Sync + 'static,
    {
        self.factories.insert(scheme.to_string(), Box::new(factory));
    }

    /// Whether a factory is registered for the scheme.
    pub fn supports(&self, scheme: &str) -> bool {
        self.factories.contains_key(scheme)
    }

    /// Build a fresh waiter for one attempt.
    pub fn create(&self, target: &ResolvedTarget) -> WaitResult<Box<dyn Waiter>> {
        let scheme = target.url.scheme();
        let factory = self
            .factories
            .get(scheme)
            .ok_or_else(|| WaitError::InvalidScheme(scheme.to_string()))?;
        Ok(factory(target))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
