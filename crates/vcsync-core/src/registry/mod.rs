//! Plugin-based client registry
//!
//! Clients for the external systems are registered by name at startup and
//! instantiated from configuration, so the engine never hardcodes a backend.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vcsync_core::registry::ClientRegistry;
//!
//! let registry = ClientRegistry::new();
//! vcsync_controller_vnc::register(&registry);
//!
//! let controller = registry.create_controller(&config.controller)?;
//! ```
//!
//! The `standalone` leader elector is always available.

use crate::config::{ControllerConfig, DataplaneConfig, LeaderConfig, ManagementConfig};
use crate::error::{Error, Result};
use crate::traits::leader::StandaloneLeaderFactory;
use crate::traits::{
    AgentConnector, AgentConnectorFactory, ControllerClient, ControllerFactory, LeaderElector,
    LeaderElectorFactory, ManagementPlane, ManagementPlaneFactory,
};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Registry of client factories keyed by type name
///
/// Uses interior mutability with RwLock, allowing concurrent reads and
/// exclusive writes.
pub struct ClientRegistry {
    management: RwLock<HashMap<String, Box<dyn ManagementPlaneFactory>>>,
    controllers: RwLock<HashMap<String, Box<dyn ControllerFactory>>>,
    connectors: RwLock<HashMap<String, Box<dyn AgentConnectorFactory>>>,
    leaders: RwLock<HashMap<String, Box<dyn LeaderElectorFactory>>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        let registry = Self {
            management: RwLock::default(),
            controllers: RwLock::default(),
            connectors: RwLock::default(),
            leaders: RwLock::default(),
        };
        registry.register_leader("standalone", Box::new(StandaloneLeaderFactory));
        registry
    }
}

impl ClientRegistry {
    /// Create a registry with only the built-in leader elector
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a management-plane factory (e.g. "vcenter")
    pub fn register_management(
        &self,
        name: impl Into<String>,
        factory: Box<dyn ManagementPlaneFactory>,
    ) {
        insert(&self.management, name.into(), factory);
    }

    /// Register a controller factory (e.g. "vnc")
    pub fn register_controller(&self, name: impl Into<String>, factory: Box<dyn ControllerFactory>) {
        insert(&self.controllers, name.into(), factory);
    }

    /// Register an agent connector factory (e.g. "thrift")
    pub fn register_connector(
        &self,
        name: impl Into<String>,
        factory: Box<dyn AgentConnectorFactory>,
    ) {
        insert(&self.connectors, name.into(), factory);
    }

    /// Register a leader elector factory
    pub fn register_leader(&self, name: impl Into<String>, factory: Box<dyn LeaderElectorFactory>) {
        insert(&self.leaders, name.into(), factory);
    }

    /// Create a management-plane client from configuration
    ///
    /// # Errors
    ///
    /// A config error if the type is not registered, or whatever the factory returns.
    pub fn create_management(&self, config: &ManagementConfig) -> Result<Box<dyn ManagementPlane>> {
        let name = config.type_name();
        let factories = self.management.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown management plane type: {}", name)))?;
        factory.create(config)
    }

    /// Create a controller client from configuration
    pub fn create_controller(&self, config: &ControllerConfig) -> Result<Box<dyn ControllerClient>> {
        let name = config.type_name();
        let factories = self.controllers.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown controller type: {}", name)))?;
        factory.create(config)
    }

    /// Create an agent connector from configuration
    pub fn create_connector(&self, config: &DataplaneConfig) -> Result<Box<dyn AgentConnector>> {
        let name = config.connector.as_str();
        let factories = self.connectors.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown agent connector: {}", name)))?;
        factory.create(config)
    }

    /// Create a leader elector from configuration
    pub fn create_leader(&self, config: &LeaderConfig) -> Result<Box<dyn LeaderElector>> {
        let name = config.type_name();
        let factories = self.leaders.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown leader elector: {}", name)))?;
        factory.create(config)
    }

    /// Names of registered management-plane types, sorted
    pub fn list_management(&self) -> Vec<String> {
        names(&self.management)
    }

    /// Names of registered controller types, sorted
    pub fn list_controllers(&self) -> Vec<String> {
        names(&self.controllers)
    }

    /// Names of registered agent connectors, sorted
    pub fn list_connectors(&self) -> Vec<String> {
        names(&self.connectors)
    }

    /// Names of registered leader electors, sorted
    pub fn list_leaders(&self) -> Vec<String> {
        names(&self.leaders)
    }
}

fn insert<F: ?Sized>(map: &RwLock<HashMap<String, Box<F>>>, name: String, factory: Box<F>) {
    let mut factories = map.write().unwrap_or_else(PoisonError::into_inner);
    if factories.insert(name.clone(), factory).is_some() {
        tracing::debug!(name = %name, "Replaced registered factory");
    }
}

fn names<F: ?Sized>(map: &RwLock<HashMap<String, Box<F>>>) -> Vec<String> {
    let factories = map.read().unwrap_or_else(PoisonError::into_inner);
    let mut names: Vec<String> = factories.keys().cloned().collect();
    names.sort();
    names
}
