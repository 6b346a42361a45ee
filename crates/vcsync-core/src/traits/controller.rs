// # Controller Client Trait
//
// Defines the CRUD-by-identity contract against the SDN controller's object
// store. Objects created by this system carry a fixed creator tag so that
// listings can be scoped to what the reconciler owns.

use crate::error::Result;
use crate::model::{Interface, Machine, Network};
use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// Controller object kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Network,
    Machine,
    Interface,
    /// Instance address bound to an interface
    InstanceIp,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Network => "network",
            ObjectKind::Machine => "machine",
            ObjectKind::Interface => "interface",
            ObjectKind::InstanceIp => "instance-ip",
        };
        f.write_str(name)
    }
}

/// Identity of a controller object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: Uuid,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Object to create or update on the controller
///
/// A machine upsert covers the machine object only; its interfaces are
/// upserted individually.
#[derive(Debug, Clone, Copy)]
pub enum ControllerObject<'a> {
    Network(&'a Network),
    Machine(&'a Machine),
    Interface(&'a Interface),
    /// The instance address of the interface
    InstanceIp(&'a Interface),
}

impl ControllerObject<'_> {
    pub fn object_ref(&self) -> ObjectRef {
        match self {
            ControllerObject::Network(n) => ObjectRef::new(ObjectKind::Network, n.id),
            ControllerObject::Machine(m) => ObjectRef::new(ObjectKind::Machine, m.id),
            ControllerObject::Interface(i) => ObjectRef::new(ObjectKind::Interface, i.id),
            ControllerObject::InstanceIp(i) => ObjectRef::new(ObjectKind::InstanceIp, i.address_id()),
        }
    }
}

/// Trait for SDN controller clients
///
/// Every method is a single remote round trip (or a short sequence for
/// listings). Retry, ordering and caching are owned by the engine.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// (Re)establish the session
    async fn connect(&self) -> Result<()>;

    /// Cheap liveness probe of the API server
    async fn is_alive(&self) -> bool;

    /// Create the object, or update it in place if it exists
    async fn upsert(&self, object: ControllerObject<'_>) -> Result<()>;

    /// Create or update the instance address of `iface`
    ///
    /// Returns the address the controller holds for it. When `iface.ip` is
    /// `None` the controller allocates one from the network's pool.
    async fn upsert_instance_ip(&self, iface: &Interface) -> Result<Option<IpAddr>>;

    /// Delete the object; deleting a missing object succeeds
    async fn delete(&self, object: ObjectRef) -> Result<()>;

    /// Networks created with `creator` tag
    async fn list_networks(&self, creator: &str) -> Result<Vec<Network>>;

    /// Machines created with `creator` tag, interfaces populated
    async fn list_machines(&self, creator: &str) -> Result<Vec<Machine>>;

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Factory for creating controller clients
pub trait ControllerFactory: Send + Sync {
    /// Create a client from configuration
    fn create(
        &self,
        config: &crate::config::ControllerConfig,
    ) -> Result<Box<dyn ControllerClient>>;
}
