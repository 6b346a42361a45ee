// # Management Plane Trait
//
// Defines the interface to the virtualization management plane: inventory
// enumeration, per-object reads, network metadata resolution, and the change
// event subscription.
//
// ## Implementations
//
// SDK-specific clients live outside this crate and are plugged in through
// `ManagementPlaneFactory`.
//
// ## Usage
//
// ```rust,ignore
// use vcsync_core::traits::ManagementPlane;
//
// let plane = /* ManagementPlane implementation */;
// plane.connect().await?;
// let mut events = plane.subscribe(vcsync_core::classifier::SUBSCRIBED_EVENTS).await?;
// while let Some(batch) = events.next().await {
//     for event in batch? { /* classify */ }
// }
// ```

use crate::error::Result;
use crate::model::PowerState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;
use uuid::Uuid;

/// Stream of change event batches
///
/// Each item is one batch as delivered by the management plane. A stream error
/// is a transport failure; the end of the stream means the subscription died.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Vec<ChangeEvent>>> + Send + 'static>>;

/// Inventory record of a distributed port group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// Management-plane object key; the network identity derives from it
    pub key: String,
    pub name: String,
}

/// VLAN configuration of a port group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VlanSpec {
    /// Plain VLAN id
    Vlan { id: u16 },
    /// Private VLAN pair
    PrivateVlan { primary: u16, isolated: u16 },
}

/// Address pool bound to a port group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPool {
    pub subnet: IpAddr,
    pub netmask: IpAddr,
    pub gateway: Option<IpAddr>,
    pub enabled: bool,
    pub range: Option<String>,
}

/// Resolved addressing metadata of a network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMetadata {
    pub vlan: Option<VlanSpec>,
    pub pool: Option<AddressPool>,
    pub external_ipam: bool,
}

/// Network card of a machine as reported by the management plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicDescriptor {
    /// Name of the port group the card is backed by
    pub network_name: String,
    pub mac: String,
    /// Guest-reported address, when guest tools know one
    pub ip: Option<IpAddr>,
}

/// Inventory record of a virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDescriptor {
    pub instance_uuid: Uuid,
    pub name: String,
    pub host: String,
    pub power: Option<PowerState>,
    pub nics: Vec<NicDescriptor>,
}

/// Reference to a machine carried by an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineRef {
    pub name: String,
    pub instance_uuid: Option<Uuid>,
}

/// Change notification from the management plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Monotonic event key assigned by the management plane
    pub key: i64,
    /// Event type tag, e.g. `VmPoweredOnEvent`
    pub event_type: String,
    pub host: Option<String>,
    pub machine: Option<MachineRef>,
    /// Name of the affected port group
    pub network: Option<String>,
}

impl ChangeEvent {
    /// Event with only a type tag; attach targets with the `with_*` builders
    pub fn new(key: i64, event_type: impl Into<String>) -> Self {
        Self {
            key,
            event_type: event_type.into(),
            host: None,
            machine: None,
            network: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_machine(mut self, name: impl Into<String>, instance_uuid: Option<Uuid>) -> Self {
        self.machine = Some(MachineRef {
            name: name.into(),
            instance_uuid,
        });
        self
    }

    pub fn with_network(mut self, name: impl Into<String>) -> Self {
        self.network = Some(name.into());
        self
    }
}

/// Trait for management-plane clients
///
/// # Thread Safety
///
/// Implementations must be thread-safe; the engine holds one behind an `Arc`
/// and calls it from the scheduling loop only.
///
/// # Errors
///
/// Transport failures should surface as [`crate::Error::Connectivity`] (or
/// carry the SDK's fault signature) so the loop can force a reconnect.
#[async_trait]
pub trait ManagementPlane: Send + Sync {
    /// (Re)establish the session
    async fn connect(&self) -> Result<()>;

    /// Enumerate port groups of the managed switch
    async fn list_networks(&self) -> Result<Vec<NetworkDescriptor>>;

    /// Read one port group by name; `None` if it no longer exists
    async fn read_network(&self, name: &str) -> Result<Option<NetworkDescriptor>>;

    /// Resolve VLAN, address pool and address management mode of a port group
    async fn resolve_network_metadata(&self, network: &NetworkDescriptor) -> Result<NetworkMetadata>;

    /// Enumerate virtual machines
    async fn list_machines(&self) -> Result<Vec<MachineDescriptor>>;

    /// Read one machine; `None` if it no longer exists
    async fn read_machine(&self, target: &MachineRef) -> Result<Option<MachineDescriptor>>;

    /// Subscribe to change events of the given types
    async fn subscribe(&self, event_types: &[&str]) -> Result<EventStream>;

    /// Override the transport read timeout; `None` restores the default
    fn set_read_timeout(&self, timeout: Option<Duration>);

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Factory for creating management-plane clients
pub trait ManagementPlaneFactory: Send + Sync {
    /// Create a client from configuration
    fn create(
        &self,
        config: &crate::config::ManagementConfig,
    ) -> Result<Box<dyn ManagementPlane>>;
}
