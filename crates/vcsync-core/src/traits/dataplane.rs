// # Dataplane Agent Trait
//
// Defines the per-host agent RPC used to plug and unplug ports. The agent
// protocol has no "modify": a changed port is removed and added again.
//
// Calls return `bool` rather than `Result`: a failed notification is never
// fatal and is healed by the keepalive replay.

use crate::error::Result;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Arguments of an add-port call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRequest {
    pub interface_id: Uuid,
    pub machine_id: Uuid,
    /// Port name on the agent; the interface identity as a string
    pub interface_name: String,
    pub ip: IpAddr,
    pub mac: String,
    pub network_id: Uuid,
    pub vlan_primary: u16,
    pub vlan_isolated: u16,
    pub machine_name: String,
}

/// Session with one dataplane agent
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Plug a port; `true` on success
    async fn add_port(&self, port: &PortRequest) -> bool;

    /// Unplug a port; `true` on success
    async fn delete_port(&self, interface_id: Uuid) -> bool;

    /// Lightweight liveness probe; `true` when the agent answered
    async fn periodic_connection_check(&self) -> bool;
}

/// Opens agent sessions by address
pub trait AgentConnector: Send + Sync {
    /// Open a session to the agent at `agent`
    ///
    /// The session may connect lazily; a failure here means the address is
    /// unusable, not that the agent is down.
    fn connect(&self, agent: IpAddr) -> Result<Arc<dyn AgentClient>>;
}

/// Factory for creating agent connectors
pub trait AgentConnectorFactory: Send + Sync {
    /// Create a connector from configuration
    fn create(
        &self,
        config: &crate::config::DataplaneConfig,
    ) -> Result<Box<dyn AgentConnector>>;
}
