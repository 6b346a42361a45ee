//! Snapshot construction
//!
//! Turns management-plane descriptors into model entities. Objects the
//! reconciler must not manage come back as an explicit [`Skip`] instead of an
//! error, so callers can tell "ignore this" apart from "something failed".

use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::Result;
use crate::model::{Interface, InterfaceMap, Machine, MachineMap, Network, NetworkMap, VlanPair};
use crate::state::AgentRegistry;
use crate::traits::{MachineDescriptor, ManagementPlane, NetworkDescriptor, NetworkMetadata, VlanSpec};

/// Why a descriptor does not become a managed entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// The dataplane agent's own VM
    AgentVm,
    /// No dataplane agent serves the machine's host
    NoAgent { host: String },
    /// None of the machine's cards is on a managed network
    NoManagedNetworks,
    /// Port group has no VLAN assigned
    VlanMissing,
    /// Port group has no address pool and does not use external IPAM
    AddressPoolMissing,
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skip::AgentVm => f.write_str("dataplane agent VM"),
            Skip::NoAgent { host } => write!(f, "no agent for host {host}"),
            Skip::NoManagedNetworks => f.write_str("not attached to any managed network"),
            Skip::VlanMissing => f.write_str("no VLAN assigned"),
            Skip::AddressPoolMissing => f.write_str("no address pool"),
        }
    }
}

/// Build a network from its descriptor and resolved metadata
pub fn build_network(
    descriptor: &NetworkDescriptor,
    metadata: &NetworkMetadata,
) -> std::result::Result<Network, Skip> {
    let vlans = match metadata.vlan.ok_or(Skip::VlanMissing)? {
        VlanSpec::Vlan { id } => VlanPair::single(id),
        VlanSpec::PrivateVlan { primary, isolated } => VlanPair { primary, isolated },
    };

    let pool = metadata.pool.as_ref();
    if pool.is_none() && !metadata.external_ipam {
        return Err(Skip::AddressPoolMissing);
    }

    Ok(Network {
        id: Network::id_from_key(&descriptor.key),
        name: descriptor.name.clone(),
        vlans,
        subnet: pool.map(|p| p.subnet),
        netmask: pool.map(|p| p.netmask),
        gateway: pool.and_then(|p| p.gateway),
        pool_enabled: pool.is_some_and(|p| p.enabled),
        pool_range: pool.and_then(|p| p.range.clone()),
        external_ipam: metadata.external_ipam,
    })
}

/// Fetch and build every managed network, sorted by identity
pub async fn network_snapshot(mgmt: &dyn ManagementPlane) -> Result<NetworkMap> {
    let mut networks = NetworkMap::new();
    for descriptor in mgmt.list_networks().await? {
        let metadata = mgmt.resolve_network_metadata(&descriptor).await?;
        match build_network(&descriptor, &metadata) {
            Ok(network) => {
                networks.insert(network.id, network);
            }
            Err(skip) => debug!(network = %descriptor.name, "Skipping network: {}", skip),
        }
    }
    Ok(networks)
}

/// Builds machines against the agent registry
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    agents: AgentRegistry,
    agent_vm_marker: String,
}

impl SnapshotBuilder {
    /// `agent_vm_marker` is matched case-insensitively against machine names
    pub fn new(agents: AgentRegistry, agent_vm_marker: impl Into<String>) -> Self {
        Self {
            agents,
            agent_vm_marker: agent_vm_marker.into().to_lowercase(),
        }
    }

    /// Build a machine whose cards resolve against `networks`
    ///
    /// Cards on unmanaged port groups are dropped.
    pub async fn build_machine(
        &self,
        descriptor: &MachineDescriptor,
        networks: &NetworkMap,
    ) -> std::result::Result<Machine, Skip> {
        let by_name: HashMap<&str, &Network> =
            networks.values().map(|n| (n.name.as_str(), n)).collect();
        self.build_with(descriptor, &by_name).await
    }

    /// Fetch and build every managed machine, sorted by identity
    pub async fn machine_snapshot(
        &self,
        mgmt: &dyn ManagementPlane,
        networks: &NetworkMap,
    ) -> Result<MachineMap> {
        let by_name: HashMap<&str, &Network> =
            networks.values().map(|n| (n.name.as_str(), n)).collect();

        let mut machines = MachineMap::new();
        for descriptor in mgmt.list_machines().await? {
            match self.build_with(&descriptor, &by_name).await {
                Ok(machine) => {
                    machines.insert(machine.id, machine);
                }
                Err(skip) => debug!(machine = %descriptor.name, "Skipping machine: {}", skip),
            }
        }
        Ok(machines)
    }

    async fn build_with(
        &self,
        descriptor: &MachineDescriptor,
        networks: &HashMap<&str, &Network>,
    ) -> std::result::Result<Machine, Skip> {
        if !self.agent_vm_marker.is_empty()
            && descriptor.name.to_lowercase().contains(&self.agent_vm_marker)
        {
            return Err(Skip::AgentVm);
        }

        let agent = self
            .agents
            .agent_for_host(&descriptor.host)
            .await
            .ok_or_else(|| Skip::NoAgent {
                host: descriptor.host.clone(),
            })?;

        let interfaces: InterfaceMap = descriptor
            .nics
            .iter()
            .filter_map(|nic| {
                let network = networks.get(nic.network_name.as_str())?;
                let iface = Interface::new(
                    descriptor.instance_uuid,
                    network.id,
                    nic.mac.clone(),
                    nic.ip,
                    network.external_ipam,
                );
                Some((iface.id, iface))
            })
            .collect();
        if interfaces.is_empty() {
            return Err(Skip::NoManagedNetworks);
        }

        Ok(Machine {
            id: descriptor.instance_uuid,
            name: descriptor.name.clone(),
            host: descriptor.host.clone(),
            agent: Some(agent),
            power: descriptor.power,
            interfaces,
        })
    }
}
