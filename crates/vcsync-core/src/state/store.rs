// # Reconciliation Store
//
// In-memory authoritative cache of the networks and machines the reconciler
// manages. Interfaces (and their addresses) live inside their machine.
//
// ## Ordering
//
// Both collections are `BTreeMap`s keyed by identity, so every snapshot taken
// from the store is already in the order the sorted diff requires.
//
// ## Concurrency
//
// The scheduling loop is the only writer. Readers (keepalive, reporting) may
// enumerate concurrently; they always get a cloned snapshot.
//
// ## Crash Behavior
//
// Nothing is persisted. After a restart the first full reconciliation
// re-derives the cache from the management plane and the controller.

use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{Interface, Machine, MachineMap, Network, NetworkMap};

/// Shared handle to the reconciliation cache
///
/// Cloning the handle shares the underlying collections.
///
/// # Example
///
/// ```rust,no_run
/// use vcsync_core::state::ReconciliationStore;
///
/// # async fn demo(network: vcsync_core::model::Network) {
/// let store = ReconciliationStore::new();
/// store.put_network(network.clone()).await;
/// assert_eq!(store.network(network.id).await, Some(network));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReconciliationStore {
    networks: Arc<RwLock<NetworkMap>>,
    machines: Arc<RwLock<MachineMap>>,
}

impl ReconciliationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn network(&self, id: Uuid) -> Option<Network> {
        self.networks.read().await.get(&id).cloned()
    }

    pub async fn network_by_name(&self, name: &str) -> Option<Network> {
        self.networks
            .read()
            .await
            .values()
            .find(|n| n.name == name)
            .cloned()
    }

    pub async fn put_network(&self, network: Network) {
        self.networks.write().await.insert(network.id, network);
    }

    pub async fn remove_network(&self, id: Uuid) -> Option<Network> {
        self.networks.write().await.remove(&id)
    }

    /// Ordered snapshot of all networks
    pub async fn networks(&self) -> NetworkMap {
        self.networks.read().await.clone()
    }

    /// Drop networks whose identity is not in `keep`
    pub async fn retain_networks(&self, keep: impl Fn(&Uuid) -> bool) -> usize {
        let mut networks = self.networks.write().await;
        let before = networks.len();
        networks.retain(|id, _| keep(id));
        before - networks.len()
    }

    pub async fn machine(&self, id: Uuid) -> Option<Machine> {
        self.machines.read().await.get(&id).cloned()
    }

    pub async fn machine_by_name(&self, name: &str) -> Option<Machine> {
        self.machines
            .read()
            .await
            .values()
            .find(|m| m.name == name)
            .cloned()
    }

    pub async fn put_machine(&self, machine: Machine) {
        self.machines.write().await.insert(machine.id, machine);
    }

    /// Record the address of a cached interface; false when it is not cached
    pub async fn set_interface_ip(&self, machine_id: Uuid, interface_id: Uuid, ip: Option<IpAddr>) -> bool {
        let mut machines = self.machines.write().await;
        match machines
            .get_mut(&machine_id)
            .and_then(|m| m.interfaces.get_mut(&interface_id))
        {
            Some(iface) => {
                iface.ip = ip;
                true
            }
            None => false,
        }
    }

    pub async fn remove_machine(&self, id: Uuid) -> Option<Machine> {
        self.machines.write().await.remove(&id)
    }

    /// Ordered snapshot of all machines
    pub async fn machines(&self) -> MachineMap {
        self.machines.read().await.clone()
    }

    /// Drop machines whose identity is not in `keep`
    pub async fn retain_machines(&self, keep: impl Fn(&Uuid) -> bool) -> usize {
        let mut machines = self.machines.write().await;
        let before = machines.len();
        machines.retain(|id, _| keep(id));
        before - machines.len()
    }

    /// Machines attached to `network_id`, each with its interface on it
    ///
    /// Membership is derived from the machines' interfaces rather than stored
    /// on the network, so it can never disagree with them.
    pub async fn network_members(&self, network_id: Uuid) -> Vec<(Machine, Interface)> {
        self.machines
            .read()
            .await
            .values()
            .filter_map(|m| {
                m.interface_on(network_id)
                    .map(|iface| (m.clone(), iface.clone()))
            })
            .collect()
    }

    /// Ports plugged into `agent`
    pub async fn ports_on_agent(&self, agent: IpAddr) -> Vec<(Machine, Interface)> {
        self.machines
            .read()
            .await
            .values()
            .filter(|m| m.agent == Some(agent))
            .flat_map(|m| m.interfaces.values().map(move |iface| (m.clone(), iface.clone())))
            .collect()
    }

    /// Every cached interface with its machine
    pub async fn all_ports(&self) -> Vec<(Machine, Interface)> {
        self.machines
            .read()
            .await
            .values()
            .flat_map(|m| m.interfaces.values().map(move |iface| (m.clone(), iface.clone())))
            .collect()
    }

    /// Number of cached (networks, machines)
    pub async fn counts(&self) -> (usize, usize) {
        (self.networks.read().await.len(), self.machines.read().await.len())
    }
}
