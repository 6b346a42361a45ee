//! Dataplane notifier
//!
//! Best-effort port plug/unplug notifications to the per-host agents, plus the
//! periodic keepalive that probes every active agent.
//!
//! ## Sessions
//!
//! One session per agent address, opened through the [`AgentConnector`] on
//! first use and cached. Each session tracks whether the agent answered its
//! last call.
//!
//! ## Healing
//!
//! Failed calls are logged and never retried inline. When the keepalive finds
//! an agent answering whose session was not live, it replays `add_port` for
//! every cached port on that agent.
//!
//! ## Startup replay
//!
//! The notifier remembers which ports it plugged since [`begin_pass`]. The
//! replay after the first full pass skips those, so a port created during the
//! pass is added once.
//!
//! [`begin_pass`]: DataplaneNotifier::begin_pass

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{Interface, Network, PortHost};
use crate::state::{AgentRegistry, ReconciliationStore};
use crate::traits::{AgentClient, AgentConnector, PortRequest};

#[derive(Clone)]
struct AgentSession {
    client: Arc<dyn AgentClient>,
    live: bool,
}

/// Outcome of one keepalive pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepaliveReport {
    /// Agents probed (hosts in maintenance excluded)
    pub probed: usize,
    /// Agents that answered
    pub live: usize,
    /// Agents that just came back and had their ports replayed
    pub recovered: usize,
    /// Ports re-added on recovered agents
    pub replayed: usize,
}

/// Sends port notifications to dataplane agents
#[derive(Clone)]
pub struct DataplaneNotifier {
    connector: Arc<dyn AgentConnector>,
    sessions: Arc<RwLock<HashMap<IpAddr, AgentSession>>>,
    /// Ports added since the last `begin_pass`
    plugged: Arc<RwLock<HashSet<Uuid>>>,
}

impl std::fmt::Debug for DataplaneNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataplaneNotifier").finish_non_exhaustive()
    }
}

impl DataplaneNotifier {
    pub fn new(connector: Arc<dyn AgentConnector>) -> Self {
        Self {
            connector,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            plugged: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Plug `iface` into the agent of `host`
    ///
    /// Suppressed (returns `false` without a call) when the machine is powered
    /// off, the address is still pending, or the agent is unknown.
    pub async fn add_port(&self, iface: &Interface, host: &PortHost, network: &Network) -> bool {
        let Some(agent) = host.agent else {
            debug!(interface = %iface.id, "add_port suppressed: agent unknown");
            return false;
        };
        if !host.powered_on {
            debug!(interface = %iface.id, machine = %host.machine_name, "add_port suppressed: powered off");
            return false;
        }
        let Some(port) = port_request(iface, host, network) else {
            debug!(interface = %iface.id, "add_port suppressed: address pending");
            return false;
        };

        let Some(client) = self.session(agent).await else {
            return false;
        };
        let ok = client.add_port(&port).await;
        if ok {
            self.plugged.write().await.insert(iface.id);
            debug!(%agent, interface = %iface.id, ip = %port.ip, "Port added");
        } else {
            warn!(%agent, interface = %iface.id, "add_port failed, keepalive will replay");
        }
        self.mark(agent, ok).await;
        ok
    }

    /// Unplug `iface` from the agent of `host`
    ///
    /// Suppressed only when the agent is unknown.
    pub async fn delete_port(&self, iface: &Interface, host: &PortHost) -> bool {
        let Some(agent) = host.agent else {
            debug!(interface = %iface.id, "delete_port suppressed: agent unknown");
            return false;
        };

        let Some(client) = self.session(agent).await else {
            return false;
        };
        let ok = client.delete_port(iface.id).await;
        self.plugged.write().await.remove(&iface.id);
        if ok {
            debug!(%agent, interface = %iface.id, "Port deleted");
        } else {
            warn!(%agent, interface = %iface.id, "delete_port failed");
        }
        self.mark(agent, ok).await;
        ok
    }

    /// Start tracking the ports plugged from here on
    pub async fn begin_pass(&self) {
        self.plugged.write().await.clear();
    }

    /// Add every cached port not already plugged since [`begin_pass`];
    /// returns how many calls succeeded
    ///
    /// [`begin_pass`]: DataplaneNotifier::begin_pass
    pub async fn replay_all(&self, store: &ReconciliationStore) -> usize {
        let ports = store.all_ports().await;
        let plugged = self.plugged.read().await.clone();
        let mut added = 0;
        for (machine, iface) in ports {
            if plugged.contains(&iface.id) {
                continue;
            }
            let Some(network) = store.network(iface.network_id).await else {
                continue;
            };
            if self.add_port(&iface, &machine.port_host(), &network).await {
                added += 1;
            }
        }
        info!("Replayed {} port(s) to dataplane agents", added);
        added
    }

    /// Probe every active agent, replaying ports on agents that came back
    pub async fn keepalive(&self, agents: &AgentRegistry, store: &ReconciliationStore) -> KeepaliveReport {
        let mut report = KeepaliveReport::default();

        for agent in agents.active_agents().await {
            let was_live = self
                .sessions
                .read()
                .await
                .get(&agent)
                .is_some_and(|s| s.live);
            let Some(client) = self.session(agent).await else {
                continue;
            };

            report.probed += 1;
            let alive = client.periodic_connection_check().await;
            self.mark(agent, alive).await;
            if !alive {
                debug!(%agent, "Agent did not answer keepalive");
                continue;
            }
            report.live += 1;

            if !was_live {
                report.recovered += 1;
                let mut replayed = 0;
                for (machine, iface) in store.ports_on_agent(agent).await {
                    let Some(network) = store.network(iface.network_id).await else {
                        continue;
                    };
                    if self.add_port(&iface, &machine.port_host(), &network).await {
                        replayed += 1;
                    }
                }
                report.replayed += replayed;
                info!(%agent, replayed, "Agent live again, ports replayed");
            }
        }

        report
    }

    /// Whether the agent answered its last call
    pub async fn is_live(&self, agent: IpAddr) -> bool {
        self.sessions.read().await.get(&agent).is_some_and(|s| s.live)
    }

    async fn session(&self, agent: IpAddr) -> Option<Arc<dyn AgentClient>> {
        if let Some(session) = self.sessions.read().await.get(&agent) {
            return Some(Arc::clone(&session.client));
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(&agent) {
            return Some(Arc::clone(&session.client));
        }
        match self.connector.connect(agent) {
            Ok(client) => {
                debug!(%agent, "Opened agent session");
                sessions.insert(
                    agent,
                    AgentSession {
                        client: Arc::clone(&client),
                        live: false,
                    },
                );
                Some(client)
            }
            Err(e) => {
                warn!(%agent, "Failed to open agent session: {}", e);
                None
            }
        }
    }

    async fn mark(&self, agent: IpAddr, live: bool) {
        if let Some(session) = self.sessions.write().await.get_mut(&agent) {
            session.live = live;
        }
    }
}

/// Build the add-port arguments; `None` while the address is pending
pub fn port_request(iface: &Interface, host: &PortHost, network: &Network) -> Option<PortRequest> {
    Some(PortRequest {
        interface_id: iface.id,
        machine_id: host.machine_id,
        interface_name: iface.id.to_string(),
        ip: iface.ip?,
        mac: iface.mac.clone(),
        network_id: network.id,
        vlan_primary: network.vlans.primary,
        vlan_isolated: network.vlans.isolated,
        machine_name: host.machine_name.clone(),
    })
}
