//! Test doubles shared by the contract tests.
//!
//! Every double is `Clone` and shares its state through `Arc`s, so a test keeps
//! one handle for scripting and assertions while the engine owns another.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use vcsync_core::config::{ControllerConfig, ManagementConfig, OperatingMode, SyncConfig};
use vcsync_core::error::{Error, Result};
use vcsync_core::model::{Interface, Machine, Network, PowerState};
use vcsync_core::traits::{
    AddressPool, AgentClient, AgentConnector, ChangeEvent, ControllerClient, ControllerObject,
    EventStream, LeaderElector, MachineDescriptor, MachineRef, ManagementPlane, NetworkDescriptor,
    NetworkMetadata, NicDescriptor, ObjectKind, ObjectRef, PortRequest, VlanSpec,
};
use vcsync_core::{AgentRegistry, SyncComponents, SyncEngine, SyncEvent};

pub const AGENT_1: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
pub const AGENT_2: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

type EventSender = mpsc::UnboundedSender<Result<Vec<ChangeEvent>>>;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn network_key(name: &str) -> String {
    format!("dvportgroup-{name}")
}

pub fn network_id(name: &str) -> Uuid {
    Network::id_from_key(&network_key(name))
}

/// A port group on its own VLAN with a /24 pool
pub fn network(name: &str, vlan: u16) -> (NetworkDescriptor, NetworkMetadata) {
    let descriptor = NetworkDescriptor {
        key: network_key(name),
        name: name.to_string(),
    };
    let metadata = NetworkMetadata {
        vlan: Some(VlanSpec::Vlan { id: vlan }),
        pool: Some(AddressPool {
            subnet: IpAddr::V4(Ipv4Addr::new(10, 1, (vlan % 256) as u8, 0)),
            netmask: IpAddr::V4(Ipv4Addr::new(255, 255, 255, 0)),
            gateway: Some(IpAddr::V4(Ipv4Addr::new(10, 1, (vlan % 256) as u8, 1))),
            enabled: true,
            range: None,
        }),
        external_ipam: false,
    };
    (descriptor, metadata)
}

pub fn nic(network_name: &str, octet: u8) -> NicDescriptor {
    NicDescriptor {
        network_name: network_name.to_string(),
        mac: format!("00:50:56:00:00:{octet:02x}"),
        ip: Some(IpAddr::V4(Ipv4Addr::new(10, 1, 0, octet))),
    }
}

/// A card whose guest reports no address
pub fn nic_without_ip(network_name: &str, octet: u8) -> NicDescriptor {
    NicDescriptor {
        ip: None,
        ..nic(network_name, octet)
    }
}

pub fn machine(n: u128, name: &str, host: &str, nics: Vec<NicDescriptor>) -> MachineDescriptor {
    MachineDescriptor {
        instance_uuid: Uuid::from_u128(n),
        name: name.to_string(),
        host: host.to_string(),
        power: Some(PowerState::PoweredOn),
        nics,
    }
}

pub fn machine_ref(descriptor: &MachineDescriptor) -> MachineRef {
    MachineRef {
        name: descriptor.name.clone(),
        instance_uuid: Some(descriptor.instance_uuid),
    }
}

pub fn interface_id(machine: u128, network_name: &str) -> Uuid {
    Interface::id_for(Uuid::from_u128(machine), network_id(network_name))
}

/// Two hosts, each with its own agent
pub fn agents() -> AgentRegistry {
    AgentRegistry::from_entries([
        ("esxi-1".to_string(), AGENT_1),
        ("esxi-2".to_string(), AGENT_2),
    ])
}

/// Configuration with short timings, for tests that drive the scheduling loop
pub fn fast_config(mode: OperatingMode) -> SyncConfig {
    let mut config = SyncConfig::new(
        ManagementConfig::Custom {
            factory: "scripted".to_string(),
            config: serde_json::Value::Null,
        },
        ControllerConfig::Custom {
            factory: "recording".to_string(),
            config: serde_json::Value::Null,
        },
    );
    config.mode = mode;
    config.engine.event_wait_ms = 20;
    config.engine.retry_interval_ms = 20;
    config.engine.reconcile_read_timeout_ms = 500;
    config.engine.keepalive_interval_ms = 60_000;
    config
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// All doubles wired together, plus handles for the test to script them
#[derive(Clone)]
pub struct Harness {
    pub management: ScriptedManagement,
    pub controller: RecordingController,
    pub dataplane: RecordingConnector,
    pub leader: ToggleLeader,
    pub agents: AgentRegistry,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            management: ScriptedManagement::new(),
            controller: RecordingController::new(),
            dataplane: RecordingConnector::new(),
            leader: ToggleLeader::new(),
            agents: agents(),
        }
    }

    pub fn components(&self) -> SyncComponents {
        SyncComponents {
            management: Arc::new(self.management.clone()),
            controller: Arc::new(self.controller.clone()),
            connector: Arc::new(self.dataplane.clone()),
            leader: Arc::new(self.leader.clone()),
            agents: self.agents.clone(),
        }
    }

    pub fn engine(&self, mode: OperatingMode) -> (SyncEngine, mpsc::Receiver<SyncEvent>) {
        self.engine_with(fast_config(mode))
    }

    pub fn engine_with(&self, config: SyncConfig) -> (SyncEngine, mpsc::Receiver<SyncEvent>) {
        SyncEngine::new(self.components(), config).expect("valid test config")
    }
}

/// Wait until an event matching `matches` arrives, or give up after `within`
pub async fn wait_for<F>(
    events: &mut mpsc::Receiver<SyncEvent>,
    within: Duration,
    matches: F,
) -> Option<SyncEvent>
where
    F: Fn(&SyncEvent) -> bool,
{
    tokio::time::timeout(within, async {
        while let Some(event) = events.recv().await {
            if matches(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

// ---------------------------------------------------------------------------
// Management plane
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inventory {
    networks: BTreeMap<String, (NetworkDescriptor, NetworkMetadata)>,
    machines: BTreeMap<Uuid, MachineDescriptor>,
}

/// Management plane serving an inventory the test edits, with events pushed by
/// the test through the current subscription
#[derive(Clone)]
pub struct ScriptedManagement {
    inventory: Arc<Mutex<Inventory>>,
    subscription: Arc<Mutex<Option<EventSender>>>,
    read_timeouts: Arc<Mutex<Vec<Option<Duration>>>>,
    fail_connect: Arc<AtomicBool>,
    fail_listing: Arc<AtomicBool>,
    connect_count: Arc<AtomicUsize>,
    subscribe_count: Arc<AtomicUsize>,
    list_count: Arc<AtomicUsize>,
}

impl ScriptedManagement {
    pub fn new() -> Self {
        Self {
            inventory: Arc::new(Mutex::new(Inventory::default())),
            subscription: Arc::new(Mutex::new(None)),
            read_timeouts: Arc::new(Mutex::new(Vec::new())),
            fail_connect: Arc::new(AtomicBool::new(false)),
            fail_listing: Arc::new(AtomicBool::new(false)),
            connect_count: Arc::new(AtomicUsize::new(0)),
            subscribe_count: Arc::new(AtomicUsize::new(0)),
            list_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn put_network(&self, (descriptor, metadata): (NetworkDescriptor, NetworkMetadata)) {
        self.inventory
            .lock()
            .unwrap()
            .networks
            .insert(descriptor.name.clone(), (descriptor, metadata));
    }

    pub fn remove_network(&self, name: &str) {
        self.inventory.lock().unwrap().networks.remove(name);
    }

    pub fn put_machine(&self, descriptor: MachineDescriptor) {
        self.inventory
            .lock()
            .unwrap()
            .machines
            .insert(descriptor.instance_uuid, descriptor);
    }

    pub fn remove_machine(&self, instance_uuid: Uuid) {
        self.inventory.lock().unwrap().machines.remove(&instance_uuid);
    }

    /// Edit a machine in place
    pub fn edit_machine(&self, instance_uuid: Uuid, edit: impl FnOnce(&mut MachineDescriptor)) {
        if let Some(machine) = self.inventory.lock().unwrap().machines.get_mut(&instance_uuid) {
            edit(machine);
        }
    }

    /// Push a batch through the current subscription; false when none is open
    pub fn emit(&self, batch: Vec<ChangeEvent>) -> bool {
        match self.subscription.lock().unwrap().as_ref() {
            Some(tx) => tx.send(Ok(batch)).is_ok(),
            None => false,
        }
    }

    /// Make the current subscription yield an error
    pub fn break_stream(&self) -> bool {
        match self.subscription.lock().unwrap().as_ref() {
            Some(tx) => tx
                .send(Err(Error::connectivity("scripted", "session dropped")))
                .is_ok(),
            None => false,
        }
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Inventory reads fail with a connectivity fault while set
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_count.load(Ordering::SeqCst)
    }

    pub fn read_timeouts(&self) -> Vec<Option<Duration>> {
        self.read_timeouts.lock().unwrap().clone()
    }

    fn check_listing(&self) -> Result<()> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::connectivity("scripted", "inventory read timed out"));
        }
        Ok(())
    }
}

#[async_trait]
impl ManagementPlane for ScriptedManagement {
    async fn connect(&self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::connectivity("scripted", "connection refused"));
        }
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkDescriptor>> {
        self.check_listing()?;
        self.list_count.fetch_add(1, Ordering::SeqCst);
        let inventory = self.inventory.lock().unwrap();
        Ok(inventory.networks.values().map(|(d, _)| d.clone()).collect())
    }

    async fn read_network(&self, name: &str) -> Result<Option<NetworkDescriptor>> {
        self.check_listing()?;
        let inventory = self.inventory.lock().unwrap();
        Ok(inventory.networks.get(name).map(|(d, _)| d.clone()))
    }

    async fn resolve_network_metadata(&self, network: &NetworkDescriptor) -> Result<NetworkMetadata> {
        self.check_listing()?;
        let inventory = self.inventory.lock().unwrap();
        inventory
            .networks
            .values()
            .find(|(d, _)| d.key == network.key)
            .map(|(_, m)| m.clone())
            .ok_or_else(|| Error::management(format!("no metadata for {}", network.key)))
    }

    async fn list_machines(&self) -> Result<Vec<MachineDescriptor>> {
        self.check_listing()?;
        let inventory = self.inventory.lock().unwrap();
        Ok(inventory.machines.values().cloned().collect())
    }

    async fn read_machine(&self, target: &MachineRef) -> Result<Option<MachineDescriptor>> {
        self.check_listing()?;
        let inventory = self.inventory.lock().unwrap();
        let by_id = target
            .instance_uuid
            .and_then(|id| inventory.machines.get(&id).cloned());
        Ok(by_id.or_else(|| {
            inventory
                .machines
                .values()
                .find(|m| m.name == target.name)
                .cloned()
        }))
    }

    async fn subscribe(&self, _event_types: &[&str]) -> Result<EventStream> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscription.lock().unwrap() = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) {
        self.read_timeouts.lock().unwrap().push(timeout);
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// One mutating call received by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCall {
    Upsert(ObjectRef),
    Delete(ObjectRef),
}

impl ControllerCall {
    pub fn object(&self) -> ObjectRef {
        match self {
            ControllerCall::Upsert(o) | ControllerCall::Delete(o) => *o,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.object().kind
    }
}

#[derive(Debug, Clone)]
enum Stored {
    Network(Network),
    Machine(Machine),
    Interface(Interface),
    InstanceIp { network_id: Uuid, ip: Option<IpAddr> },
}

/// In-memory controller: keeps what it was sent and lists it back, the way the
/// real controller answers listings with what earlier passes wrote
#[derive(Clone)]
pub struct RecordingController {
    objects: Arc<Mutex<BTreeMap<ObjectRef, Stored>>>,
    calls: Arc<Mutex<Vec<ControllerCall>>>,
    rejected: Arc<Mutex<HashSet<Uuid>>>,
    rejected_deletes: Arc<Mutex<HashSet<Uuid>>>,
    alive: Arc<AtomicBool>,
    connect_count: Arc<AtomicUsize>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            rejected: Arc::new(Mutex::new(HashSet::new())),
            rejected_deletes: Arc::new(Mutex::new(HashSet::new())),
            alive: Arc::new(AtomicBool::new(true)),
            connect_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seed an object as if an earlier run had written it
    pub fn seed_network(&self, network: Network) {
        self.objects.lock().unwrap().insert(
            ObjectRef::new(ObjectKind::Network, network.id),
            Stored::Network(network),
        );
    }

    pub fn calls(&self) -> Vec<ControllerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, kind: ObjectKind) -> Vec<ControllerCall> {
        self.calls().into_iter().filter(|c| c.kind() == kind).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn contains(&self, object: ObjectRef) -> bool {
        self.objects.lock().unwrap().contains_key(&object)
    }

    pub fn count_of(&self, kind: ObjectKind) -> usize {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|o| o.kind == kind)
            .count()
    }

    /// Upserts of the object with this id fail while set
    pub fn reject(&self, id: Uuid) {
        self.rejected.lock().unwrap().insert(id);
    }

    /// Deletes of the object with this id fail while set
    pub fn reject_delete(&self, id: Uuid) {
        self.rejected_deletes.lock().unwrap().insert(id);
    }

    pub fn clear_rejections(&self) {
        self.rejected.lock().unwrap().clear();
        self.rejected_deletes.lock().unwrap().clear();
    }

    /// Address held by the instance-ip object of `iface`
    pub fn instance_ip_of(&self, iface: &Interface) -> Option<IpAddr> {
        let objects = self.objects.lock().unwrap();
        match objects.get(&ObjectRef::new(ObjectKind::InstanceIp, iface.address_id())) {
            Some(Stored::InstanceIp { ip, .. }) => *ip,
            _ => None,
        }
    }

    /// First free host address from .100 of the network's subnet
    fn allocate(objects: &BTreeMap<ObjectRef, Stored>, network_id: Uuid) -> Option<IpAddr> {
        let subnet = match objects.get(&ObjectRef::new(ObjectKind::Network, network_id)) {
            Some(Stored::Network(network)) => network.subnet?,
            _ => return None,
        };
        let IpAddr::V4(base) = subnet else {
            return None;
        };
        let taken: HashSet<IpAddr> = objects
            .values()
            .filter_map(|o| match o {
                Stored::InstanceIp { network_id: n, ip } if *n == network_id => *ip,
                _ => None,
            })
            .collect();
        let [a, b, c, _] = base.octets();
        (100..=250)
            .map(|host| IpAddr::V4(Ipv4Addr::new(a, b, c, host)))
            .find(|ip| !taken.contains(ip))
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControllerClient for RecordingController {
    async fn connect(&self) -> Result<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if !self.alive.load(Ordering::SeqCst) {
            return Err(Error::connectivity("recording", "connection refused"));
        }
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn upsert(&self, object: ControllerObject<'_>) -> Result<()> {
        let object_ref = object.object_ref();
        self.calls.lock().unwrap().push(ControllerCall::Upsert(object_ref));
        if self.rejected.lock().unwrap().contains(&object_ref.id) {
            return Err(Error::controller("recording", format!("{object_ref} rejected")));
        }

        let stored = match object {
            ControllerObject::Network(n) => Stored::Network(n.clone()),
            ControllerObject::Machine(m) => Stored::Machine(m.clone()),
            ControllerObject::Interface(i) => Stored::Interface(i.clone()),
            ControllerObject::InstanceIp(i) => Stored::InstanceIp {
                network_id: i.network_id,
                ip: i.ip,
            },
        };
        self.objects.lock().unwrap().insert(object_ref, stored);
        Ok(())
    }

    async fn upsert_instance_ip(&self, iface: &Interface) -> Result<Option<IpAddr>> {
        let object_ref = ObjectRef::new(ObjectKind::InstanceIp, iface.address_id());
        self.calls.lock().unwrap().push(ControllerCall::Upsert(object_ref));
        if self.rejected.lock().unwrap().contains(&object_ref.id) {
            return Err(Error::controller("recording", format!("{object_ref} rejected")));
        }

        let mut objects = self.objects.lock().unwrap();
        let held = match objects.get(&object_ref) {
            Some(Stored::InstanceIp { ip, .. }) => *ip,
            _ => None,
        };
        let ip = iface
            .ip
            .or(held)
            .or_else(|| Self::allocate(&objects, iface.network_id));
        objects.insert(
            object_ref,
            Stored::InstanceIp {
                network_id: iface.network_id,
                ip,
            },
        );
        Ok(ip)
    }

    async fn delete(&self, object: ObjectRef) -> Result<()> {
        self.calls.lock().unwrap().push(ControllerCall::Delete(object));
        if self.rejected_deletes.lock().unwrap().contains(&object.id) {
            return Err(Error::controller("recording", format!("delete {object} rejected")));
        }
        self.objects.lock().unwrap().remove(&object);
        Ok(())
    }

    async fn list_networks(&self, _creator: &str) -> Result<Vec<Network>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .values()
            .filter_map(|o| match o {
                Stored::Network(n) => Some(n.clone()),
                _ => None,
            })
            .collect())
    }

    async fn list_machines(&self, _creator: &str) -> Result<Vec<Machine>> {
        let objects = self.objects.lock().unwrap();
        let interfaces: Vec<&Interface> = objects
            .values()
            .filter_map(|o| match o {
                Stored::Interface(i) => Some(i),
                _ => None,
            })
            .collect();

        Ok(objects
            .values()
            .filter_map(|o| match o {
                Stored::Machine(m) => Some(m),
                _ => None,
            })
            .map(|m| {
                let mut machine = m.clone();
                machine.interfaces = interfaces
                    .iter()
                    .filter(|i| i.machine_id == machine.id)
                    .map(|i| (i.id, (*i).clone()))
                    .collect();
                machine
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// Dataplane
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCall {
    Add { agent: IpAddr, port: PortRequest, ok: bool },
    Delete { agent: IpAddr, interface_id: Uuid, ok: bool },
    Check { agent: IpAddr, ok: bool },
}

impl AgentCall {
    pub fn agent(&self) -> IpAddr {
        match self {
            AgentCall::Add { agent, .. }
            | AgentCall::Delete { agent, .. }
            | AgentCall::Check { agent, .. } => *agent,
        }
    }
}

/// Connector handing out agents that log every call; agents marked down
/// answer `false`
#[derive(Clone)]
pub struct RecordingConnector {
    calls: Arc<Mutex<Vec<AgentCall>>>,
    down: Arc<Mutex<HashSet<IpAddr>>>,
    sessions: Arc<AtomicUsize>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            down: Arc::new(Mutex::new(HashSet::new())),
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_down(&self, agent: IpAddr, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(agent);
        } else {
            set.remove(&agent);
        }
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Interfaces successfully added on `agent`, in call order
    pub fn added_on(&self, agent: IpAddr) -> Vec<Uuid> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AgentCall::Add { agent: a, port, ok: true } if a == agent => Some(port.interface_id),
                _ => None,
            })
            .collect()
    }

    /// Interfaces successfully deleted on `agent`, in call order
    pub fn deleted_on(&self, agent: IpAddr) -> Vec<Uuid> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AgentCall::Delete { agent: a, interface_id, ok: true } if a == agent => {
                    Some(interface_id)
                }
                _ => None,
            })
            .collect()
    }

    pub fn checks_on(&self, agent: IpAddr) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, AgentCall::Check { agent: a, .. } if *a == agent))
            .count()
    }

    pub fn port_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, AgentCall::Check { .. }))
            .count()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl AgentConnector for RecordingConnector {
    fn connect(&self, agent: IpAddr) -> Result<Arc<dyn AgentClient>> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(RecordingAgent {
            agent,
            calls: Arc::clone(&self.calls),
            down: Arc::clone(&self.down),
        }))
    }
}

pub struct RecordingAgent {
    agent: IpAddr,
    calls: Arc<Mutex<Vec<AgentCall>>>,
    down: Arc<Mutex<HashSet<IpAddr>>>,
}

impl RecordingAgent {
    fn up(&self) -> bool {
        !self.down.lock().unwrap().contains(&self.agent)
    }
}

#[async_trait]
impl AgentClient for RecordingAgent {
    async fn add_port(&self, port: &PortRequest) -> bool {
        let ok = self.up();
        self.calls.lock().unwrap().push(AgentCall::Add {
            agent: self.agent,
            port: port.clone(),
            ok,
        });
        ok
    }

    async fn delete_port(&self, interface_id: Uuid) -> bool {
        let ok = self.up();
        self.calls.lock().unwrap().push(AgentCall::Delete {
            agent: self.agent,
            interface_id,
            ok,
        });
        ok
    }

    async fn periodic_connection_check(&self) -> bool {
        let ok = self.up();
        self.calls
            .lock()
            .unwrap()
            .push(AgentCall::Check { agent: self.agent, ok });
        ok
    }
}

// ---------------------------------------------------------------------------
// Leadership
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ToggleLeader {
    leading: Arc<AtomicBool>,
}

impl ToggleLeader {
    pub fn new() -> Self {
        Self {
            leading: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_leading(&self, leading: bool) {
        self.leading.store(leading, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeaderElector for ToggleLeader {
    async fn is_leader(&self) -> bool {
        self.leading.load(Ordering::SeqCst)
    }
}
