//! Event classifier
//!
//! Maps management-plane change events onto a closed set of lifecycle
//! transitions and applies them through the [`Lifecycle`] contract.
//!
//! ## Event Flow
//!
//! 1. [`Transition::classify`] turns the type tag into a transition
//! 2. The affected object is re-read and rebuilt as a snapshot
//! 3. The snapshot is compared with the stored entity by identity
//! 4. Create, update, or delete runs; equal snapshots are a no-op
//!
//! Unknown type tags become [`Transition::Unhandled`] and fail with
//! [`Error::UnsupportedEvent`]; the engine answers that with a resync.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lifecycle::{Lifecycle, SyncContext};
use crate::model::Machine;
use crate::snapshot::{Skip, SnapshotBuilder, build_network};
use crate::state::AgentRegistry;
use crate::traits::{ChangeEvent, MachineRef, ManagementPlane};

const MACHINE_CREATED: &[&str] = &[
    "VmBeingCreatedEvent",
    "VmCreatedEvent",
    "VmClonedEvent",
    "VmCloneEvent",
    "VmDeployedEvent",
];

const MACHINE_UPDATED: &[&str] = &[
    "VmReconfiguredEvent",
    "VmRenamedEvent",
    "VmMacChangedEvent",
    "VmMacAssignedEvent",
    "VmPoweredOnEvent",
    "VmPoweredOffEvent",
];

const MACHINE_REMOVED: &[&str] = &["VmRemovedEvent"];

const NETWORK_CREATED: &[&str] = &["DVPortgroupCreatedEvent"];

const NETWORK_UPDATED: &[&str] = &["DVPortgroupReconfiguredEvent", "DVPortgroupRenamedEvent"];

const NETWORK_REMOVED: &[&str] = &["DVPortgroupDestroyedEvent"];

const HOST_INACTIVE: &[&str] = &["EnteredMaintenanceModeEvent", "HostConnectionLostEvent"];

const HOST_ACTIVE: &[&str] = &["ExitMaintenanceModeEvent", "HostConnectedEvent"];

/// Event types the engine subscribes to
pub const SUBSCRIBED_EVENTS: &[&str] = &[
    "VmBeingCreatedEvent",
    "VmCreatedEvent",
    "VmClonedEvent",
    "VmCloneEvent",
    "VmDeployedEvent",
    "VmReconfiguredEvent",
    "VmRenamedEvent",
    "VmMacChangedEvent",
    "VmMacAssignedEvent",
    "VmPoweredOnEvent",
    "VmPoweredOffEvent",
    "VmRemovedEvent",
    "DVPortgroupCreatedEvent",
    "DVPortgroupReconfiguredEvent",
    "DVPortgroupRenamedEvent",
    "DVPortgroupDestroyedEvent",
    "EnteredMaintenanceModeEvent",
    "HostConnectionLostEvent",
    "ExitMaintenanceModeEvent",
    "HostConnectedEvent",
];

/// Lifecycle transition an event stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    MachineCreated(MachineRef),
    MachineUpdated(MachineRef),
    MachineRemoved(MachineRef),
    /// Port group name
    NetworkCreated(String),
    NetworkUpdated(String),
    NetworkRemoved(String),
    /// Host left maintenance or reconnected
    HostActive(String),
    /// Host entered maintenance or lost its connection
    HostInactive(String),
    /// Type tag with no defined handling, or a known tag missing its target
    Unhandled(String),
}

impl Transition {
    pub fn classify(event: &ChangeEvent) -> Transition {
        let tag = event.event_type.as_str();
        let machine = || event.machine.clone();
        let network = || event.network.clone();
        let host = || event.host.clone();

        let transition = if MACHINE_CREATED.contains(&tag) {
            machine().map(Transition::MachineCreated)
        } else if MACHINE_UPDATED.contains(&tag) {
            machine().map(Transition::MachineUpdated)
        } else if MACHINE_REMOVED.contains(&tag) {
            machine().map(Transition::MachineRemoved)
        } else if NETWORK_CREATED.contains(&tag) {
            network().map(Transition::NetworkCreated)
        } else if NETWORK_UPDATED.contains(&tag) {
            network().map(Transition::NetworkUpdated)
        } else if NETWORK_REMOVED.contains(&tag) {
            network().map(Transition::NetworkRemoved)
        } else if HOST_INACTIVE.contains(&tag) {
            host().map(Transition::HostInactive)
        } else if HOST_ACTIVE.contains(&tag) {
            host().map(Transition::HostActive)
        } else {
            None
        };

        transition.unwrap_or_else(|| Transition::Unhandled(event.event_type.clone()))
    }
}

/// What applying an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The store and the controller were changed
    Applied,
    /// The fresh snapshot equals the stored entity
    Unchanged,
    /// Nothing to manage; the reason is for logs
    Ignored(String),
}

/// Applies change events to the reconciliation state
pub struct EventClassifier {
    mgmt: Arc<dyn ManagementPlane>,
    agents: AgentRegistry,
    builder: SnapshotBuilder,
}

impl EventClassifier {
    pub fn new(mgmt: Arc<dyn ManagementPlane>, agents: AgentRegistry, builder: SnapshotBuilder) -> Self {
        Self {
            mgmt,
            agents,
            builder,
        }
    }

    /// Classify and apply one event
    pub async fn apply(&self, event: &ChangeEvent, ctx: &SyncContext) -> Result<EventOutcome> {
        let transition = Transition::classify(event);
        debug!(key = event.key, event_type = %event.event_type, ?transition, "Applying event");

        match transition {
            Transition::MachineCreated(target) | Transition::MachineUpdated(target) => {
                self.refresh_machine(&target, ctx).await
            }
            Transition::MachineRemoved(target) => self.remove_machine(&target, ctx).await,
            Transition::NetworkCreated(name) | Transition::NetworkUpdated(name) => {
                self.refresh_network(&name, ctx).await
            }
            Transition::NetworkRemoved(name) => self.remove_network(&name, ctx).await,
            Transition::HostActive(host) => self.set_host_active(&host, true).await,
            Transition::HostInactive(host) => self.set_host_active(&host, false).await,
            Transition::Unhandled(tag) => Err(Error::unsupported_event(tag)),
        }
    }

    async fn stored_machine(&self, target: &MachineRef, ctx: &SyncContext) -> Option<Machine> {
        if let Some(id) = target.instance_uuid {
            if let Some(machine) = ctx.store.machine(id).await {
                return Some(machine);
            }
        }
        ctx.store.machine_by_name(&target.name).await
    }

    async fn refresh_machine(&self, target: &MachineRef, ctx: &SyncContext) -> Result<EventOutcome> {
        let Some(descriptor) = self.mgmt.read_machine(target).await? else {
            return Ok(EventOutcome::Ignored(format!("machine {} no longer exists", target.name)));
        };
        let networks = ctx.store.networks().await;

        let machine = match self.builder.build_machine(&descriptor, &networks).await {
            Ok(machine) => machine,
            // No longer manageable: detached from every managed network, moved
            // to a host without an agent, or now the agent VM. Forget it.
            Err(skip @ (Skip::NoManagedNetworks | Skip::NoAgent { .. } | Skip::AgentVm)) => {
                return match ctx.store.machine(descriptor.instance_uuid).await {
                    Some(stored) => {
                        info!(machine = %stored.id, name = %stored.name, reason = %skip, "Machine no longer managed");
                        stored.delete(&(), ctx).await?;
                        Ok(EventOutcome::Applied)
                    }
                    None => Ok(EventOutcome::Ignored(skip.to_string())),
                };
            }
            Err(skip) => return Ok(EventOutcome::Ignored(skip.to_string())),
        };

        match ctx.store.machine(machine.id).await {
            None => {
                machine.create(&(), ctx).await?;
                Ok(EventOutcome::Applied)
            }
            Some(old) => {
                let machine = machine.keep_assigned(&old);
                if old == machine {
                    return Ok(EventOutcome::Unchanged);
                }
                machine.update(&old, &(), ctx).await?;
                Ok(EventOutcome::Applied)
            }
        }
    }

    async fn remove_machine(&self, target: &MachineRef, ctx: &SyncContext) -> Result<EventOutcome> {
        match self.stored_machine(target, ctx).await {
            Some(stored) => {
                stored.delete(&(), ctx).await?;
                Ok(EventOutcome::Applied)
            }
            None => Ok(EventOutcome::Ignored(format!("machine {} is not managed", target.name))),
        }
    }

    async fn refresh_network(&self, name: &str, ctx: &SyncContext) -> Result<EventOutcome> {
        let Some(descriptor) = self.mgmt.read_network(name).await? else {
            return Ok(EventOutcome::Ignored(format!("network {name} no longer exists")));
        };
        let metadata = self.mgmt.resolve_network_metadata(&descriptor).await?;

        let network = match build_network(&descriptor, &metadata) {
            Ok(network) => network,
            Err(skip) => return Ok(EventOutcome::Ignored(skip.to_string())),
        };

        match ctx.store.network(network.id).await {
            None => {
                network.create(&(), ctx).await?;
                Ok(EventOutcome::Applied)
            }
            Some(old) if old == network => Ok(EventOutcome::Unchanged),
            Some(old) => {
                network.update(&old, &(), ctx).await?;
                Ok(EventOutcome::Applied)
            }
        }
    }

    async fn remove_network(&self, name: &str, ctx: &SyncContext) -> Result<EventOutcome> {
        match ctx.store.network_by_name(name).await {
            Some(stored) => {
                stored.delete(&(), ctx).await?;
                Ok(EventOutcome::Applied)
            }
            None => Ok(EventOutcome::Ignored(format!("network {name} is not managed"))),
        }
    }

    async fn set_host_active(&self, host: &str, active: bool) -> Result<EventOutcome> {
        match self.agents.set_host_active(host, active).await {
            Some(agent) => {
                info!(host, %agent, active, "Host agent availability changed");
                Ok(EventOutcome::Applied)
            }
            None => Ok(EventOutcome::Ignored(format!("host {host} has no agent"))),
        }
    }
}
