//! Collaborator traits
//!
//! This module defines the seams to the external systems the reconciler talks to.
//!
//! - [`ManagementPlane`]: inventory snapshots, metadata and change events
//! - [`ControllerClient`]: CRUD against the SDN controller
//! - [`AgentClient`] / [`AgentConnector`]: per-host dataplane agent RPC
//! - [`LeaderElector`]: single active reconciler per deployment

pub mod controller;
pub mod dataplane;
pub mod leader;
pub mod management;

pub use controller::{ControllerClient, ControllerFactory, ControllerObject, ObjectKind, ObjectRef};
pub use dataplane::{AgentClient, AgentConnector, AgentConnectorFactory, PortRequest};
pub use leader::{LeaderElector, LeaderElectorFactory, StandaloneLeader};
pub use management::{
    AddressPool, ChangeEvent, EventStream, MachineDescriptor, MachineRef, ManagementPlane,
    ManagementPlaneFactory, NetworkDescriptor, NetworkMetadata, NicDescriptor, VlanSpec,
};
