// # vcsync-core
//
// Core library for reconciling a virtualization management plane with an SDN
// controller and the per-host dataplane agents.
//
// ## Architecture Overview
//
// - **ManagementPlane**: inventory snapshots and change events (vCenter)
// - **ControllerClient**: CRUD against the SDN controller
// - **AgentClient**: per-host port plumbing on the dataplane agents
// - **SyncEngine**: scheduling loop driving full passes and event application
// - **ClientRegistry**: plugin-based registry for the client implementations
//
// Entities are keyed by UUID and kept in sorted maps; every full pass is a
// sorted diff of the previous state against a fresh snapshot, applied through
// a uniform create/update/sync/delete lifecycle.

pub mod classifier;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod notifier;
pub mod registry;
pub mod snapshot;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{ControllerConfig, ManagementConfig, OperatingMode, SyncConfig, SyncStrategy};
pub use engine::{SyncComponents, SyncEngine, SyncEvent};
pub use error::{Error, Result};
pub use model::{Interface, Machine, Network};
pub use registry::ClientRegistry;
pub use state::{AgentRegistry, ReconciliationStore};
pub use traits::{AgentClient, AgentConnector, ControllerClient, LeaderElector, ManagementPlane};
