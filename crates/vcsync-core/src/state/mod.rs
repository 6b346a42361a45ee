//! Reconciliation state
//!
//! - [`ReconciliationStore`]: authoritative cache of networks and machines
//! - [`AgentRegistry`]: host → dataplane agent map with maintenance flags

pub mod agents;
pub mod store;

pub use agents::{AgentEntry, AgentRegistry};
pub use store::ReconciliationStore;
