//! Entity model
//!
//! The three reconciled entity kinds and the identities that key them:
//!
//! - [`Network`]: a layer-2 domain (a distributed port group)
//! - [`Machine`]: a compute instance, with its [`Interface`]s
//! - [`Interface`]: the attachment of one machine to one network, carrying the
//!   instance address when the network's addresses are managed by the controller
//!
//! Every identity is a [`Uuid`]. `Uuid`'s ordering is byte-wise, which is the
//! same order as the lowercase hyphenated string form, so every
//! `BTreeMap<Uuid, _>` in the crate is sorted the way the diff expects.

mod interface;
mod machine;
mod network;

pub use interface::Interface;
pub use machine::{Machine, PortHost, PowerState};
pub use network::{Network, VlanPair};

use std::collections::BTreeMap;
use uuid::Uuid;

/// Snapshot of networks keyed (and ordered) by identity
pub type NetworkMap = BTreeMap<Uuid, Network>;

/// Snapshot of machines keyed (and ordered) by identity
pub type MachineMap = BTreeMap<Uuid, Machine>;

/// Interfaces of one machine keyed (and ordered) by identity
pub type InterfaceMap = BTreeMap<Uuid, Interface>;
