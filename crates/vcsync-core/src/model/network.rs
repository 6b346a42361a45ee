use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Namespace for network identities derived from management-plane keys
const NETWORK_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_0a8e_41d2_4f5b_9a3e_7d20_c4b1_e901);

/// Primary and isolated VLAN of a network.
///
/// Without a private VLAN both values are the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VlanPair {
    pub primary: u16,
    pub isolated: u16,
}

impl VlanPair {
    /// Plain VLAN, no private-VLAN pairing
    pub fn single(vlan: u16) -> Self {
        Self {
            primary: vlan,
            isolated: vlan,
        }
    }
}

/// A virtual network mirrored to the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: Uuid,
    pub name: String,
    pub vlans: VlanPair,
    pub subnet: Option<IpAddr>,
    pub netmask: Option<IpAddr>,
    pub gateway: Option<IpAddr>,
    pub pool_enabled: bool,
    pub pool_range: Option<String>,
    pub external_ipam: bool,
}

impl Network {
    /// Stable identity for the management-plane object `key`.
    ///
    /// The same key always yields the same identity, across restarts too.
    pub fn id_from_key(key: &str) -> Uuid {
        Uuid::new_v5(&NETWORK_NAMESPACE, key.as_bytes())
    }

    /// Whether the controller assigns instance addresses on this network
    pub fn manages_addresses(&self) -> bool {
        !self.external_ipam
    }
}
