use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

const INTERFACE_NAMESPACE: Uuid = Uuid::from_u128(0x0f5e_92c7_3b6a_4d18_8e41_5a9c_d2f0_7b33);
const ADDRESS_NAMESPACE: Uuid = Uuid::from_u128(0xa41b_7c05_e2d9_4a6f_b318_0c7e_59d4_12aa);

/// Attachment of a machine to a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: Uuid,
    pub machine_id: Uuid,
    pub network_id: Uuid,
    /// Lowercase colon-separated MAC address
    pub mac: String,
    /// Assigned address; `None` while assignment is pending
    pub ip: Option<IpAddr>,
    /// Copied from the owning network
    pub external_ipam: bool,
}

impl Interface {
    /// Build the interface of `machine_id` on `network_id`
    pub fn new(
        machine_id: Uuid,
        network_id: Uuid,
        mac: impl Into<String>,
        ip: Option<IpAddr>,
        external_ipam: bool,
    ) -> Self {
        Self {
            id: Self::id_for(machine_id, network_id),
            machine_id,
            network_id,
            mac: mac.into().to_ascii_lowercase(),
            ip,
            external_ipam,
        }
    }

    /// Identity of the single interface a machine may have on a network
    pub fn id_for(machine_id: Uuid, network_id: Uuid) -> Uuid {
        let mut name = [0u8; 32];
        name[..16].copy_from_slice(machine_id.as_bytes());
        name[16..].copy_from_slice(network_id.as_bytes());
        Uuid::new_v5(&INTERFACE_NAMESPACE, &name)
    }

    /// Identity of the instance address bound to this interface
    pub fn address_id(&self) -> Uuid {
        Uuid::new_v5(&ADDRESS_NAMESPACE, self.id.as_bytes())
    }

    /// Whether an instance address object accompanies this interface
    pub fn manages_address(&self) -> bool {
        !self.external_ipam
    }

    /// Keep the previously known address when this snapshot lacks one
    pub fn carry_over(mut self, old: &Interface) -> Self {
        if self.ip.is_none() {
            self.ip = old.ip;
        }
        self
    }
}
