use super::{Interface, InterfaceMap};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Power state reported by the management plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

/// A compute instance and its interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: Uuid,
    pub name: String,
    /// Owning hypervisor host
    pub host: String,
    /// Dataplane agent serving `host`
    pub agent: Option<IpAddr>,
    /// `None` when the management plane did not report one
    pub power: Option<PowerState>,
    pub interfaces: InterfaceMap,
}

impl Machine {
    pub fn is_powered_on(&self) -> bool {
        self.power == Some(PowerState::PoweredOn)
    }

    /// Where this machine's ports are plugged
    pub fn port_host(&self) -> PortHost {
        PortHost {
            machine_id: self.id,
            machine_name: self.name.clone(),
            agent: self.agent,
            powered_on: self.is_powered_on(),
        }
    }

    /// Change that moves or unplugs every port of the machine
    pub fn vrouter_affecting(&self, old: &Machine) -> bool {
        self.agent != old.agent || self.host != old.host || self.power != old.power
    }

    /// Change to the fields mirrored on the controller's machine object
    pub fn controller_fields_differ(&self, old: &Machine) -> bool {
        self.name != old.name
            || self.host != old.host
            || self.agent != old.agent
            || self.power != old.power
    }

    /// Keep per-interface addresses the fresh snapshot does not report
    pub fn carry_over(mut self, old: &Machine) -> Self {
        for (id, iface) in self.interfaces.iter_mut() {
            if let Some(previous) = old.interfaces.get(id) {
                if iface.ip.is_none() {
                    iface.ip = previous.ip;
                }
            }
        }
        self
    }

    /// Keep addresses the controller assigned when the management plane
    /// reports none; external-IPAM interfaces are left as reported
    pub fn keep_assigned(mut self, old: &Machine) -> Self {
        for (id, iface) in self.interfaces.iter_mut() {
            if !iface.manages_address() || iface.ip.is_some() {
                continue;
            }
            if let Some(previous) = old.interfaces.get(id) {
                iface.ip = previous.ip;
            }
        }
        self
    }

    pub fn interface_on(&self, network_id: Uuid) -> Option<&Interface> {
        self.interfaces.get(&Interface::id_for(self.id, network_id))
    }
}

/// Dataplane placement of a machine's ports.
///
/// Carried alongside interface operations so a port can be unplugged from the
/// agent it was on and plugged into the one it moved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortHost {
    pub machine_id: Uuid,
    pub machine_name: String,
    pub agent: Option<IpAddr>,
    pub powered_on: bool,
}
