//! Request bodies and response parsing for the VNC API
//!
//! Everything here is pure. Fields the API has no native slot for travel in
//! `annotations.key_value_pair` and are read back from there, so a listed
//! object compares equal to the entity it was written from.

use serde_json::{Value, json};
use std::net::{IpAddr, Ipv4Addr};
use uuid::Uuid;
use vcsync_core::model::{Interface, InterfaceMap, Machine, Network, PowerState, VlanPair};
use vcsync_core::traits::{ControllerObject, ObjectKind};

/// Root domain every project lives under
pub const ROOT_DOMAIN: &str = "default-domain";

/// IPAM the networks' subnets are attached to
pub const IPAM_NAME: &str = "vCenter-ipam";

/// API resource name for an object kind
pub fn resource(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Network => "virtual-network",
        ObjectKind::Machine => "virtual-machine",
        ObjectKind::Interface => "virtual-machine-interface",
        ObjectKind::InstanceIp => "instance-ip",
    }
}

/// Request body for creating or updating `object`
pub fn build_body(object: &ControllerObject<'_>, project: &str, creator: &str) -> Value {
    let id_perms = json!({ "creator": creator, "enable": true });
    match object {
        ControllerObject::Network(network) => network_body(network, project, id_perms),
        ControllerObject::Machine(machine) => machine_body(machine, id_perms),
        ControllerObject::Interface(iface) => interface_body(iface, project, id_perms),
        ControllerObject::InstanceIp(iface) => instance_ip_body(iface, id_perms),
    }
}

fn network_body(network: &Network, project: &str, id_perms: Value) -> Value {
    let mut body = json!({
        "uuid": network.id.to_string(),
        "name": network.name,
        "display_name": network.name,
        "fq_name": [ROOT_DOMAIN, project, network.name],
        "parent_type": "project",
        "id_perms": id_perms,
        "annotations": annotations(&[
            ("vlan_primary", Some(network.vlans.primary.to_string())),
            ("vlan_isolated", Some(network.vlans.isolated.to_string())),
            ("subnet", network.subnet.map(|ip| ip.to_string())),
            ("netmask", network.netmask.map(|ip| ip.to_string())),
            ("gateway", network.gateway.map(|ip| ip.to_string())),
            ("pool_enabled", Some(network.pool_enabled.to_string())),
            ("pool_range", network.pool_range.clone()),
            ("external_ipam", Some(network.external_ipam.to_string())),
        ]),
    });

    if let (Some(subnet), Some(netmask)) = (network.subnet, network.netmask) {
        let mut ipam_subnet = json!({
            "subnet": { "ip_prefix": subnet.to_string(), "ip_prefix_len": prefix_len(netmask) },
            "enable_dhcp": true,
            "addr_from_start": true,
            "subnet_name": format!("{}-subnet", network.name),
        });
        if let Some(gateway) = network.gateway {
            ipam_subnet["default_gateway"] = json!(gateway.to_string());
        }
        if network.pool_enabled {
            if let Some((start, end)) = network.pool_range.as_deref().and_then(allocation_pool) {
                ipam_subnet["allocation_pools"] =
                    json!([{ "start": start.to_string(), "end": end.to_string() }]);
            }
        }
        body["network_ipam_refs"] = json!([{
            "to": [ROOT_DOMAIN, project, IPAM_NAME],
            "attr": { "ipam_subnets": [ipam_subnet] },
        }]);
    }

    wrap(ObjectKind::Network, body)
}

fn machine_body(machine: &Machine, id_perms: Value) -> Value {
    let body = json!({
        "uuid": machine.id.to_string(),
        "name": machine.id.to_string(),
        "fq_name": [machine.id.to_string()],
        "display_name": machine.name,
        "id_perms": id_perms,
        "annotations": annotations(&[
            ("host", Some(machine.host.clone())),
            ("agent", machine.agent.map(|ip| ip.to_string())),
            ("power", machine.power.map(|p| power_str(p).to_string())),
        ]),
    });
    wrap(ObjectKind::Machine, body)
}

fn interface_body(iface: &Interface, project: &str, id_perms: Value) -> Value {
    let body = json!({
        "uuid": iface.id.to_string(),
        "name": iface.id.to_string(),
        "fq_name": [ROOT_DOMAIN, project, iface.id.to_string()],
        "parent_type": "project",
        "id_perms": id_perms,
        "virtual_machine_interface_mac_addresses": { "mac_address": [iface.mac] },
        "virtual_machine_refs": [{ "uuid": iface.machine_id.to_string() }],
        "virtual_network_refs": [{ "uuid": iface.network_id.to_string() }],
        "annotations": annotations(&[
            ("ip", iface.ip.map(|ip| ip.to_string())),
            ("external_ipam", Some(iface.external_ipam.to_string())),
        ]),
    });
    wrap(ObjectKind::Interface, body)
}

fn instance_ip_body(iface: &Interface, id_perms: Value) -> Value {
    let id = iface.address_id().to_string();
    let mut body = json!({
        "uuid": id,
        "name": id,
        "fq_name": [id],
        "id_perms": id_perms,
        "virtual_network_refs": [{ "uuid": iface.network_id.to_string() }],
        "virtual_machine_interface_refs": [{ "uuid": iface.id.to_string() }],
    });
    if let Some(ip) = iface.ip {
        body["instance_ip_address"] = json!(ip.to_string());
    }
    wrap(ObjectKind::InstanceIp, body)
}

fn wrap(kind: ObjectKind, body: Value) -> Value {
    let mut object = serde_json::Map::new();
    object.insert(resource(kind).to_string(), body);
    Value::Object(object)
}

fn annotations(pairs: &[(&str, Option<String>)]) -> Value {
    let pairs: Vec<Value> = pairs
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| json!({ "key": key, "value": v })))
        .collect();
    json!({ "key_value_pair": pairs })
}

fn annotation<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object["annotations"]["key_value_pair"]
        .as_array()?
        .iter()
        .find(|pair| pair["key"].as_str() == Some(key))?["value"]
        .as_str()
}

fn annotation_parse<T: std::str::FromStr>(object: &Value, key: &str) -> Option<T> {
    annotation(object, key)?.parse().ok()
}

fn power_str(power: PowerState) -> &'static str {
    match power {
        PowerState::PoweredOn => "powered_on",
        PowerState::PoweredOff => "powered_off",
        PowerState::Suspended => "suspended",
    }
}

fn parse_power(value: &str) -> Option<PowerState> {
    match value {
        "powered_on" => Some(PowerState::PoweredOn),
        "powered_off" => Some(PowerState::PoweredOff),
        "suspended" => Some(PowerState::Suspended),
        _ => None,
    }
}

fn uuid_field(object: &Value) -> Option<Uuid> {
    object["uuid"].as_str()?.parse().ok()
}

fn first_ref(object: &Value, field: &str) -> Option<Uuid> {
    object[field].as_array()?.first()?["uuid"].as_str()?.parse().ok()
}

/// Objects of a detailed listing (`GET /<type>s?detail=True`)
///
/// Each item is either the object itself or wraps it under the resource name.
pub fn list_items<'a>(response: &'a Value, resource: &str) -> Vec<&'a Value> {
    response[format!("{resource}s")]
        .as_array()
        .map(|items| items.iter().map(|item| item.get(resource).unwrap_or(item)).collect())
        .unwrap_or_default()
}

/// Whether the object carries the creator tag
pub fn created_by(object: &Value, creator: &str) -> bool {
    object["id_perms"]["creator"].as_str() == Some(creator)
}

/// Network from a `virtual-network` object
pub fn parse_network(object: &Value) -> Option<Network> {
    let name = object["display_name"]
        .as_str()
        .or_else(|| object["name"].as_str())?
        .to_string();
    let primary: u16 = annotation_parse(object, "vlan_primary")?;

    Some(Network {
        id: uuid_field(object)?,
        name,
        vlans: VlanPair {
            primary,
            isolated: annotation_parse(object, "vlan_isolated").unwrap_or(primary),
        },
        subnet: annotation_parse(object, "subnet"),
        netmask: annotation_parse(object, "netmask"),
        gateway: annotation_parse(object, "gateway"),
        pool_enabled: annotation_parse(object, "pool_enabled").unwrap_or(false),
        pool_range: annotation(object, "pool_range").map(str::to_string),
        external_ipam: annotation_parse(object, "external_ipam").unwrap_or(false),
    })
}

/// Machine from a `virtual-machine` object, without interfaces
pub fn parse_machine(object: &Value) -> Option<Machine> {
    Some(Machine {
        id: uuid_field(object)?,
        name: object["display_name"].as_str()?.to_string(),
        host: annotation(object, "host").unwrap_or_default().to_string(),
        agent: annotation_parse(object, "agent"),
        power: annotation(object, "power").and_then(parse_power),
        interfaces: InterfaceMap::new(),
    })
}

/// Interface from a `virtual-machine-interface` object
pub fn parse_interface(object: &Value) -> Option<Interface> {
    let mac = object["virtual_machine_interface_mac_addresses"]["mac_address"]
        .as_array()?
        .first()?
        .as_str()?;
    let mut iface = Interface::new(
        first_ref(object, "virtual_machine_refs")?,
        first_ref(object, "virtual_network_refs")?,
        mac,
        annotation_parse(object, "ip"),
        annotation_parse(object, "external_ipam").unwrap_or(false),
    );
    iface.id = uuid_field(object)?;
    Some(iface)
}

/// Address of an `instance-ip` object, wrapped or bare
pub fn parse_instance_ip_address(response: &Value) -> Option<IpAddr> {
    let object = response.get(resource(ObjectKind::InstanceIp)).unwrap_or(response);
    object["instance_ip_address"].as_str()?.parse().ok()
}

/// Prefix length of a netmask (count of leading one bits)
pub fn prefix_len(netmask: IpAddr) -> u32 {
    match netmask {
        IpAddr::V4(mask) => u32::from(mask).leading_ones(),
        IpAddr::V6(mask) => u128::from(mask).leading_ones(),
    }
}

/// Allocation pool from a `start#count` range
pub fn allocation_pool(range: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let (start, count) = range.split_once('#')?;
    let start: Ipv4Addr = start.trim().parse().ok()?;
    let count: u32 = count.trim().parse().ok()?;
    if count == 0 {
        return None;
    }
    let end = u32::from(start).checked_add(count - 1)?;
    Some((start, Ipv4Addr::from(end)))
}
