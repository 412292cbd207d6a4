//! Mapping between reconcile values and Cobbler's wire representation.

use crate::error::{Error, Result};
use crate::xmlrpc::Value;
use reconcile::{AttrValue, EntityKind, FieldKind, Inheritable, Interface, RemoteEntity};
use std::collections::BTreeMap;

/// Marker Cobbler stores for a field that defers to its parent
pub const INHERIT: &str = "<<inherit>>";

/// Encode one field for `modify_<kind>`.
pub fn encode_field(value: &Inheritable<AttrValue>) -> Value {
    match value {
        Inheritable::Inherited { .. } => Value::from(INHERIT),
        Inheritable::Explicit(v) => encode_attr(v),
    }
}

fn encode_attr(value: &AttrValue) -> Value {
    match value {
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Int(i) => Value::Int(*i),
        AttrValue::Str(s) => Value::Str(s.clone()),
        AttrValue::List(items) => Value::Array(items.iter().map(encode_attr).collect()),
        AttrValue::Map(entries) => Value::Struct(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), encode_attr(v)))
                .collect(),
        ),
    }
}

/// Decode a field read back from Cobbler.
pub fn decode_field(kind: FieldKind, value: &Value) -> Result<Inheritable<AttrValue>> {
    if value.as_str() == Some(INHERIT) {
        return Ok(Inheritable::inherited());
    }
    decode_attr(kind, value).map(Inheritable::Explicit)
}

fn decode_attr(kind: FieldKind, value: &Value) -> Result<AttrValue> {
    let mismatch = || {
        Error::decode(format!(
            "expected {}, got {}",
            kind.describe(),
            value.type_name()
        ))
    };

    match kind {
        FieldKind::Str => Ok(AttrValue::Str(scalar_text(value).ok_or_else(mismatch)?)),
        FieldKind::Int => match value {
            Value::Int(i) => Ok(AttrValue::Int(*i)),
            Value::Str(s) if s.is_empty() => Ok(AttrValue::Int(0)),
            Value::Str(s) => s.trim().parse().map(AttrValue::Int).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(AttrValue::Bool(*b)),
            Value::Int(i) => Ok(AttrValue::Bool(*i != 0)),
            Value::Str(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(AttrValue::Bool(true)),
                "false" | "no" | "0" | "" => Ok(AttrValue::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        FieldKind::StrList => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_text(item).map(AttrValue::Str).ok_or_else(mismatch))
                .collect::<Result<Vec<_>>>()
                .map(AttrValue::List),
            // Older servers flatten lists to space separated strings
            Value::Str(s) => Ok(AttrValue::str_list(s.split_whitespace())),
            Value::Nil => Ok(AttrValue::List(Vec::new())),
            _ => Err(mismatch()),
        },
        FieldKind::StrMap => match value {
            Value::Struct(members) => members
                .iter()
                .map(|(k, v)| {
                    scalar_text(v)
                        .map(|s| (k.clone(), AttrValue::Str(s)))
                        .ok_or_else(mismatch)
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(AttrValue::Map),
            Value::Str(s) if s.is_empty() => Ok(AttrValue::Map(BTreeMap::new())),
            Value::Nil => Ok(AttrValue::Map(BTreeMap::new())),
            _ => Err(mismatch()),
        },
    }
}

/// Text of a scalar; `None` for arrays and structs.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(d.to_string()),
        Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        // Flag-style kernel options like `quiet` carry no value
        Value::Nil => Some(String::new()),
        Value::Array(_) | Value::Struct(_) => None,
    }
}

/// Decode the fields of an item struct returned by `get_<kind>`.
pub fn decode_entity(
    kind: EntityKind,
    name: &str,
    members: &BTreeMap<String, Value>,
) -> Result<RemoteEntity> {
    let mut entity = RemoteEntity::new(kind, name);
    for spec in kind.fields() {
        let Some(value) = members.get(spec.name) else {
            continue;
        };
        let decoded = decode_field(spec.kind, value).map_err(|e| {
            Error::decode(format!("{kind} '{name}' field '{}': {e}", spec.name))
        })?;
        entity.fields.insert(spec.name.to_string(), decoded);
    }
    Ok(entity)
}

/// Interface attribute: the key Cobbler reports and the key it accepts in
/// `modify_interface`
struct InterfaceField {
    read: &'static str,
    write: &'static str,
}

const fn iface(read: &'static str, write: &'static str) -> InterfaceField {
    InterfaceField { read, write }
}

const MAC: InterfaceField = iface("mac_address", "macaddress");
const IP: InterfaceField = iface("ip_address", "ipaddress");
const NETMASK: InterfaceField = iface("netmask", "netmask");
const GATEWAY: InterfaceField = iface("if_gateway", "if_gateway");
const STATIC: InterfaceField = iface("static", "static");
const MANAGEMENT: InterfaceField = iface("management", "management");
const DNS_NAME: InterfaceField = iface("dns_name", "dnsname");
const CNAMES: InterfaceField = iface("cnames", "cnames");
const DHCP_TAG: InterfaceField = iface("dhcp_tag", "dhcptag");
const BONDING_OPTS: InterfaceField = iface("bonding_opts", "bondingopts");
const BRIDGE_OPTS: InterfaceField = iface("bridge_opts", "bridgeopts");
const TYPE: InterfaceField = iface("interface_type", "interfacetype");
const MASTER: InterfaceField = iface("interface_master", "interfacemaster");
const IPV6: InterfaceField = iface("ipv6_address", "ipv6address");
const IPV6_SECONDARIES: InterfaceField = iface("ipv6_secondaries", "ipv6secondaries");
const IPV6_MTU: InterfaceField = iface("ipv6_mtu", "ipv6mtu");
const IPV6_ROUTES: InterfaceField = iface("ipv6_static_routes", "ipv6staticroutes");
const IPV6_GATEWAY: InterfaceField = iface("ipv6_default_gateway", "ipv6defaultgateway");
const STATIC_ROUTES: InterfaceField = iface("static_routes", "staticroutes");
const VIRT_BRIDGE: InterfaceField = iface("virt_bridge", "virtbridge");

/// Build the `modify_interface` argument for one interface.
///
/// Every key is suffixed with the device name, e.g. `macaddress-eth0`.
pub fn encode_interface(interface: &Interface) -> Value {
    let mut members = BTreeMap::new();
    let mut put = |field: &InterfaceField, value: Value| {
        members.insert(format!("{}-{}", field.write, interface.name), value);
    };
    let list = |items: &[String]| Value::Array(items.iter().cloned().map(Value::Str).collect());

    put(&MAC, Value::from(interface.mac_address.as_str()));
    put(&IP, Value::from(interface.ip_address.as_str()));
    put(&NETMASK, Value::from(interface.netmask.as_str()));
    put(&GATEWAY, Value::from(interface.gateway.as_str()));
    put(&STATIC, Value::Bool(interface.is_static));
    put(&MANAGEMENT, Value::Bool(interface.management));
    put(&DNS_NAME, Value::from(interface.dns_name.as_str()));
    put(&CNAMES, list(&interface.cnames));
    put(&DHCP_TAG, Value::from(interface.dhcp_tag.as_str()));
    put(&BONDING_OPTS, Value::from(interface.bonding_opts.as_str()));
    put(&BRIDGE_OPTS, Value::from(interface.bridge_opts.as_str()));
    put(&TYPE, Value::from(interface.interface_type.as_str()));
    put(&MASTER, Value::from(interface.interface_master.as_str()));
    put(&IPV6, Value::from(interface.ipv6_address.as_str()));
    put(&IPV6_SECONDARIES, list(&interface.ipv6_secondaries));
    put(&IPV6_MTU, Value::from(interface.ipv6_mtu.as_str()));
    put(&IPV6_ROUTES, list(&interface.ipv6_static_routes));
    put(&IPV6_GATEWAY, Value::from(interface.ipv6_default_gateway.as_str()));
    put(&STATIC_ROUTES, list(&interface.static_routes));
    put(&VIRT_BRIDGE, Value::from(interface.virt_bridge.as_str()));
    Value::Struct(members)
}

/// Decode the `interfaces` struct of a system.
pub fn decode_interfaces(value: &Value) -> Result<BTreeMap<String, Interface>> {
    let members = value
        .as_struct()
        .ok_or_else(|| Error::decode("system interfaces are not a struct"))?;

    let mut interfaces = BTreeMap::new();
    for (name, fields) in members {
        let fields = fields
            .as_struct()
            .ok_or_else(|| Error::decode(format!("interface '{name}' is not a struct")))?;
        let text = |field: &InterfaceField| {
            fields
                .get(field.read)
                .and_then(scalar_text)
                .unwrap_or_default()
        };
        let list = |field: &InterfaceField| -> Vec<String> {
            match fields.get(field.read) {
                Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
                Some(Value::Str(s)) => s.split_whitespace().map(str::to_string).collect(),
                _ => Vec::new(),
            }
        };
        let flag = |field: &InterfaceField| match fields.get(field.read) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(i)) => *i != 0,
            Some(Value::Str(s)) => matches!(s.to_lowercase().as_str(), "true" | "yes" | "1"),
            _ => false,
        };

        let interface = Interface {
            name: name.clone(),
            cnames: list(&CNAMES),
            dhcp_tag: text(&DHCP_TAG),
            dns_name: text(&DNS_NAME),
            bonding_opts: text(&BONDING_OPTS),
            bridge_opts: text(&BRIDGE_OPTS),
            gateway: text(&GATEWAY),
            interface_type: text(&TYPE)
                .parse()
                .map_err(|e| Error::decode(format!("interface '{name}': {e}")))?,
            interface_master: text(&MASTER),
            ip_address: text(&IP),
            ipv6_address: text(&IPV6),
            ipv6_secondaries: list(&IPV6_SECONDARIES),
            ipv6_mtu: text(&IPV6_MTU),
            ipv6_static_routes: list(&IPV6_ROUTES),
            ipv6_default_gateway: text(&IPV6_GATEWAY),
            mac_address: text(&MAC),
            management: flag(&MANAGEMENT),
            netmask: text(&NETMASK),
            is_static: flag(&STATIC),
            static_routes: list(&STATIC_ROUTES),
            virt_bridge: text(&VIRT_BRIDGE),
        };
        interfaces.insert(name.clone(), interface);
    }
    Ok(interfaces)
}
