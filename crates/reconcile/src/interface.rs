//! Network interfaces of a system and the set differ
//!
//! The remote API has no bulk "set interfaces" call. Interfaces are
//! upserted and deleted one by one against a system handle, so a change of
//! the desired set has to be broken down into individual calls.

use crate::client::{RemoteClient, SystemHandle};
use crate::error::{Error, Result};
use crate::types::Target;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Bonding or bridging role of an interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    #[default]
    #[serde(rename = "NA")]
    Na,
    Master,
    Slave,
    Bond,
    BondSlave,
    Bridge,
    BridgeSlave,
    BondedBridgeSlave,
    Infiniband,
    Bmc,
}

impl InterfaceType {
    pub const ALL: [InterfaceType; 10] = [
        Self::Na,
        Self::Master,
        Self::Slave,
        Self::Bond,
        Self::BondSlave,
        Self::Bridge,
        Self::BridgeSlave,
        Self::BondedBridgeSlave,
        Self::Infiniband,
        Self::Bmc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Na => "NA",
            Self::Master => "master",
            Self::Slave => "slave",
            Self::Bond => "bond",
            Self::BondSlave => "bond_slave",
            Self::Bridge => "bridge",
            Self::BridgeSlave => "bridge_slave",
            Self::BondedBridgeSlave => "bonded_bridge_slave",
            Self::Infiniband => "infiniband",
            Self::Bmc => "bmc",
        }
    }
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterfaceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // The server reports an unset type as an empty string
        if s.is_empty() {
            return Ok(Self::Na);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<_> = Self::ALL.iter().map(Self::as_str).collect();
                format!(
                    "invalid interface_type '{s}', expected one of: {}",
                    valid.join(", ")
                )
            })
    }
}

/// A network interface of a system, keyed by its device name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Interface {
    pub name: String,
    pub cnames: Vec<String>,
    pub dhcp_tag: String,
    pub dns_name: String,
    pub bonding_opts: String,
    pub bridge_opts: String,
    pub gateway: String,
    pub interface_type: InterfaceType,
    pub interface_master: String,
    pub ip_address: String,
    pub ipv6_address: String,
    pub ipv6_secondaries: Vec<String>,
    pub ipv6_mtu: String,
    pub ipv6_static_routes: Vec<String>,
    pub ipv6_default_gateway: String,
    pub mac_address: String,
    pub management: bool,
    pub netmask: String,
    /// Static addressing instead of DHCP
    #[serde(rename = "static")]
    pub is_static: bool,
    pub static_routes: Vec<String>,
    pub virt_bridge: String,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = mac.into();
        self
    }

    /// Static IPv4 address
    pub fn with_static_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = ip.into();
        self.is_static = true;
        self
    }

    /// Set-membership identity used by [`DiffPolicy::Compatible`]
    fn identity(&self) -> (&str, &str) {
        (&self.name, &self.mac_address)
    }

    /// Copy of `self` restricted to the settings `declared` sets.
    ///
    /// A setting `declared` leaves empty takes the empty value, so whatever
    /// the server fills in for it (a default bridge, a DNS name) never
    /// reads as drift. Flags are always compared.
    pub fn masked_by(&self, declared: &Self) -> Self {
        fn text(value: &str, declared: &str) -> String {
            if declared.is_empty() {
                String::new()
            } else {
                value.to_string()
            }
        }
        fn list(value: &[String], declared: &[String]) -> Vec<String> {
            if declared.is_empty() {
                Vec::new()
            } else {
                value.to_vec()
            }
        }

        Self {
            name: self.name.clone(),
            cnames: list(&self.cnames, &declared.cnames),
            dhcp_tag: text(&self.dhcp_tag, &declared.dhcp_tag),
            dns_name: text(&self.dns_name, &declared.dns_name),
            bonding_opts: text(&self.bonding_opts, &declared.bonding_opts),
            bridge_opts: text(&self.bridge_opts, &declared.bridge_opts),
            gateway: text(&self.gateway, &declared.gateway),
            interface_type: if declared.interface_type == InterfaceType::default() {
                InterfaceType::default()
            } else {
                self.interface_type
            },
            interface_master: text(&self.interface_master, &declared.interface_master),
            ip_address: text(&self.ip_address, &declared.ip_address),
            ipv6_address: text(&self.ipv6_address, &declared.ipv6_address),
            ipv6_secondaries: list(&self.ipv6_secondaries, &declared.ipv6_secondaries),
            ipv6_mtu: text(&self.ipv6_mtu, &declared.ipv6_mtu),
            ipv6_static_routes: list(&self.ipv6_static_routes, &declared.ipv6_static_routes),
            ipv6_default_gateway: text(&self.ipv6_default_gateway, &declared.ipv6_default_gateway),
            mac_address: text(&self.mac_address, &declared.mac_address),
            management: self.management,
            netmask: text(&self.netmask, &declared.netmask),
            is_static: self.is_static,
            static_routes: list(&self.static_routes, &declared.static_routes),
            virt_bridge: text(&self.virt_bridge, &declared.virt_bridge),
        }
    }
}

/// Check that interface names are non-empty and unique.
pub fn validate(interfaces: &[Interface], system: &Target) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (i, interface) in interfaces.iter().enumerate() {
        if interface.name.trim().is_empty() {
            return Err(Error::validation(
                system.clone(),
                format!("interface {i} has no name"),
            ));
        }
        if !seen.insert(interface.name.as_str()) {
            return Err(Error::validation(
                system.clone(),
                format!("duplicate interface '{}'", interface.name),
            ));
        }
    }
    Ok(())
}

/// Whether two interface sets are equal, ignoring order.
pub fn same_interfaces(a: &[Interface], b: &[Interface]) -> bool {
    a.len() == b.len() && by_name(a) == by_name(b)
}

fn by_name(set: &[Interface]) -> BTreeMap<&str, &Interface> {
    set.iter().map(|i| (i.name.as_str(), i)).collect()
}

/// Shape a read interface set like `declared`.
///
/// Interfaces `declared` names are masked to its settings, and the set is
/// ordered like `declared`. Interfaces only the server has stay untouched,
/// so they still count as drift.
pub fn project(current: Vec<Interface>, declared: &[Interface]) -> Vec<Interface> {
    let declared_by_name = by_name(declared);
    let masked = current
        .into_iter()
        .map(|i| match declared_by_name.get(i.name.as_str()) {
            Some(d) => i.masked_by(d),
            None => i,
        })
        .collect();
    order_like(masked, declared)
}

/// Order `current` like `reference`, with unknown names last by name.
pub fn order_like(mut current: Vec<Interface>, reference: &[Interface]) -> Vec<Interface> {
    let position = |name: &str| reference.iter().position(|i| i.name == name);
    current.sort_by(|a, b| match (position(&a.name), position(&b.name)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
    current
}

/// How the differ decides which interfaces to touch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffPolicy {
    /// Identity over (name, MAC). Any change to the set upserts every
    /// interface in the new set.
    #[default]
    Compatible,
    /// Identity by name. Only new or modified interfaces are upserted.
    ByName,
}

impl DiffPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compatible => "compatible",
            Self::ByName => "by_name",
        }
    }
}

impl fmt::Display for DiffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiffPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "compatible" => Ok(Self::Compatible),
            "by_name" | "name" => Ok(Self::ByName),
            other => Err(format!(
                "unknown interface policy '{other}', expected 'compatible' or 'by_name'"
            )),
        }
    }
}

/// The calls needed to move a system from one interface set to another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceDiff {
    /// Old entries with no counterpart in the new set
    pub to_remove: Vec<Interface>,
    /// Entries to push to the server
    pub to_upsert: Vec<Interface>,
    /// Interface names to delete: removed entries whose name is gone
    pub deletes: Vec<String>,
}

impl InterfaceDiff {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.to_upsert.is_empty()
    }

    /// Issue the calls against `handle`: every delete first, then every upsert.
    ///
    /// Stops at the first failure. Calls already made are not undone.
    pub fn apply(
        &self,
        client: &dyn RemoteClient,
        handle: &SystemHandle,
        system: &Target,
    ) -> Result<()> {
        for name in &self.deletes {
            log::info!("{system}: deleting interface '{name}'");
            client
                .delete_interface(handle, name)
                .map_err(|e| interface_error(system, &format!("delete interface '{name}'"), &e))?;
        }
        for interface in &self.to_upsert {
            log::info!("{system}: writing interface '{}'", interface.name);
            client.create_interface(handle, interface).map_err(|e| {
                interface_error(system, &format!("write interface '{}'", interface.name), &e)
            })?;
        }
        Ok(())
    }
}

fn interface_error(system: &Target, operation: &str, err: &crate::error::ClientError) -> Error {
    Error::RemoteCall {
        target: system.clone(),
        operation: operation.to_string(),
        message: err.to_string(),
    }
}

/// Partition the change from `old` to `new` into removals and upserts.
pub fn diff(old: &[Interface], new: &[Interface], policy: DiffPolicy) -> InterfaceDiff {
    let new_names: BTreeSet<&str> = new.iter().map(|i| i.name.as_str()).collect();

    let (to_remove, to_upsert) = match policy {
        DiffPolicy::Compatible => {
            if same_interfaces(old, new) {
                return InterfaceDiff::default();
            }
            let new_ids: BTreeSet<(&str, &str)> = new.iter().map(Interface::identity).collect();
            let to_remove: Vec<Interface> = old
                .iter()
                .filter(|i| !new_ids.contains(&i.identity()))
                .cloned()
                .collect();
            (to_remove, new.to_vec())
        }
        DiffPolicy::ByName => {
            let old_by_name = by_name(old);
            let to_remove: Vec<Interface> = old
                .iter()
                .filter(|i| !new_names.contains(i.name.as_str()))
                .cloned()
                .collect();
            let to_upsert: Vec<Interface> = new
                .iter()
                .filter(|i| old_by_name.get(i.name.as_str()).copied() != Some(*i))
                .cloned()
                .collect();
            (to_remove, to_upsert)
        }
    };

    // A removed entry whose name lives on is overwritten by its upsert
    let deletes = to_remove
        .iter()
        .filter(|i| !new_names.contains(i.name.as_str()))
        .map(|i| i.name.clone())
        .collect();

    InterfaceDiff {
        to_remove,
        to_upsert,
        deletes,
    }
}
