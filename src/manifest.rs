//! Desired-state manifest
//!
//! One TOML array of tables per entity kind:
//!
//! ```toml
//! [[distro]]
//! name = "ubuntu-24.04"
//! kernel = "/srv/ubuntu/vmlinuz"
//! initrd = "/srv/ubuntu/initrd.gz"
//! kernel_options_inherit = true
//!
//! [[system]]
//! name = "node01"
//! profile = "ubuntu-server"
//!
//! [[system.interface]]
//! name = "eth0"
//! mac_address = "aa:bb:cc:dd:ee:01"
//! ```

use crate::config::expand_path;
use anyhow::{Context, Result, bail};
use reconcile::{AttrValue, EntityKind, Interface, ResourceData};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use toml::{Table, Value};

/// Key of the nested interface tables of a system
const INTERFACE_KEY: &str = "interface";

/// Entities declared in a manifest, in dependency order
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entities: Vec<ResourceData>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base_dir)
            .with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    /// Parse manifest text. Relative `body` paths resolve against `base_dir`.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let mut table: Table = toml::from_str(content)?;

        if let Some(unknown) = table
            .keys()
            .find(|key| !EntityKind::ALL.iter().any(|kind| kind.as_str() == key.as_str()))
        {
            bail!("unknown section [[{unknown}]]");
        }

        let mut entities = Vec::new();
        for kind in EntityKind::ALL {
            let Some(section) = table.remove(kind.as_str()) else {
                continue;
            };
            let Value::Array(items) = section else {
                bail!("'{kind}' must be an array of tables ([[{kind}]])");
            };

            let mut seen = BTreeSet::new();
            for (index, item) in items.into_iter().enumerate() {
                let Value::Table(item) = item else {
                    bail!("{kind} #{} is not a table", index + 1);
                };
                let data = parse_entity(kind, item, base_dir)
                    .with_context(|| format!("{kind} #{}", index + 1))?;
                if !seen.insert(data.name.clone()) {
                    bail!("duplicate {kind} '{}'", data.name);
                }
                entities.push(data);
            }
        }

        // Parent profiles are created before the profiles that name them
        let depths = profile_depths(&entities);
        entities.sort_by_key(|e| (e.kind, depth_of(&depths, e)));

        Ok(Self { entities })
    }

    pub fn contains(&self, kind: EntityKind, name: &str) -> bool {
        self.entities
            .iter()
            .any(|e| e.kind == kind && e.name == name)
    }
}

/// Depth of `record` in `depths`, 0 for anything but a profile
pub fn depth_of(depths: &BTreeMap<String, usize>, record: &ResourceData) -> usize {
    if record.kind == EntityKind::Profile {
        depths.get(&record.name).copied().unwrap_or(0)
    } else {
        0
    }
}

/// How many ancestors each profile in `records` has among `records`,
/// following `parent`.
pub fn profile_depths(records: &[ResourceData]) -> BTreeMap<String, usize> {
    let profiles: Vec<&ResourceData> = records
        .iter()
        .filter(|r| r.kind == EntityKind::Profile)
        .collect();
    let parents: BTreeMap<&str, Option<&str>> = profiles
        .iter()
        .map(|r| (r.name.as_str(), r.get("parent").and_then(AttrValue::as_str)))
        .collect();

    profiles
        .iter()
        .map(|r| {
            let mut depth = 0;
            let mut current = r.name.as_str();
            // Bounded so a parent cycle cannot loop forever
            while depth < profiles.len() {
                match parents.get(current).copied().flatten() {
                    Some(parent) if parents.contains_key(parent) => {
                        depth += 1;
                        current = parent;
                    }
                    _ => break,
                }
            }
            (r.name.clone(), depth)
        })
        .collect()
}

fn parse_entity(kind: EntityKind, mut item: Table, base_dir: &Path) -> Result<ResourceData> {
    let name = match item.remove("name") {
        Some(Value::String(name)) if !name.is_empty() => name,
        Some(Value::String(_)) => bail!("name must not be empty"),
        Some(other) => bail!("name must be a string, got {}", other.type_str()),
        None => bail!("missing name"),
    };
    let mut data = ResourceData::new(kind, name);

    if let Some(interfaces) = item.remove(INTERFACE_KEY) {
        if kind != EntityKind::System {
            bail!("{} '{}': only systems have interfaces", kind, data.name);
        }
        data.interfaces = parse_interfaces(interfaces)
            .with_context(|| format!("system '{}'", data.name))?;
    }

    for (key, value) in item {
        let value = attr_value(&value).with_context(|| format!("{kind} '{}': {key}", data.name))?;
        data.attributes.insert(key, value);
    }

    if matches!(kind, EntityKind::Snippet | EntityKind::TemplateFile) {
        resolve_body(&mut data, base_dir)?;
    }
    Ok(data)
}

fn parse_interfaces(value: Value) -> Result<Vec<Interface>> {
    let Value::Array(items) = value else {
        bail!("interfaces must be written as [[system.interface]] tables");
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            item.try_into::<Interface>()
                .with_context(|| format!("interface #{}", index + 1))
        })
        .collect()
}

fn attr_value(value: &Value) -> Result<AttrValue> {
    Ok(match value {
        Value::String(s) => AttrValue::Str(s.clone()),
        Value::Integer(i) => AttrValue::Int(*i),
        Value::Boolean(b) => AttrValue::Bool(*b),
        Value::Array(items) => AttrValue::List(items.iter().map(attr_value).collect::<Result<_>>()?),
        Value::Table(table) => AttrValue::Map(
            table
                .iter()
                .map(|(k, v)| Ok((k.clone(), attr_value(v)?)))
                .collect::<Result<_>>()?,
        ),
        Value::Float(_) | Value::Datetime(_) => {
            bail!("{} values are not supported, quote it", value.type_str())
        }
    })
}

/// A body naming an existing file is replaced by that file's contents.
fn resolve_body(data: &mut ResourceData, base_dir: &Path) -> Result<()> {
    let Some(AttrValue::Str(body)) = data.attributes.get("body") else {
        return Ok(());
    };
    // Multi-line values are always contents
    if body.contains('\n') {
        return Ok(());
    }

    let path = base_dir.join(expand_path(body.trim()));
    if !path.is_file() {
        return Ok(());
    }
    let contents = fs::read_to_string(&path).with_context(|| {
        format!(
            "{} '{}': could not read body from {}",
            data.kind,
            data.name,
            path.display()
        )
    })?;
    log::debug!("{} '{}' body read from {}", data.kind, data.name, path.display());
    data.attributes
        .insert("body".to_string(), AttrValue::Str(contents));
    Ok(())
}
