//! Entity kinds and their field tables
//!
//! Each kind is described by a static table of [`FieldSpec`]s. The builder
//! and the reconciler are generic over these tables, so adding a field is a
//! one-line change here.

use crate::types::AttrValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of provisioning entity owned by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Distro,
    Repo,
    Snippet,
    TemplateFile,
    Profile,
    System,
}

impl EntityKind {
    /// All kinds, in the order a fresh environment must be built.
    ///
    /// Profiles reference distros and repos, systems reference profiles.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Distro,
        EntityKind::Repo,
        EntityKind::Snippet,
        EntityKind::TemplateFile,
        EntityKind::Profile,
        EntityKind::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Distro => "distro",
            Self::Repo => "repo",
            Self::Snippet => "snippet",
            Self::TemplateFile => "template_file",
            Self::Profile => "profile",
            Self::System => "system",
        }
    }

    /// Field table for this kind (without `name`, which every kind has)
    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Self::Distro => DISTRO_FIELDS,
            Self::Repo => REPO_FIELDS,
            Self::Snippet | Self::TemplateFile => BODY_FIELDS,
            Self::Profile => PROFILE_FIELDS,
            Self::System => SYSTEM_FIELDS,
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Groups of fields where at least one member must be present
    pub fn requires_one_of(&self) -> &'static [&'static str] {
        match self {
            Self::Profile => &["distro", "parent"],
            Self::System => &["profile", "image"],
            _ => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "distro" => Ok(Self::Distro),
            "repo" => Ok(Self::Repo),
            "snippet" => Ok(Self::Snippet),
            "template_file" | "template" => Ok(Self::TemplateFile),
            "profile" => Ok(Self::Profile),
            "system" => Ok(Self::System),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Shape of a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    Int,
    Bool,
    /// Ordered sequence of strings
    StrList,
    /// String-to-string mapping
    StrMap,
}

impl FieldKind {
    /// The value written to desired state for an inherited field
    pub fn zero(&self) -> AttrValue {
        match self {
            Self::Str => AttrValue::Str(String::new()),
            Self::Int => AttrValue::Int(0),
            Self::Bool => AttrValue::Bool(false),
            Self::StrList => AttrValue::List(Vec::new()),
            Self::StrMap => AttrValue::Map(BTreeMap::new()),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Int => "integer",
            Self::Bool => "boolean",
            Self::StrList => "list of strings",
            Self::StrMap => "map of strings",
        }
    }

    /// Check that `value` has this shape, describing the first mismatch.
    pub fn check(&self, value: &AttrValue) -> Result<(), String> {
        match (self, value) {
            (Self::Str, AttrValue::Str(_))
            | (Self::Int, AttrValue::Int(_))
            | (Self::Bool, AttrValue::Bool(_)) => Ok(()),
            (Self::StrList, AttrValue::List(items)) => {
                match items.iter().position(|v| !matches!(v, AttrValue::Str(_))) {
                    None => Ok(()),
                    Some(i) => Err(format!(
                        "element {i} is a {}, expected a string",
                        items[i].type_name()
                    )),
                }
            }
            (Self::StrMap, AttrValue::Map(entries)) => {
                match entries.iter().find(|(_, v)| !matches!(v, AttrValue::Str(_))) {
                    None => Ok(()),
                    Some((k, v)) => Err(format!(
                        "entry '{k}' is a {}, expected a string",
                        v.type_name()
                    )),
                }
            }
            _ => Err(format!(
                "expected {}, got {}",
                self.describe(),
                value.type_name()
            )),
        }
    }
}

/// One row of a field table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Field may defer to the parent entity (has an `<name>_inherit` flag)
    pub inherit: bool,
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        inherit: false,
        required: false,
    }
}

const fn inheritable(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        inherit: true,
        required: false,
    }
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        inherit: false,
        required: true,
    }
}

use FieldKind::{Bool, Int, Str, StrList, StrMap};

static DISTRO_FIELDS: &[FieldSpec] = &[
    field("arch", Str),
    field("breed", Str),
    inheritable("boot_files", StrMap),
    inheritable("boot_loaders", StrList),
    field("comment", Str),
    inheritable("fetchable_files", StrMap),
    required("initrd", Str),
    required("kernel", Str),
    inheritable("kernel_options", StrMap),
    inheritable("kernel_options_post", StrMap),
    inheritable("mgmt_classes", StrList),
    field("os_version", Str),
    inheritable("owners", StrList),
    field("remote_boot_initrd", Str),
    field("remote_boot_kernel", Str),
    inheritable("template_files", StrMap),
];

static REPO_FIELDS: &[FieldSpec] = &[
    field("apt_components", StrList),
    field("apt_dists", StrList),
    field("arch", Str),
    field("breed", Str),
    field("comment", Str),
    inheritable("createrepo_flags", Str),
    field("environment", StrMap),
    field("keep_updated", Bool),
    required("mirror", Str),
    field("mirror_locally", Bool),
    inheritable("owners", StrList),
    inheritable("proxy", Str),
    field("rpm_list", StrList),
];

static BODY_FIELDS: &[FieldSpec] = &[required("body", Str)];

static PROFILE_FIELDS: &[FieldSpec] = &[
    field("autoinstall", Str),
    inheritable("autoinstall_meta", StrMap),
    inheritable("boot_files", StrMap),
    field("comment", Str),
    field("dhcp_tag", Str),
    field("distro", Str),
    field("enable_gpxe", Bool),
    field("enable_menu", Bool),
    inheritable("fetchable_files", StrMap),
    inheritable("kernel_options", StrMap),
    inheritable("kernel_options_post", StrMap),
    inheritable("mgmt_classes", StrList),
    field("mgmt_parameters", Str),
    inheritable("name_servers", StrList),
    inheritable("name_servers_search", StrList),
    field("next_server_v4", Str),
    field("next_server_v6", Str),
    inheritable("owners", StrList),
    field("parent", Str),
    field("proxy", Str),
    field("repos", StrList),
    field("server", Str),
    inheritable("template_files", StrMap),
    field("virt_auto_boot", Str),
    field("virt_bridge", Str),
    field("virt_cpus", Str),
    field("virt_disk_driver", Str),
    field("virt_file_size", Str),
    field("virt_path", Str),
    field("virt_ram", Str),
    field("virt_type", Str),
];

static SYSTEM_FIELDS: &[FieldSpec] = &[
    field("autoinstall", Str),
    inheritable("autoinstall_meta", StrMap),
    inheritable("boot_files", StrMap),
    inheritable("boot_loaders", StrList),
    field("comment", Str),
    field("enable_gpxe", Bool),
    inheritable("fetchable_files", StrMap),
    field("gateway", Str),
    field("hostname", Str),
    field("image", Str),
    field("ipv6_default_device", Str),
    inheritable("kernel_options", StrMap),
    inheritable("kernel_options_post", StrMap),
    inheritable("mgmt_classes", StrList),
    field("mgmt_parameters", Str),
    inheritable("name_servers", StrList),
    inheritable("name_servers_search", StrList),
    field("netboot_enabled", Bool),
    field("next_server_v4", Str),
    field("next_server_v6", Str),
    inheritable("owners", StrList),
    field("power_address", Str),
    field("power_id", Str),
    field("power_pass", Str),
    field("power_type", Str),
    field("power_user", Str),
    field("profile", Str),
    field("proxy", Str),
    field("status", Str),
    inheritable("template_files", StrMap),
    field("virt_auto_boot", Str),
    field("virt_cpus", Str),
    field("virt_disk_driver", Str),
    field("virt_file_size", Str),
    field("virt_path", Str),
    field("virt_pxe_boot", Int),
    field("virt_ram", Str),
    field("virt_type", Str),
];

/// What to do when a read finds the entity missing remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Report `NotFound`
    Fail,
    /// Treat as deleted outside this tool and drop the record
    Drop,
}

/// Per-kind reconciliation behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindBehavior {
    /// Read the entity back after create/update. Without it the submitted
    /// state is trusted as authoritative.
    pub reads_back: bool,
    pub missing_on_read: MissingPolicy,
    /// Mutations must run under the sync lock and end with a sync
    pub syncs: bool,
    pub has_interfaces: bool,
}

impl KindBehavior {
    pub fn default_for(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Distro | EntityKind::Repo | EntityKind::Profile => Self {
                reads_back: true,
                missing_on_read: MissingPolicy::Fail,
                syncs: false,
                has_interfaces: false,
            },
            EntityKind::Snippet | EntityKind::TemplateFile => Self {
                reads_back: false,
                missing_on_read: MissingPolicy::Fail,
                syncs: false,
                has_interfaces: false,
            },
            EntityKind::System => Self {
                reads_back: true,
                missing_on_read: MissingPolicy::Drop,
                syncs: true,
                has_interfaces: true,
            },
        }
    }
}

/// Behaviour table for all kinds, with overrides
#[derive(Debug, Clone)]
pub struct Behaviors {
    table: BTreeMap<EntityKind, KindBehavior>,
}

impl Behaviors {
    pub fn get(&self, kind: EntityKind) -> KindBehavior {
        self.table
            .get(&kind)
            .copied()
            .unwrap_or_else(|| KindBehavior::default_for(kind))
    }

    /// Override the behaviour of one kind
    pub fn set(&mut self, kind: EntityKind, behavior: KindBehavior) {
        self.table.insert(kind, behavior);
    }

    /// Read template files back after writing them
    pub fn with_template_read_back(mut self, enabled: bool) -> Self {
        let mut behavior = self.get(EntityKind::TemplateFile);
        behavior.reads_back = enabled;
        self.set(EntityKind::TemplateFile, behavior);
        self
    }
}

impl Default for Behaviors {
    fn default() -> Self {
        Self {
            table: EntityKind::ALL
                .iter()
                .map(|k| (*k, KindBehavior::default_for(*k)))
                .collect(),
        }
    }
}
