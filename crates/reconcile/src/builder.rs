//! Translation between desired state and remote entities
//!
//! [`build`] turns a desired-state record into the entity submitted to the
//! remote service. [`translate`] and [`project`] go the other way, so that
//! a read comes back in the same shape the caller declared.

use crate::client::{RemoteEntity, RemoteFields};
use crate::error::{Error, Result};
use crate::inherit::{Inheritable, is_option_inherited};
use crate::interface::{self, Interface};
use crate::schema::{EntityKind, FieldSpec};
use crate::types::{AttrValue, INHERIT_SUFFIX, ResourceData, inherit_key};

/// Build the remote entity for `desired`.
///
/// `prior` is the last reconciled record, if the entity is already
/// managed. It supplies stored inherit flags and values for optional
/// fields the desired state leaves out.
pub fn build(desired: &ResourceData, prior: Option<&ResourceData>) -> Result<RemoteEntity> {
    let target = desired.target();
    let kind = desired.kind;

    if desired.name.trim().is_empty() {
        return Err(Error::validation(target, "name is required"));
    }
    check_keys(desired)?;

    let mut fields = RemoteFields::new();
    for spec in kind.fields() {
        if let Some(value) = resolve_field(spec, desired, prior) {
            fields.insert(spec.name.to_string(), value);
        }
    }

    for spec in kind.fields().iter().filter(|f| f.required) {
        if !fields.contains_key(spec.name) {
            return Err(Error::validation(
                target,
                format!("missing required field '{}'", spec.name),
            ));
        }
    }

    let one_of = kind.requires_one_of();
    if !one_of.is_empty() && !one_of.iter().any(|f| fields.contains_key(*f)) {
        return Err(Error::validation(
            target,
            format!("one of {} is required", one_of.join(", ")),
        ));
    }

    if !desired.interfaces.is_empty() {
        if kind != EntityKind::System {
            return Err(Error::validation(target, "only systems have interfaces"));
        }
        interface::validate(&desired.interfaces, &target)?;
    }

    log::debug!("built {target} with {} fields", fields.len());
    Ok(RemoteEntity {
        kind,
        name: desired.name.clone(),
        fields,
    })
}

/// Reject unknown keys and values of the wrong shape.
fn check_keys(desired: &ResourceData) -> Result<()> {
    let kind = desired.kind;
    for (key, value) in &desired.attributes {
        if let Some(spec) = kind.field(key) {
            spec.kind
                .check(value)
                .map_err(|e| Error::validation(desired.target(), format!("field '{key}': {e}")))?;
            continue;
        }

        let inherit_of = key
            .strip_suffix(INHERIT_SUFFIX)
            .and_then(|base| kind.field(base))
            .filter(|spec| spec.inherit);
        match inherit_of {
            Some(spec) => {
                let Some(flag) = value.as_bool() else {
                    return Err(Error::validation(
                        desired.target(),
                        format!("field '{key}': expected boolean, got {}", value.type_name()),
                    ));
                };
                if flag && desired.attributes.contains_key(spec.name) {
                    return Err(Error::validation(
                        desired.target(),
                        format!("'{}' conflicts with '{key}' = true", spec.name),
                    ));
                }
            }
            None => {
                return Err(Error::validation(
                    desired.target(),
                    format!("unknown field '{key}' for {kind}"),
                ));
            }
        }
    }
    Ok(())
}

/// Decide what to send for one field, or `None` to leave it to the server.
fn resolve_field(
    spec: &FieldSpec,
    desired: &ResourceData,
    prior: Option<&ResourceData>,
) -> Option<Inheritable<AttrValue>> {
    let value = desired.get(spec.name);
    let prior_value = prior.and_then(|p| p.get(spec.name));

    if !spec.inherit {
        return value.or(prior_value).cloned().map(Inheritable::Explicit);
    }

    let prior_flag = prior
        .and_then(|p| p.inherit_flag(spec.name))
        .unwrap_or(false);

    match (value, desired.inherit_flag(spec.name)) {
        (_, Some(true)) => Some(Inheritable::inherited()),
        (Some(v), Some(false)) => Some(Inheritable::Explicit(v.clone())),
        (Some(v), None) => {
            let changed = prior_value != Some(v);
            Some(Inheritable::resolve(
                v.clone(),
                is_option_inherited(prior_flag, changed),
            ))
        }
        (None, Some(false)) => Some(Inheritable::Explicit(spec.kind.zero())),
        // Nothing declared: carry the prior record forward
        (None, None) if prior_flag => Some(Inheritable::inherited()),
        (None, None) => prior_value.cloned().map(Inheritable::Explicit),
    }
}

/// Translate a remote entity into desired-state shape, covering every field.
///
/// An inherited field yields its zero value plus `<field>_inherit = true`,
/// never the value the server resolved for it.
pub fn translate(remote: RemoteEntity, interfaces: Vec<Interface>) -> ResourceData {
    let kind = remote.kind;
    let mut data = ResourceData::new(kind, remote.name);
    data.interfaces = interfaces;

    for (name, value) in remote.fields {
        let Some(spec) = kind.field(&name) else {
            log::trace!("ignoring unmapped {kind} field '{name}'");
            continue;
        };
        let (value, inherited) = value.unwrap_with(spec.kind.zero());
        if spec.inherit {
            data.attributes
                .insert(inherit_key(spec.name), AttrValue::Bool(inherited));
        }
        data.attributes.insert(name, value);
    }
    data
}

/// Restrict a translated record to the keys `shape` declares.
///
/// The result compares structurally against `shape` to detect drift.
pub fn project(full: &ResourceData, shape: &ResourceData) -> ResourceData {
    let mut data = ResourceData::new(full.kind, full.name.clone());
    for key in shape.attributes.keys() {
        if let Some(value) = full.attributes.get(key) {
            data.attributes.insert(key.clone(), value.clone());
        } else if key.ends_with(INHERIT_SUFFIX) {
            data.attributes.insert(key.clone(), AttrValue::Bool(false));
        }
    }
    data.interfaces = interface::project(full.interfaces.clone(), &shape.interfaces);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distro() -> ResourceData {
        ResourceData::new(EntityKind::Distro, "ubuntu")
            .with("kernel", "/boot/vmlinuz")
            .with("initrd", "/boot/initrd")
    }

    #[test]
    fn test_build_explicit_fields() {
        let desired = distro().with("boot_loaders", AttrValue::str_list(["grub"]));
        let entity = build(&desired, None).unwrap();
        assert_eq!(entity.name, "ubuntu");
        assert_eq!(
            entity.field("boot_loaders"),
            Some(&Inheritable::Explicit(AttrValue::str_list(["grub"])))
        );
        // Left to the server default
        assert_eq!(entity.field("arch"), None);
    }

    #[test]
    fn test_build_inherit_flag() {
        let desired = distro().with("kernel_options_inherit", true);
        let entity = build(&desired, None).unwrap();
        assert!(entity.field("kernel_options").unwrap().is_inherited());
    }

    #[test]
    fn test_missing_required_field() {
        let desired = ResourceData::new(EntityKind::Distro, "ubuntu").with("kernel", "/k");
        let err = build(&desired, None).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("'initrd'"), "{err}");
    }

    #[test]
    fn test_wrong_element_kind() {
        let desired = distro().with(
            "owners",
            AttrValue::List(vec![AttrValue::Str("admin".into()), AttrValue::Bool(true)]),
        );
        let err = build(&desired, None).unwrap_err();
        assert!(err.to_string().contains("field 'owners'"), "{err}");
    }

    #[test]
    fn test_unknown_field() {
        let err = build(&distro().with("kernal", "/k"), None).unwrap_err();
        assert!(err.to_string().contains("unknown field 'kernal'"), "{err}");

        // Only inheritable fields have an inherit flag
        let err = build(&distro().with("arch_inherit", true), None).unwrap_err();
        assert!(err.to_string().contains("unknown field"), "{err}");
    }

    #[test]
    fn test_value_conflicts_with_inherit_flag() {
        let desired = distro()
            .with("owners", AttrValue::str_list(["admin"]))
            .with("owners_inherit", true);
        let err = build(&desired, None).unwrap_err();
        assert!(err.to_string().contains("conflicts"), "{err}");

        // An explicit false is fine
        let desired = distro()
            .with("owners", AttrValue::str_list(["admin"]))
            .with("owners_inherit", false);
        assert!(build(&desired, None).is_ok());
    }

    #[test]
    fn test_override_of_stored_inherit_flag() {
        let prior = distro()
            .with("mgmt_classes", AttrValue::List(Vec::new()))
            .with("mgmt_classes_inherit", true);

        // New concrete value in the same pass wins over the stale flag
        let desired = distro().with("mgmt_classes", AttrValue::str_list(["web"]));
        let entity = build(&desired, Some(&prior)).unwrap();
        assert_eq!(
            entity.field("mgmt_classes"),
            Some(&Inheritable::Explicit(AttrValue::str_list(["web"])))
        );

        // Unchanged value keeps inheriting
        let desired = distro().with("mgmt_classes", AttrValue::List(Vec::new()));
        let entity = build(&desired, Some(&prior)).unwrap();
        assert!(entity.field("mgmt_classes").unwrap().is_inherited());
    }

    #[test]
    fn test_optional_fields_carried_from_prior() {
        let prior = distro()
            .with("comment", "lab image")
            .with("owners_inherit", true);
        let entity = build(&distro(), Some(&prior)).unwrap();
        assert_eq!(
            entity.field("comment"),
            Some(&Inheritable::Explicit(AttrValue::from("lab image")))
        );
        assert!(entity.field("owners").unwrap().is_inherited());
    }

    #[test]
    fn test_profile_needs_distro_or_parent() {
        let profile = ResourceData::new(EntityKind::Profile, "web");
        assert!(build(&profile, None).is_err());
        assert!(build(&profile.clone().with("parent", "base"), None).is_ok());
        assert!(build(&profile.with("distro", "ubuntu"), None).is_ok());
    }

    #[test]
    fn test_system_needs_profile_or_image() {
        let system = ResourceData::new(EntityKind::System, "node01");
        let err = build(&system, None).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("profile, image"), "{err}");
        assert!(build(&system.clone().with("image", "rescue"), None).is_ok());
        assert!(build(&system.with("profile", "web"), None).is_ok());
    }

    #[test]
    fn test_interfaces_only_on_systems() {
        let desired = distro().with_interface(Interface::new("eth0"));
        assert!(build(&desired, None).is_err());

        let system = ResourceData::new(EntityKind::System, "foo")
            .with("profile", "web")
            .with_interface(Interface::new("eth0"))
            .with_interface(Interface::new("eth0"));
        let err = build(&system, None).unwrap_err();
        assert!(err.to_string().contains("duplicate interface"), "{err}");
    }

    #[test]
    fn test_translate_inherited_yields_zero() {
        let mut remote = RemoteEntity::new(EntityKind::Distro, "ubuntu")
            .with("kernel", "/boot/vmlinuz")
            .with("initrd", "/boot/initrd");
        remote.fields.insert(
            "kernel_options".to_string(),
            Inheritable::Inherited {
                resolved: Some(AttrValue::str_map([("console", "ttyS0")])),
            },
        );

        let data = translate(remote, Vec::new());
        assert_eq!(
            data.get("kernel_options"),
            Some(&AttrValue::Map(Default::default()))
        );
        assert_eq!(data.inherit_flag("kernel_options"), Some(true));
    }

    #[test]
    fn test_project_keeps_declared_keys() {
        let full = translate(
            RemoteEntity::new(EntityKind::Distro, "ubuntu")
                .with("kernel", "/boot/vmlinuz")
                .with("initrd", "/boot/initrd")
                .with("arch", "x86_64")
                .with_inherited("owners"),
            Vec::new(),
        );
        let shape = distro().with("owners_inherit", true);
        assert_eq!(project(&full, &shape), shape);
    }
}
