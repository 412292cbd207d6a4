use crate::Context;
use crate::cli::ShowArgs;
use crate::ui;
use anyhow::Result;
use reconcile::{
    AttrValue, GetOptions, Inheritable, Interface, NoLock, RemoteEntity, translate,
};

pub fn run(ctx: &Context, args: &ShowArgs) -> Result<()> {
    let client = super::connect(ctx)?;
    let lock = NoLock;
    let reconciler = super::reconciler(ctx, &client, &lock);

    let (entity, interfaces) =
        reconciler.inspect(args.kind, &args.name, GetOptions::resolved())?;

    if args.json {
        let data = translate(entity, interfaces);
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    ui::header(&format!("{} {}", entity.kind, entity.name));
    for (field, value) in field_lines(&entity) {
        ui::kv(&field, &value);
    }
    for interface in &interfaces {
        ui::section(&format!("interface {}", interface.name));
        for (field, value) in interface_lines(interface) {
            ui::kv(field, &value);
        }
    }
    Ok(())
}

/// One display line per field; inherited fields show what they resolve to
fn field_lines(entity: &RemoteEntity) -> Vec<(String, String)> {
    entity
        .fields
        .iter()
        .map(|(field, value)| {
            let shown = match value {
                Inheritable::Explicit(v) => v.to_string(),
                Inheritable::Inherited { resolved: Some(v) } => format!("{v} (inherited)"),
                Inheritable::Inherited { resolved: None } => "<inherited>".to_string(),
            };
            (field.clone(), shown)
        })
        .collect()
}

/// Non-empty interface settings
fn interface_lines(interface: &Interface) -> Vec<(&'static str, String)> {
    let mut lines = vec![("type", interface.interface_type.to_string())];
    let text = [
        ("mac_address", &interface.mac_address),
        ("ip_address", &interface.ip_address),
        ("netmask", &interface.netmask),
        ("gateway", &interface.gateway),
        ("dns_name", &interface.dns_name),
        ("ipv6_address", &interface.ipv6_address),
        ("interface_master", &interface.interface_master),
        ("virt_bridge", &interface.virt_bridge),
    ];
    lines.extend(
        text.into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(field, value)| (field, value.clone())),
    );
    if interface.is_static {
        lines.push(("static", "true".to_string()));
    }
    if interface.management {
        lines.push(("management", "true".to_string()));
    }
    if !interface.static_routes.is_empty() {
        lines.push(("static_routes", AttrValue::str_list(&interface.static_routes).to_string()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::EntityKind;

    #[test]
    fn test_field_lines_mark_inheritance() {
        let mut entity = RemoteEntity::new(EntityKind::Profile, "base")
            .with("distro", "ubuntu")
            .with_inherited("kernel_options");
        entity.fields.insert(
            "name_servers".to_string(),
            Inheritable::Inherited {
                resolved: Some(AttrValue::str_list(["10.0.0.1"])),
            },
        );

        let lines = field_lines(&entity);
        assert_eq!(
            lines,
            vec![
                ("distro".to_string(), "ubuntu".to_string()),
                ("kernel_options".to_string(), "<inherited>".to_string()),
                (
                    "name_servers".to_string(),
                    format!("{} (inherited)", AttrValue::str_list(["10.0.0.1"]))
                ),
            ]
        );
    }

    #[test]
    fn test_interface_lines_skip_empty_values() {
        let interface = Interface {
            name: "eth0".to_string(),
            mac_address: "aa:bb:cc:dd:ee:01".to_string(),
            is_static: true,
            ..Default::default()
        };

        let lines = interface_lines(&interface);
        assert_eq!(lines[0].0, "type");
        assert!(lines.contains(&("mac_address", "aa:bb:cc:dd:ee:01".to_string())));
        assert!(lines.contains(&("static", "true".to_string())));
        assert!(!lines.iter().any(|(field, _)| *field == "gateway"));
    }
}
