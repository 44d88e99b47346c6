//! Merging user `qemuargs` overrides into the computed defaults.
//!
//! QEMU accepts repeated switches, so overrides are grouped per flag. A flag
//! that appears in the overrides replaces that flag's defaults outright;
//! there is no per-value merge. The only repair applied afterwards is making
//! sure `-device` still carries the configured network device, since without
//! it the guest has no NIC bound to our `-netdev` backend.

use super::network::net_device_fragment;
use super::{Advisory, Error, FlagMap, InterpolationContext, TemplateRenderer};
use crate::config::Config;
use crate::facts::RuntimeFacts;

/// Build the values visible to override templates.
pub fn interpolation_context(config: &Config, facts: &RuntimeFacts) -> InterpolationContext {
    let ssh_host_port = if config.communicator.is_enabled() {
        facts.comm_host_port.unwrap_or_default()
    } else {
        0
    };
    InterpolationContext {
        http_ip: facts.http_ip.clone(),
        http_port: facts.http_port,
        http_dir: config.http_directory.clone(),
        output_dir: config.output_directory.to_string(),
        name: config.vm_name.clone(),
        ssh_host_port,
    }
}

/// Render every value token of every row. Token 0 is the flag and is kept
/// verbatim.
pub fn render_rows(
    rows: &[Vec<String>],
    ctx: &InterpolationContext,
    renderer: &dyn TemplateRenderer,
) -> Result<Vec<Vec<String>>, Error> {
    rows.iter()
        .map(|row| {
            let Some((flag, values)) = row.split_first() else {
                return Ok(Vec::new());
            };
            let mut rendered = Vec::with_capacity(row.len());
            rendered.push(flag.clone());
            for template in values {
                let value = renderer
                    .render(template, ctx)
                    .map_err(|source| Error::TemplateRender {
                        template: template.clone(),
                        source,
                    })?;
                rendered.push(value);
            }
            Ok(rendered)
        })
        .collect()
}

/// Group rendered rows by flag. The value tokens of a row are concatenated;
/// a row whose value ends up empty only registers the flag.
pub fn group_rows(rows: Vec<Vec<String>>) -> FlagMap {
    let mut map = FlagMap::new();
    for row in rows {
        let mut tokens = row.into_iter();
        let Some(flag) = tokens.next() else {
            continue;
        };
        let value = tokens.collect::<String>();
        if value.is_empty() {
            map.touch(flag);
        } else {
            map.append(flag, value);
        }
    }
    map
}

/// Fill in every default flag that the overrides don't mention.
pub fn merge_defaults(mut overrides: FlagMap, defaults: FlagMap) -> FlagMap {
    for (flag, values) in defaults {
        if !overrides.contains(&flag) {
            overrides.set(flag, values);
        }
    }
    overrides
}

/// Re-append the network device if an override of `-device` dropped it.
pub fn repair_net_device(map: &mut FlagMap, net_device: &str) {
    let Some(devices) = map.get("-device") else {
        return;
    };
    if devices.concat().contains(net_device) {
        return;
    }
    tracing::debug!("qemuargs -device override omits {net_device}, re-adding it");
    map.append("-device", net_device_fragment(net_device));
}

/// Apply the configured overrides to `defaults`.
pub fn apply(
    config: &Config,
    facts: &RuntimeFacts,
    defaults: FlagMap,
    renderer: &dyn TemplateRenderer,
    advisories: &mut Vec<Advisory>,
) -> Result<FlagMap, Error> {
    let overrides = if config.qemu_args.is_empty() {
        FlagMap::new()
    } else {
        advisories.push(Advisory::Say(
            "Overriding default Qemu arguments with QemuArgs...".to_owned(),
        ));
        let ctx = interpolation_context(config, facts);
        group_rows(render_rows(&config.qemu_args, &ctx, renderer)?)
    };

    let mut merged = merge_defaults(overrides, defaults);
    repair_net_device(&mut merged, &config.net_device);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommunicatorType;
    use crate::qemu::test_support::{config, facts, values_of};
    use crate::qemu::{command_args, default_flags, FieldRenderer, TemplateError};

    fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_override_replaces_whole_flag() {
        let mut config = config();
        config.qemu_args = rows(&[
            &["-drive", "file=", "{{ .OutputDir }}/a.img", ",if=virtio"],
            &["-drive", "file=b.img"],
            &["-m", "2048M"],
        ]);
        let facts = facts();
        let defaults = default_flags(&config, &facts).unwrap().flags;
        let args = command_args(&config, &facts, &FieldRenderer).unwrap();

        assert_eq!(
            values_of(&args.argv, "-drive"),
            vec!["file=out/a.img,if=virtio", "file=b.img"]
        );
        assert_eq!(values_of(&args.argv, "-m"), vec!["2048M"]);
        // Untouched flags keep their defaults
        for flag in ["-name", "-machine", "-boot", "-netdev", "-device", "-vnc"] {
            assert_eq!(
                values_of(&args.argv, flag),
                defaults.get(flag).unwrap().iter().map(String::as_str).collect::<Vec<_>>(),
                "{flag}"
            );
        }
        assert_eq!(
            args.advisories.iter().filter(|a| a.text().contains("Overriding")).count(),
            1
        );
    }

    #[test]
    fn test_flag_only_rows() {
        let mut config = config();
        config.qemu_args = rows(&[&["-no-reboot"], &["-snapshot", ""]]);
        let args = command_args(&config, &facts(), &FieldRenderer).unwrap();
        assert_eq!(&args.argv[..2], &["-no-reboot", "-snapshot"]);
        assert_eq!(args.argv.iter().filter(|a| *a == "-no-reboot").count(), 1);
    }

    #[test]
    fn test_empty_value_row_clears_default() {
        let mut config = config();
        config.qemu_args = rows(&[&["-vnc"]]);
        let args = command_args(&config, &facts(), &FieldRenderer).unwrap();
        // The flag is emitted alone and the default endpoint is gone
        assert_eq!(args.argv[0], "-vnc");
        assert_eq!(args.argv.iter().filter(|a| *a == "-vnc").count(), 1);
        assert!(!args.argv.iter().any(|a| a == "127.0.0.1:1"));
    }

    #[test]
    fn test_net_device_repaired() {
        let mut config = config();
        config.qemu_args = rows(&[&["-device", "virtio-rng-pci"]]);
        let args = command_args(&config, &facts(), &FieldRenderer).unwrap();
        assert_eq!(
            values_of(&args.argv, "-device"),
            vec!["virtio-rng-pci", "virtio-net,netdev=user.0"]
        );
    }

    #[test]
    fn test_net_device_kept_when_present() {
        let mut config = config();
        config.qemu_args = rows(&[&["-device", "virtio-net,netdev=mynet"]]);
        let args = command_args(&config, &facts(), &FieldRenderer).unwrap();
        assert_eq!(values_of(&args.argv, "-device"), vec!["virtio-net,netdev=mynet"]);
    }

    #[test]
    fn test_repair_flag_only_device() {
        let mut map = FlagMap::new();
        map.touch("-device");
        repair_net_device(&mut map, "e1000");
        assert_eq!(map.get("-device").unwrap(), &["e1000,netdev=user.0".to_string()]);

        let mut map = FlagMap::new();
        repair_net_device(&mut map, "e1000");
        assert!(map.is_empty());
    }

    #[test]
    fn test_template_failure_aborts() {
        let mut config = config();
        config.qemu_args = rows(&[&["-name", "ok"], &["-drive", "{{ .Missing }}"]]);
        let err = command_args(&config, &facts(), &FieldRenderer).unwrap_err();
        match err {
            Error::TemplateRender { template, source } => {
                assert_eq!(template, "{{ .Missing }}");
                assert_eq!(source, TemplateError::UnknownField("Missing".to_owned()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_flag_token_not_rendered() {
        let ctx = InterpolationContext::default();
        let rendered = render_rows(&rows(&[&["{{x", "a"]]), &ctx, &FieldRenderer).unwrap();
        assert_eq!(rendered, rows(&[&["{{x", "a"]]));
    }

    #[test]
    fn test_ssh_host_port_only_with_communicator() {
        let mut config = config();
        let mut facts = facts();
        facts.comm_host_port = Some(2222);
        assert_eq!(interpolation_context(&config, &facts).ssh_host_port, 0);

        config.communicator.kind = CommunicatorType::Ssh;
        let ctx = interpolation_context(&config, &facts);
        assert_eq!(ctx.ssh_host_port, 2222);
        assert_eq!(ctx.http_ip, "10.0.2.2");
        assert_eq!(ctx.http_port, 8080);
        assert_eq!(ctx.output_dir, "out");
        assert_eq!(ctx.name, "testvm");

        config.qemu_args = rows(&[&[
            "-netdev",
            "user,id=user.0,hostfwd=tcp::{{ .SSHHostPort }}-:22",
        ]]);
        let args = command_args(&config, &facts, &FieldRenderer).unwrap();
        assert_eq!(
            values_of(&args.argv, "-netdev"),
            vec!["user,id=user.0,hostfwd=tcp::2222-:22"]
        );
    }
}
