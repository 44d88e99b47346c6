//! Scalar arguments: identity, machine, memory, CPUs, VNC, boot order and
//! floppy.

use indoc::indoc;

use super::{Advisory, Error, Fragments};
use crate::config::{Accelerator, Config};
use crate::facts::RuntimeFacts;

/// `-boot` value when booting a pre-baked disk image.
pub const BOOT_DISK: &str = "c";
/// `-boot` value when booting installation media: CD first, once.
pub const BOOT_CDROM: &str = "once=d";

pub fn build(config: &Config, facts: &RuntimeFacts) -> Result<Fragments, Error> {
    let mut out = Fragments::default();
    let flags = &mut out.flags;

    if config.qmp_enable {
        if let Some(path) = config.qmp_socket_path.as_ref() {
            flags.set("-qmp", format!("unix:{path},server,nowait"));
        }
    }

    flags.set("-name", config.vm_name.as_str());

    let mut machine = format!("type={}", config.machine_type);
    if config.accelerator == Accelerator::None {
        out.advisories.push(Advisory::Message(String::from(indoc! {"
            WARNING: The VM will be started with no hardware acceleration.
            The installation may take considerably longer to finish."})));
    } else {
        machine.push_str(&format!(",accel={}", config.accelerator));
    }
    flags.set("-machine", machine);

    let memory_mb = config
        .memory_mb()
        .map_err(|e| Error::Config(format!("memory '{}': {e}", config.memory)))?;
    flags.set("-m", format!("{memory_mb}M"));

    if config.cpus > 1 {
        flags.set("-smp", format!("cpus={0},sockets={0}", config.cpus));
    }

    if let Some(port) = facts.vnc_port {
        flags.set("-vnc", vnc_endpoint(config, port)?);
    } else {
        tracing::debug!("No VNC port allocated, not adding -vnc");
    }

    let boot = if config.disk_image {
        BOOT_DISK
    } else {
        BOOT_CDROM
    };
    flags.set("-boot", boot);

    match facts.floppy_path.as_ref() {
        Some(floppy) => flags.set("-fda", floppy.as_str()),
        None => tracing::debug!("No floppy files, not attaching a floppy"),
    }

    Ok(out)
}

/// `<addr>:<display>[,password]`; QEMU takes the display number, i.e. the
/// port relative to the start of the VNC range.
fn vnc_endpoint(config: &Config, port: u16) -> Result<String, Error> {
    let display = port.checked_sub(config.vnc_port_min).ok_or_else(|| {
        Error::Config(format!(
            "VNC port {port} is below vnc_port_min {}",
            config.vnc_port_min
        ))
    })?;
    let mut vnc = format!("{}:{display}", config.vnc_bind_address);
    if config.vnc_use_password {
        vnc.push_str(",password");
    }
    Ok(vnc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qemu::test_support::{config, facts};

    fn value<'a>(out: &'a Fragments, flag: &str) -> Option<&'a str> {
        out.flags.get(flag).map(|v| v[0].as_str())
    }

    #[test]
    fn test_basic() {
        let out = build(&config(), &facts()).unwrap();
        assert_eq!(value(&out, "-name"), Some("testvm"));
        assert_eq!(value(&out, "-machine"), Some("type=pc,accel=kvm"));
        assert_eq!(value(&out, "-m"), Some("512M"));
        assert_eq!(value(&out, "-vnc"), Some("127.0.0.1:1"));
        assert_eq!(value(&out, "-boot"), Some(BOOT_CDROM));
        assert_eq!(value(&out, "-smp"), None);
        assert_eq!(value(&out, "-qmp"), None);
        assert_eq!(value(&out, "-fda"), None);
        assert!(out.advisories.is_empty());
    }

    #[test]
    fn test_all_optional_flags() {
        let mut config = config();
        config.qmp_enable = true;
        config.qmp_socket_path = Some("/run/vm.sock".into());
        config.cpus = 4;
        config.memory = "2G".to_owned();
        config.disk_image = true;
        config.vnc_use_password = true;
        config.vnc_bind_address = "0.0.0.0".to_owned();
        config.machine_type = "q35".to_owned();
        config.accelerator = Accelerator::Tcg;
        let mut facts = facts();
        facts.vnc_port = Some(5942);
        facts.floppy_path = Some("/tmp/floppy.img".into());

        let out = build(&config, &facts).unwrap();
        assert_eq!(value(&out, "-qmp"), Some("unix:/run/vm.sock,server,nowait"));
        assert_eq!(value(&out, "-machine"), Some("type=q35,accel=tcg"));
        assert_eq!(value(&out, "-m"), Some("2048M"));
        assert_eq!(value(&out, "-smp"), Some("cpus=4,sockets=4"));
        assert_eq!(value(&out, "-vnc"), Some("0.0.0.0:42,password"));
        assert_eq!(value(&out, "-boot"), Some(BOOT_DISK));
        assert_eq!(value(&out, "-fda"), Some("/tmp/floppy.img"));
    }

    #[test]
    fn test_no_accelerator_warns() {
        let mut config = config();
        config.accelerator = Accelerator::None;
        let out = build(&config, &facts()).unwrap();
        assert_eq!(value(&out, "-machine"), Some("type=pc"));
        assert!(out.advisories[0].text().contains("no hardware acceleration"));
    }

    #[test]
    fn test_vnc_port_below_range() {
        let mut facts = facts();
        facts.vnc_port = Some(80);
        assert!(matches!(
            build(&config(), &facts).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_no_vnc_port() {
        let mut facts = facts();
        facts.vnc_port = None;
        let out = build(&config(), &facts).unwrap();
        assert!(!out.flags.contains("-vnc"));
    }
}
