//! Boot disk and CD-ROM `-drive` / `-device` arguments.

use camino::Utf8PathBuf;

use super::{Error, Fragments, QemuTier};
use crate::config::{Config, DetectZeroes, DiskInterface};
use crate::facts::RuntimeFacts;

/// Id of the shared virtio-scsi controller for disks.
const SCSI_CONTROLLER_ID: &str = "scsi0";

/// Drive and device fragments accumulated while walking disks and CDs.
#[derive(Debug, Default)]
struct DriveLists {
    drives: Vec<String>,
    devices: Vec<String>,
}

/// Compute the disk and CD-ROM arguments.
pub fn build(config: &Config, facts: &RuntimeFacts, tier: QemuTier) -> Result<Fragments, Error> {
    let mut lists = DriveLists::default();

    if tier.supports_scsi_disks() {
        let disks = disk_paths(config, facts)?;
        match config.disk_interface {
            DiskInterface::VirtioScsi => scsi_disks(config, &disks, &mut lists),
            _ => plain_disks(config, &disks, &mut lists),
        }
    } else {
        // Older QEMU only understands the single plain form
        lists.drives.push(format!(
            "file={},if={},cache={},format={}",
            config.image_path(),
            config.disk_interface,
            config.disk_cache,
            config.format
        ));
    }

    cdroms(config, &cd_paths(config, facts)?, &mut lists);

    let mut out = Fragments::default();
    if !lists.devices.is_empty() {
        out.flags.append("-device", lists.devices);
    }
    if !lists.drives.is_empty() {
        out.flags.append("-drive", lists.drives);
    }
    Ok(out)
}

/// Disks to attach: the pre-baked image alone, or every generated data disk.
fn disk_paths(config: &Config, facts: &RuntimeFacts) -> Result<Vec<Utf8PathBuf>, Error> {
    if config.disk_image {
        return Ok(vec![config.image_path()]);
    }
    facts
        .disk_paths
        .clone()
        .ok_or(Error::MissingRuntimeFact("disk_paths"))
}

/// CDs in index order: installation media first, then the generated CD.
fn cd_paths(config: &Config, facts: &RuntimeFacts) -> Result<Vec<Utf8PathBuf>, Error> {
    let mut paths = Vec::new();
    if !config.disk_image {
        let iso = facts
            .iso_path
            .clone()
            .ok_or(Error::MissingRuntimeFact("iso_path"))?;
        paths.push(iso);
    }
    if let Some(cd) = facts.cd_path.as_ref().filter(|p| !p.as_str().is_empty()) {
        paths.push(cd.clone());
    }
    Ok(paths)
}

/// Trailing `cache=…,discard=…,format=…[,detect-zeroes=…]` options.
fn disk_options(config: &Config) -> String {
    let mut opts = format!(
        "cache={},discard={},format={}",
        config.disk_cache, config.disk_discard, config.format
    );
    if config.disk_detect_zeroes != DetectZeroes::Off {
        opts.push_str(&format!(",detect-zeroes={}", config.disk_detect_zeroes));
    }
    opts
}

fn plain_disks(config: &Config, disks: &[Utf8PathBuf], lists: &mut DriveLists) {
    let opts = disk_options(config);
    for disk in disks {
        lists.drives.push(format!(
            "file={disk},if={},{opts}",
            config.disk_interface
        ));
    }
}

fn scsi_disks(config: &Config, disks: &[Utf8PathBuf], lists: &mut DriveLists) {
    let opts = disk_options(config);
    lists
        .devices
        .push(format!("virtio-scsi-pci,id={SCSI_CONTROLLER_ID}"));
    for (i, disk) in disks.iter().enumerate() {
        lists.devices.push(format!(
            "scsi-hd,bus={SCSI_CONTROLLER_ID}.0,drive=drive{i}"
        ));
        lists
            .drives
            .push(format!("if=none,file={disk},id=drive{i},{opts}"));
    }
}

fn cdroms(config: &Config, cds: &[Utf8PathBuf], lists: &mut DriveLists) {
    for (i, cd) in cds.iter().enumerate() {
        match config.cdrom_interface {
            None => lists
                .drives
                .push(format!("file={cd},index={i},media=cdrom")),
            Some(DiskInterface::VirtioScsi) => {
                lists.drives.push(format!(
                    "file={cd},if=none,index={i},id=cdrom{i},media=cdrom"
                ));
                lists.devices.push("virtio-scsi-device".to_owned());
                lists.devices.push(format!("scsi-cd,drive=cdrom{i}"));
            }
            Some(iface) => lists.drives.push(format!(
                "file={cd},if={iface},index={i},id=cdrom{i},media=cdrom"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiskCache, DiskDiscard};
    use crate::qemu::test_support::{config, facts};

    fn drives(out: &Fragments) -> Vec<String> {
        out.flags.get("-drive").unwrap_or_default().to_vec()
    }

    fn devices(out: &Fragments) -> Vec<String> {
        out.flags.get("-device").unwrap_or_default().to_vec()
    }

    #[test]
    fn test_scsi_multi_disk() {
        let mut config = config();
        config.disk_interface = DiskInterface::VirtioScsi;
        let mut facts = facts();
        facts.disk_paths = Some(vec!["d0.qcow2".into(), "d1.qcow2".into(), "d2.qcow2".into()]);

        let out = build(&config, &facts, QemuTier::Modern).unwrap();
        let devices = devices(&out);
        let controllers = devices
            .iter()
            .filter(|d| d.starts_with("virtio-scsi-pci"))
            .count();
        assert_eq!(controllers, 1);
        assert_eq!(
            &devices[1..],
            &[
                "scsi-hd,bus=scsi0.0,drive=drive0",
                "scsi-hd,bus=scsi0.0,drive=drive1",
                "scsi-hd,bus=scsi0.0,drive=drive2",
            ]
        );
        let drives = drives(&out);
        assert_eq!(
            &drives[..3],
            &[
                "if=none,file=d0.qcow2,id=drive0,cache=writeback,discard=ignore,format=qcow2",
                "if=none,file=d1.qcow2,id=drive1,cache=writeback,discard=ignore,format=qcow2",
                "if=none,file=d2.qcow2,id=drive2,cache=writeback,discard=ignore,format=qcow2",
            ]
        );
        // The installation ISO follows the disks
        assert_eq!(drives[3], "file=/isos/install.iso,index=0,media=cdrom");
    }

    #[test]
    fn test_scsi_disk_image() {
        let mut config = config();
        config.disk_interface = DiskInterface::VirtioScsi;
        config.disk_image = true;
        let mut facts = facts();
        facts.disk_paths = None;

        let out = build(&config, &facts, QemuTier::Modern).unwrap();
        assert_eq!(
            devices(&out),
            vec!["virtio-scsi-pci,id=scsi0", "scsi-hd,bus=scsi0.0,drive=drive0"]
        );
        assert_eq!(
            drives(&out),
            vec!["if=none,file=out/testvm,id=drive0,cache=writeback,discard=ignore,format=qcow2"]
        );
    }

    #[test]
    fn test_plain_disk_count() {
        let mut config = config();
        config.disk_interface = DiskInterface::Ide;
        config.disk_cache = DiskCache::None;
        config.disk_discard = DiskDiscard::Unmap;
        let mut facts = facts();
        facts.disk_paths = Some(vec!["a".into(), "b".into()]);
        facts.iso_path = Some("i.iso".into());

        let out = build(&config, &facts, QemuTier::Modern).unwrap();
        assert_eq!(
            drives(&out),
            vec![
                "file=a,if=ide,cache=none,discard=unmap,format=qcow2",
                "file=b,if=ide,cache=none,discard=unmap,format=qcow2",
                "file=i.iso,index=0,media=cdrom",
            ]
        );
        assert!(devices(&out).is_empty());
        assert!(!out.flags.contains("-device"));
    }

    #[test]
    fn test_detect_zeroes_only_when_enabled() {
        for mode in [DetectZeroes::Off, DetectZeroes::On, DetectZeroes::Unmap] {
            for iface in [DiskInterface::Virtio, DiskInterface::VirtioScsi] {
                let mut config = config();
                config.disk_detect_zeroes = mode;
                config.disk_interface = iface;
                let out = build(&config, &facts(), QemuTier::Modern).unwrap();
                let disk = &drives(&out)[0];
                let expected = format!(",detect-zeroes={mode}");
                assert_eq!(
                    disk.contains("detect-zeroes"),
                    mode != DetectZeroes::Off,
                    "{disk}"
                );
                if mode != DetectZeroes::Off {
                    assert!(disk.ends_with(&expected), "{disk}");
                }
            }
        }
    }

    #[test]
    fn test_legacy_ignores_scsi() {
        let mut config = config();
        config.disk_interface = DiskInterface::VirtioScsi;
        config.disk_detect_zeroes = DetectZeroes::On;
        let mut facts = facts();
        facts.disk_paths = Some(vec!["a".into(), "b".into()]);

        let out = build(&config, &facts, QemuTier::Legacy).unwrap();
        assert!(devices(&out).is_empty());
        assert_eq!(
            drives(&out)[0],
            "file=out/testvm,if=virtio-scsi,cache=writeback,format=qcow2"
        );
        assert_eq!(drives(&out).len(), 2);
    }

    #[test]
    fn test_cd_order() {
        let mut config = config();
        config.cdrom_interface = Some(DiskInterface::Ide);
        let mut facts = facts();
        facts.cd_path = Some("/tmp/cidata.iso".into());

        let out = build(&config, &facts, QemuTier::Modern).unwrap();
        let drives = drives(&out);
        assert_eq!(
            &drives[1..],
            &[
                "file=/isos/install.iso,if=ide,index=0,id=cdrom0,media=cdrom",
                "file=/tmp/cidata.iso,if=ide,index=1,id=cdrom1,media=cdrom",
            ]
        );
    }

    #[test]
    fn test_cd_only_generated_when_disk_image() {
        let mut config = config();
        config.disk_image = true;
        let mut facts = facts();
        facts.cd_path = Some("/tmp/cidata.iso".into());

        let out = build(&config, &facts, QemuTier::Modern).unwrap();
        assert_eq!(drives(&out)[1], "file=/tmp/cidata.iso,index=0,media=cdrom");
    }

    #[test]
    fn test_empty_cd_path_ignored() {
        let mut facts = facts();
        facts.cd_path = Some("".into());
        let out = build(&config(), &facts, QemuTier::Modern).unwrap();
        assert_eq!(drives(&out).len(), 2);
    }

    #[test]
    fn test_scsi_cdroms() {
        let mut config = config();
        config.cdrom_interface = Some(DiskInterface::VirtioScsi);
        let mut facts = facts();
        facts.cd_path = Some("c.iso".into());

        let out = build(&config, &facts, QemuTier::Modern).unwrap();
        assert_eq!(
            devices(&out),
            vec![
                "virtio-scsi-device",
                "scsi-cd,drive=cdrom0",
                "virtio-scsi-device",
                "scsi-cd,drive=cdrom1",
            ]
        );
        assert_eq!(
            &drives(&out)[1..],
            &[
                "file=/isos/install.iso,if=none,index=0,id=cdrom0,media=cdrom",
                "file=c.iso,if=none,index=1,id=cdrom1,media=cdrom",
            ]
        );
    }

    #[test]
    fn test_missing_facts() {
        let mut facts = facts();
        facts.disk_paths = None;
        let err = build(&config(), &facts, QemuTier::Modern).unwrap_err();
        assert!(matches!(err, Error::MissingRuntimeFact("disk_paths")));

        let mut facts = self::facts();
        facts.iso_path = None;
        let err = build(&config(), &facts, QemuTier::Modern).unwrap_err();
        assert!(matches!(err, Error::MissingRuntimeFact("iso_path")));
    }
}
