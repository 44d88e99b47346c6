//! Classify the probed QEMU version into a capability tier.

use semver::Version;

use super::Error;

/// QEMU releases before 2.0 lack virtio-scsi disk enumeration and
/// the `-display` switch we rely on.
const MODERN_MIN: Version = Version::new(2, 0, 0);

/// Capability tier derived from the emulator version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum QemuTier {
    /// Before 2.0: single plain `-drive`, no display configuration.
    Legacy,
    /// 2.0 or newer.
    Modern,
}

impl QemuTier {
    /// Parse a raw version string and classify it.
    pub fn from_version_str(raw: &str) -> Result<Self, Error> {
        let version = parse_version(raw)?;
        let tier = if version >= MODERN_MIN {
            QemuTier::Modern
        } else {
            QemuTier::Legacy
        };
        tracing::debug!("QEMU version {version} classified as {tier}");
        Ok(tier)
    }

    /// Whether the configured disk bus (including virtio-scsi) and
    /// per-disk enumeration are honored.
    pub fn supports_scsi_disks(self) -> bool {
        matches!(self, QemuTier::Modern)
    }

    /// Whether an explicit `-display` mode is honored.
    pub fn supports_display(self) -> bool {
        matches!(self, QemuTier::Modern)
    }
}

/// Parse a loosely formatted version (`2.0`, `v1.7.0`, `2.11.1-rc0`) into a
/// semantic version, padding missing components with zero.
pub fn parse_version(raw: &str) -> Result<Version, Error> {
    let parse_err = |reason: &str| Error::VersionParse {
        version: raw.to_owned(),
        reason: reason.to_owned(),
    };

    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(parse_err("empty version string"));
    }

    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);

    let components = core.split('.').collect::<Vec<_>>();
    if components.len() > 3 {
        return Err(parse_err("too many version components"));
    }
    let mut numbers = [0u64; 3];
    for (slot, component) in numbers.iter_mut().zip(&components) {
        *slot = component
            .parse()
            .map_err(|_| parse_err(&format!("invalid component '{component}'")))?;
    }

    let normalized = format!("{}.{}.{}{suffix}", numbers[0], numbers[1], numbers[2]);
    Version::parse(&normalized).map_err(|e| parse_err(&e.to_string()))
}
