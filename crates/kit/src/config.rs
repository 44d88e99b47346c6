//! Build configuration for the QEMU run step.
//!
//! The configuration is supplied by the caller as JSON and is read-only once
//! [`Config::prepare`] has filled in defaults and validated it.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::utils::parse_memory_to_mb;

pub const DEFAULT_VM_NAME: &str = "packer-qemu";
pub const DEFAULT_OUTPUT_DIR: &str = "output-qemu";
pub const DEFAULT_MEMORY: &str = "512";

/// Network device models QEMU is known to accept for `-device`.
pub const NET_DEVICES: &[&str] = &[
    "ne2k_pci",
    "i82551",
    "i82557b",
    "i82559er",
    "rtl8139",
    "e1000",
    "pcnet",
    "virtio",
    "virtio-net",
    "virtio-net-pci",
    "usb-net",
    "i82559a",
    "i82559b",
    "i82559c",
    "i82550",
    "i82562",
    "i82557a",
    "i82557c",
    "i82801",
    "vmxnet3",
    "i82558a",
    "i82558b",
    "ne2k_isa",
];

/// Bus used to attach disks (and optionally CD-ROMs).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DiskInterface {
    Ide,
    Sata,
    Scsi,
    #[default]
    Virtio,
    /// Paravirtualized SCSI controller with per-disk `scsi-hd` devices
    VirtioScsi,
}

/// Host page cache mode for disk images
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DiskCache {
    Writethrough,
    #[default]
    Writeback,
    None,
    Unsafe,
    Directsync,
}

/// Whether guest trim/unmap requests reach the backing file
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DiskDiscard {
    Unmap,
    #[default]
    Ignore,
}

/// Translation of zero-filled writes
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DetectZeroes {
    #[default]
    Off,
    On,
    Unmap,
}

/// Supported disk image formats
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DiskFormat {
    /// QEMU Copy On Write 2 format (default)
    #[default]
    Qcow2,
    /// Raw disk image format
    Raw,
}

/// Hardware virtualization backend appended to `-machine`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Accelerator {
    #[default]
    Kvm,
    Tcg,
    Xen,
    Hax,
    Hvf,
    Whpx,
    /// Pure emulation; no `accel=` suffix is emitted
    None,
}

/// Post-boot control channel used by the rest of the build.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CommunicatorType {
    #[default]
    Ssh,
    Winrm,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicatorConfig {
    #[serde(rename = "type")]
    pub kind: CommunicatorType,
    pub port: Option<u16>,
}

impl CommunicatorConfig {
    /// Whether a guest communicator is in use at all.
    pub fn is_enabled(&self) -> bool {
        self.kind != CommunicatorType::None
    }

    /// Guest-side port of the communicator protocol.
    pub fn port(&self) -> u16 {
        match (self.port, self.kind) {
            (Some(port), _) => port,
            (None, CommunicatorType::Winrm) => 5985,
            (None, _) => 22,
        }
    }
}

/// Configuration of the virtual machine to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub vm_name: String,
    pub output_directory: Utf8PathBuf,
    pub http_directory: String,
    pub machine_type: String,

    pub disk_interface: DiskInterface,
    pub disk_cache: DiskCache,
    pub disk_discard: DiskDiscard,
    pub disk_detect_zeroes: DetectZeroes,
    pub format: DiskFormat,
    pub cdrom_interface: Option<DiskInterface>,
    /// Boot from a pre-baked disk image rather than installation media
    pub disk_image: bool,

    pub net_bridge: Option<String>,
    pub net_device: String,

    pub accelerator: Accelerator,
    pub cpus: u32,
    /// Memory size, e.g. "512", "2G", "1024M" (plain number is MiB)
    pub memory: String,

    pub display: Option<String>,
    pub use_default_display: bool,
    pub headless: bool,

    pub qmp_enable: bool,
    pub qmp_socket_path: Option<Utf8PathBuf>,

    pub vnc_bind_address: String,
    pub vnc_use_password: bool,
    pub vnc_port_min: u16,
    pub vnc_port_max: u16,

    pub communicator: CommunicatorConfig,

    /// Raw user override rows; token 0 is the flag, the rest are templates
    #[serde(rename = "qemuargs")]
    pub qemu_args: Vec<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vm_name: String::new(),
            output_directory: DEFAULT_OUTPUT_DIR.into(),
            http_directory: String::new(),
            machine_type: "pc".to_owned(),
            disk_interface: DiskInterface::default(),
            disk_cache: DiskCache::default(),
            disk_discard: DiskDiscard::default(),
            disk_detect_zeroes: DetectZeroes::default(),
            format: DiskFormat::default(),
            cdrom_interface: None,
            disk_image: false,
            net_bridge: None,
            net_device: "virtio-net".to_owned(),
            accelerator: Accelerator::default(),
            cpus: 1,
            memory: DEFAULT_MEMORY.to_owned(),
            display: None,
            use_default_display: false,
            headless: false,
            qmp_enable: false,
            qmp_socket_path: None,
            vnc_bind_address: "127.0.0.1".to_owned(),
            vnc_use_password: false,
            vnc_port_min: 5900,
            vnc_port_max: 6000,
            communicator: CommunicatorConfig::default(),
            qemu_args: Vec::new(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file and prepare it.
    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let buf = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        let mut config: Config = serde_json::from_str(&buf)
            .with_context(|| format!("Failed to parse config file {path}"))?;
        config.prepare()?;
        Ok(config)
    }

    /// Fill in derived defaults and validate, reporting every problem at once.
    pub fn prepare(&mut self) -> Result<()> {
        if self.vm_name.is_empty() {
            self.vm_name = DEFAULT_VM_NAME.to_owned();
        }
        if self.machine_type.is_empty() {
            self.machine_type = "pc".to_owned();
        }
        if self.net_device.is_empty() {
            self.net_device = "virtio-net".to_owned();
        }
        if self.memory.trim().is_empty() {
            self.memory = DEFAULT_MEMORY.to_owned();
        }
        if self.net_bridge.as_deref() == Some("") {
            self.net_bridge = None;
        }
        if self.display.as_deref() == Some("") {
            self.display = None;
        }
        if self.qmp_enable && self.qmp_socket_path.is_none() {
            let path = self
                .output_directory
                .join(format!("{}.monitor", self.vm_name));
            tracing::debug!("QMP enabled without a socket path, using {path}");
            self.qmp_socket_path = Some(path);
        }

        let mut errors = Vec::new();
        if self.vm_name.contains('/') {
            errors.push(format!("vm_name must not contain '/': {}", self.vm_name));
        }
        if self.cpus == 0 {
            errors.push("cpus must be at least 1".to_owned());
        }
        match parse_memory_to_mb(&self.memory) {
            Ok(0) => errors.push(format!("memory must be at least 1 MiB: {}", self.memory)),
            Ok(_) => {}
            Err(e) => errors.push(format!("invalid memory '{}': {e}", self.memory)),
        }
        if self.vnc_port_min > self.vnc_port_max {
            errors.push(format!(
                "vnc_port_min ({}) must be less than or equal to vnc_port_max ({})",
                self.vnc_port_min, self.vnc_port_max
            ));
        }
        if !NET_DEVICES.contains(&self.net_device.as_str()) {
            errors.push(format!("unrecognized network device: {}", self.net_device));
        }
        for (idx, row) in self.qemu_args.iter().enumerate() {
            if row.first().map_or(true, |flag| flag.is_empty()) {
                errors.push(format!("qemuargs row {idx} has no flag"));
            }
        }

        if !errors.is_empty() {
            return Err(eyre!("Invalid configuration:\n{}", errors.join("\n")));
        }
        Ok(())
    }

    /// Memory size in MiB.
    pub fn memory_mb(&self) -> Result<u32> {
        parse_memory_to_mb(&self.memory)
    }

    /// Path of the pre-baked boot image: `<output_directory>/<vm_name>`.
    pub fn image_path(&self) -> Utf8PathBuf {
        self.output_directory.join(&self.vm_name)
    }
}
