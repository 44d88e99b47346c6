//! Facts discovered by earlier build steps.
//!
//! These are read-only inputs to argument synthesis: the probed emulator
//! version, allocated ports, and paths of generated media.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeFacts {
    /// Raw version string reported by the emulator, e.g. "2.11.1"
    pub qemu_version: Option<String>,

    /// Allocated VNC port (absolute, not the display offset)
    pub vnc_port: Option<u16>,
    pub vnc_password: Option<String>,

    /// Host port forwarded to the guest communicator
    pub comm_host_port: Option<u16>,

    /// Data disks, in order, when not booting a pre-baked image
    pub disk_paths: Option<Vec<Utf8PathBuf>>,
    /// Auxiliary CD generated from user files
    pub cd_path: Option<Utf8PathBuf>,
    pub floppy_path: Option<Utf8PathBuf>,
    /// Installation media
    pub iso_path: Option<Utf8PathBuf>,

    /// Address and port of the build's file server
    pub http_ip: String,
    pub http_port: u16,
}

impl RuntimeFacts {
    pub fn from_file(path: &Utf8Path) -> Result<Self> {
        let buf = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read facts file {path}"))?;
        serde_json::from_str(&buf).with_context(|| format!("Failed to parse facts file {path}"))
    }

    /// The VNC password, if one was generated and is non-empty.
    pub fn vnc_password(&self) -> Option<&str> {
        self.vnc_password.as_deref().filter(|p| !p.is_empty())
    }
}
