//! Launching and stopping the QEMU process.

use std::io;
use std::process::{Child, Command, ExitStatus};

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use thiserror::Error;

use crate::command_run::CommandRun;

/// Emulator used when no binary is given explicitly.
pub const DEFAULT_QEMU_BINARY: &str = "qemu-system-x86_64";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn {binary}")]
    Spawn {
        binary: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("failed to kill process {pid}")]
    Kill {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to reap process {pid}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// Starts and stops a process from a computed argument vector.
pub trait ProcessLauncher {
    type Handle;

    fn launch(&mut self, argv: &[String]) -> Result<Self::Handle, LaunchError>;

    /// Single attempt; the handle is consumed either way.
    fn stop(&mut self, handle: Self::Handle) -> Result<(), StopError>;
}

/// Runs a QEMU system emulator binary.
#[derive(Debug, Clone)]
pub struct QemuDriver {
    binary: Utf8PathBuf,
}

impl QemuDriver {
    /// Use `binary` as is, without looking it up.
    pub fn with_binary(binary: impl Into<Utf8PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Resolve `binary` (or [`DEFAULT_QEMU_BINARY`]) via `$PATH`.
    pub fn locate(binary: Option<&str>) -> Result<Self> {
        let name = binary.unwrap_or(DEFAULT_QEMU_BINARY);
        let path = which::which(name).with_context(|| format!("Locating {name}"))?;
        let binary = Utf8PathBuf::try_from(path).context("QEMU binary path is not UTF-8")?;
        tracing::debug!("Using QEMU binary {binary}");
        Ok(Self::with_binary(binary))
    }

    pub fn binary(&self) -> &Utf8Path {
        &self.binary
    }

    /// Ask the emulator for its version.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .run_get_string()
            .with_context(|| format!("Querying {} version", self.binary))?;
        parse_version_output(&output)
            .map(ToOwned::to_owned)
            .ok_or_else(|| eyre!("Unrecognized version output from {}: {output}", self.binary))
    }
}

/// Extract the version from `-version` output, e.g.
/// `QEMU emulator version 2.11.1(Debian 1:2.11+dfsg-1ubuntu7)` gives `2.11.1`.
pub fn parse_version_output(output: &str) -> Option<&str> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("version ")?;
        let rest = rest.trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let version = rest[..end].trim_end_matches('.');
        (!version.is_empty()).then_some(version)
    })
}

/// A running emulator.
#[derive(Debug)]
pub struct QemuProcess {
    child: Child,
}

impl QemuProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Block until the emulator exits on its own.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

impl ProcessLauncher for QemuDriver {
    type Handle = QemuProcess;

    fn launch(&mut self, argv: &[String]) -> Result<QemuProcess, LaunchError> {
        tracing::debug!("Executing {} {}", self.binary, argv.join(" "));
        let child = Command::new(&self.binary)
            .args(argv)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        tracing::debug!("Started QEMU with pid {}", child.id());
        Ok(QemuProcess { child })
    }

    fn stop(&mut self, mut handle: QemuProcess) -> Result<(), StopError> {
        let pid = handle.id();
        match handle.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!("QEMU process {pid} already exited: {status}");
                return Ok(());
            }
            Ok(None) => {}
            Err(source) => return Err(StopError::Wait { pid, source }),
        }
        // Racing with a natural exit is fine: kill() then reports InvalidInput
        match handle.child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(source) => return Err(StopError::Kill { pid, source }),
        }
        let status = handle
            .child
            .wait()
            .map_err(|source| StopError::Wait { pid, source })?;
        tracing::debug!("QEMU process {pid} stopped: {status}");
        Ok(())
    }
}
