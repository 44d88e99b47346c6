use std::io::{Read, Seek, SeekFrom};
use std::process::Command;

use color_eyre::eyre::{eyre, Context, Result};

/// Only the tail of stderr is kept for error messages; QEMU can be chatty.
const MAX_STDERR_BYTES: u64 = 1024;

/// Helpers intended for [`std::process::Command`].
pub trait CommandRun {
    /// Execute the child process to completion, failing on a non-zero exit.
    fn run(&mut self) -> Result<()>;

    /// Execute the child process and capture its stdout as a string.
    fn run_get_string(&mut self) -> Result<String>;
}

/// Read at most [`MAX_STDERR_BYTES`] from the end of `f`.
fn stderr_tail(f: &mut std::fs::File) -> String {
    let len = match f.metadata() {
        Ok(m) => m.len(),
        Err(e) => {
            tracing::warn!("failed to fstat stderr: {e}");
            return String::new();
        }
    };
    let start = len.saturating_sub(MAX_STDERR_BYTES);
    let mut buf = Vec::new();
    match f
        .seek(SeekFrom::Start(start))
        .and_then(|_| f.read_to_end(&mut buf))
    {
        Ok(_) => String::from_utf8_lossy(&buf).into_owned(),
        Err(e) => {
            tracing::warn!("failed to read stderr: {e}");
            "<failed to read stderr>".to_owned()
        }
    }
}

impl CommandRun for Command {
    fn run(&mut self) -> Result<()> {
        let mut stderr = tempfile::tempfile()?;
        self.stderr(stderr.try_clone()?);
        tracing::trace!("exec: {self:?}");
        let program = self.get_program().to_string_lossy().into_owned();
        let status = self
            .status()
            .with_context(|| format!("Failed to execute {program}"))?;
        if status.success() {
            return Ok(());
        }
        Err(eyre!(
            "{program} failed: {status}\n{}",
            stderr_tail(&mut stderr)
        ))
    }

    fn run_get_string(&mut self) -> Result<String> {
        let mut stdout = tempfile::tempfile()?;
        self.stdout(stdout.try_clone()?);
        self.run()?;
        stdout.seek(SeekFrom::Start(0)).context("seek")?;
        let mut s = String::new();
        stdout
            .read_to_string(&mut s)
            .context("Reading command output")?;
        Ok(s)
    }
}
