//! Integration tests for qemu-runstep

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};
use serde_json::Value;
use tempfile::TempDir;
use xshell::{cmd, Shell};

pub(crate) use integration_tests::{integration_test, INTEGRATION_TESTS};

mod tests {
    pub mod args;
}

/// Get the path to the qemu-runstep binary, checking QEMU_RUNSTEP_PATH first
pub(crate) fn get_runstep_command() -> Result<String> {
    if let Ok(path) = std::env::var("QEMU_RUNSTEP_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/qemu-runstep", "target/release/qemu-runstep"]
        .into_iter()
        .find(|p| Utf8Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set QEMU_RUNSTEP_PATH={path} to run using this binary"
        ));
    }
    Ok("qemu-runstep".to_owned())
}

/// A config file and a facts file in a scratch directory.
pub(crate) struct Fixture {
    _dir: TempDir,
    pub config: Utf8PathBuf,
    pub facts: Utf8PathBuf,
}

impl Fixture {
    pub fn new(config: &Value, facts: &Value) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = Utf8Path::from_path(dir.path())
            .ok_or_else(|| eyre!("temporary directory is not UTF-8"))?;
        let config_path = root.join("config.json");
        let facts_path = root.join("facts.json");
        std::fs::write(&config_path, serde_json::to_vec_pretty(config)?)?;
        std::fs::write(&facts_path, serde_json::to_vec_pretty(facts)?)?;
        Ok(Self {
            _dir: dir,
            config: config_path,
            facts: facts_path,
        })
    }
}

/// Captured output of a finished qemu-runstep invocation
pub(crate) struct CapturedOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run `qemu-runstep args --json` against the fixture, with `extra` flags.
pub(crate) fn run_args(fixture: &Fixture, extra: &[&str]) -> Result<CapturedOutput> {
    let sh = Shell::new()?;
    let bin = get_runstep_command()?;
    let config = &fixture.config;
    let facts = &fixture.facts;
    let output = cmd!(
        sh,
        "{bin} args --config {config} --facts {facts} --json {extra...}"
    )
    .ignore_status()
    .output()?;
    Ok(CapturedOutput {
        success: output.status.success(),
        stdout: String::from_utf8(output.stdout)?,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like [`run_args`], but require success and decode the argument vector.
pub(crate) fn computed_argv(fixture: &Fixture, extra: &[&str]) -> Result<Vec<String>> {
    let out = run_args(fixture, extra)?;
    if !out.success {
        return Err(eyre!("qemu-runstep args failed: {}", out.stderr));
    }
    serde_json::from_str(&out.stdout).context("Failed to parse JSON output")
}

/// Values passed to `flag`, in order.
pub(crate) fn values_of<'a>(argv: &'a [String], flag: &str) -> Vec<&'a str> {
    argv.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].as_str())
        .collect()
}

fn main() {
    let args = Arguments::from_args();

    let tests: Vec<Trial> = INTEGRATION_TESTS
        .iter()
        .map(|test| {
            let f = test.f;
            Trial::test(test.name, move || f().map_err(|e| format!("{:?}", e).into()))
        })
        .collect();

    libtest_mimic::run(&args, tests).exit();
}
