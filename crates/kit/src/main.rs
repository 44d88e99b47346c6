//! qemu-runstep - compute the QEMU command line for a build VM and run it

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context as _};
use color_eyre::{Report, Result};

mod command_run;
mod config;
mod driver;
mod facts;
mod qemu;
mod run_step;
mod ui;
mod utils;

use config::Config;
use driver::QemuDriver;
use facts::RuntimeFacts;
use qemu::{FieldRenderer, QemuTier};
use run_step::{RunStep, StepAction};
use ui::{TracingUi, Ui};

/// Compute and launch QEMU command lines for build VMs.
///
/// The command line is derived from a JSON build configuration plus facts
/// discovered by earlier build steps (allocated ports, generated media,
/// the emulator version), with user `qemuargs` overrides applied last.
#[derive(Parser)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by the commands that compute arguments.
#[derive(Args, Debug)]
struct InputOpts {
    /// Build configuration (JSON)
    #[clap(long)]
    config: Utf8PathBuf,

    /// Runtime facts from earlier build steps (JSON)
    #[clap(long)]
    facts: Option<Utf8PathBuf>,
}

impl InputOpts {
    fn load(&self) -> Result<(Config, RuntimeFacts)> {
        let config = Config::from_file(&self.config)?;
        let facts = match self.facts.as_deref() {
            Some(path) => RuntimeFacts::from_file(path)?,
            None => RuntimeFacts::default(),
        };
        Ok((config, facts))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the computed QEMU arguments without launching anything
    Args {
        #[clap(flatten)]
        input: InputOpts,

        /// Emulator version to target instead of the probed one
        #[clap(long)]
        qemu_version: Option<String>,

        /// Emulator binary probed when no version is known
        #[clap(long)]
        qemu_binary: Option<String>,

        /// Output a JSON array instead of one argument per line
        #[clap(long)]
        json: bool,
    },

    /// Launch the VM and wait for it to exit
    Run {
        #[clap(flatten)]
        input: InputOpts,

        /// Emulator binary, looked up in $PATH
        #[clap(long)]
        qemu_binary: Option<String>,
    },

    /// Print the emulator version and capability tier
    Version {
        /// Emulator binary, looked up in $PATH
        #[clap(long)]
        qemu_binary: Option<String>,
    },
}

/// Install and configure the tracing/logging system.
///
/// Logs are filtered by the RUST_LOG environment variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let format = fmt::format().without_time().with_target(false).compact();

    let fmt_layer = fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

/// Fill in the emulator version from the binary if no earlier step recorded it.
fn ensure_version(facts: &mut RuntimeFacts, driver: impl FnOnce() -> Result<QemuDriver>) -> Result<()> {
    if facts.qemu_version.is_none() {
        let version = driver()?.version()?;
        tracing::debug!("Probed QEMU version {version}");
        facts.qemu_version = Some(version);
    }
    Ok(())
}

fn print_args(
    input: &InputOpts,
    qemu_version: Option<String>,
    qemu_binary: Option<&str>,
    json: bool,
) -> Result<()> {
    let (config, mut facts) = input.load()?;
    if qemu_version.is_some() {
        facts.qemu_version = qemu_version;
    }
    ensure_version(&mut facts, || QemuDriver::locate(qemu_binary))?;

    let mut advisories = Vec::new();
    let argv = qemu::compute_argv(&config, &facts, &FieldRenderer, &mut advisories);
    let ui = TracingUi;
    for advisory in &advisories {
        ui.advise(advisory);
    }
    let argv = argv.context("Error processing QemuArgs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&argv)?);
    } else {
        for arg in &argv {
            println!("{arg}");
        }
    }
    Ok(())
}

fn run_vm(input: &InputOpts, qemu_binary: Option<&str>) -> Result<()> {
    let (config, mut facts) = input.load()?;
    let driver = QemuDriver::locate(qemu_binary)?;
    ensure_version(&mut facts, || Ok(driver.clone()))?;

    let ui = TracingUi;
    let mut step = RunStep::new(driver);
    if step.run(&config, &facts, &ui, &FieldRenderer) == StepAction::Halt {
        step.cleanup(&ui);
        return Err(eyre!("VM failed to start"));
    }

    let waited = match step.handle_mut() {
        Some(process) => process.wait().context("Waiting for QEMU"),
        None => Err(eyre!("VM is not running")),
    };
    step.cleanup(&ui);
    tracing::debug!("Run step finished in state {}", step.state());
    let status = waited?;
    if !status.success() {
        return Err(eyre!("QEMU exited with {status}"));
    }
    tracing::info!("VM exited");
    Ok(())
}

fn print_version(qemu_binary: Option<&str>) -> Result<()> {
    let driver = QemuDriver::locate(qemu_binary)?;
    let version = driver.version()?;
    let tier = QemuTier::from_version_str(&version)?;
    println!("{}: {version} ({tier})", driver.binary());
    Ok(())
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Args {
            input,
            qemu_version,
            qemu_binary,
            json,
        } => print_args(&input, qemu_version, qemu_binary.as_deref(), json)?,
        Commands::Run { input, qemu_binary } => run_vm(&input, qemu_binary.as_deref())?,
        Commands::Version { qemu_binary } => print_version(qemu_binary.as_deref())?,
    }
    Ok(())
}
