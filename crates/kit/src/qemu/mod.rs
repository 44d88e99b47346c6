//! QEMU command line synthesis.
//!
//! The command line is computed in three stages:
//!
//! 1. Each builder ([`misc`], [`drive`], [`network`], [`display`]) turns the
//!    [`Config`] and [`RuntimeFacts`] into a set of default flags plus
//!    advisory messages for the user. Builders never print anything
//!    themselves; the caller decides when and how to show advisories.
//! 2. [`overrides`] renders the user's `qemuargs` rows and merges them with
//!    the defaults. A flag named in the overrides replaces the default list
//!    for that flag entirely.
//! 3. The merged [`FlagMap`] is flattened into the final argument vector.
//!
//! Which dialect is emitted depends on the [`QemuTier`] derived from the
//! probed emulator version.

use thiserror::Error;

use crate::config::Config;
use crate::facts::RuntimeFacts;

pub mod display;
pub mod drive;
pub mod flags;
pub mod misc;
pub mod network;
pub mod overrides;
pub mod template;
pub mod version;

pub use flags::FlagMap;
pub use template::{FieldRenderer, InterpolationContext, TemplateError, TemplateRenderer};
pub use version::QemuTier;

/// Backend id shared by `-netdev` and the network `-device`.
pub const NETDEV_ID: &str = "user.0";

/// Errors that abort argument synthesis before anything is launched.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid QEMU version '{version}': {reason}")]
    VersionParse { version: String, reason: String },

    #[error("failed to render qemuargs template '{template}'")]
    TemplateRender {
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("missing runtime fact: {0}")]
    MissingRuntimeFact(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A message for the user produced while computing arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// A top level status line
    Say(String),
    /// Informational detail or a warning
    Message(String),
}

impl Advisory {
    #[cfg(test)]
    pub fn text(&self) -> &str {
        match self {
            Advisory::Say(s) | Advisory::Message(s) => s,
        }
    }
}

/// Output of a single builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragments {
    pub flags: FlagMap,
    pub advisories: Vec<Advisory>,
}

impl Fragments {
    pub fn message(&mut self, text: impl Into<String>) {
        self.advisories.push(Advisory::Message(text.into()));
    }

    /// Fold another builder's output into this one; list flags accumulate.
    pub fn merge(&mut self, other: Fragments) {
        self.flags.extend(other.flags);
        self.advisories.extend(other.advisories);
    }
}

/// The computed command line and the messages gathered along the way.
#[cfg(test)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    pub argv: Vec<String>,
    pub advisories: Vec<Advisory>,
}

/// Run every builder, folding its output into `out` as it completes. On
/// error `out` still holds what the earlier builders produced.
fn build_defaults(config: &Config, facts: &RuntimeFacts, out: &mut Fragments) -> Result<(), Error> {
    let raw_version = facts
        .qemu_version
        .as_deref()
        .ok_or(Error::MissingRuntimeFact("qemu_version"))?;
    let tier = QemuTier::from_version_str(raw_version)?;

    out.merge(misc::build(config, facts)?);
    out.merge(drive::build(config, facts, tier)?);
    out.merge(network::build(config, facts)?);
    out.merge(display::build(config, facts, tier));
    Ok(())
}

/// Run every builder and return the default flags, before overrides.
#[cfg(test)]
pub fn default_flags(config: &Config, facts: &RuntimeFacts) -> Result<Fragments, Error> {
    let mut out = Fragments::default();
    build_defaults(config, facts, &mut out)?;
    Ok(out)
}

/// Compute the QEMU argument vector, pushing advisories into `advisories`.
///
/// Advisories gathered before a failure are kept so the caller can still
/// show them alongside the error.
pub fn compute_argv(
    config: &Config,
    facts: &RuntimeFacts,
    renderer: &dyn TemplateRenderer,
    advisories: &mut Vec<Advisory>,
) -> Result<Vec<String>, Error> {
    let mut defaults = Fragments::default();
    let built = build_defaults(config, facts, &mut defaults);
    advisories.append(&mut defaults.advisories);
    built?;

    let merged = overrides::apply(config, facts, defaults.flags, renderer, advisories)?;
    let argv = merged.flatten();
    tracing::debug!("Computed QEMU arguments: {argv:?}");
    Ok(argv)
}

/// [`compute_argv`], collecting the advisories alongside the arguments.
#[cfg(test)]
pub fn command_args(
    config: &Config,
    facts: &RuntimeFacts,
    renderer: &dyn TemplateRenderer,
) -> Result<CommandArgs, Error> {
    let mut advisories = Vec::new();
    let argv = compute_argv(config, facts, renderer, &mut advisories)?;
    Ok(CommandArgs { argv, advisories })
}
