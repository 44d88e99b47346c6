//! The run step: compute the command line, start the VM, stop it on cleanup.

use color_eyre::Report;

use crate::config::Config;
use crate::driver::ProcessLauncher;
use crate::facts::RuntimeFacts;
use crate::qemu::{compute_argv, TemplateRenderer};
use crate::ui::Ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum StepState {
    NotStarted,
    Running,
    Stopped,
    Halted,
}

/// What the surrounding build should do after [`RunStep::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    Halt,
}

/// Render an error with its sources, `outer: inner: ...`.
fn error_chain<E>(e: E) -> String
where
    E: std::error::Error + Send + Sync + 'static,
{
    format!("{:#}", Report::from(e))
}

pub struct RunStep<L: ProcessLauncher> {
    launcher: L,
    state: StepState,
    handle: Option<L::Handle>,
}

impl<L: ProcessLauncher> RunStep<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            state: StepState::NotStarted,
            handle: None,
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    /// The running process, if any.
    pub fn handle_mut(&mut self) -> Option<&mut L::Handle> {
        self.handle.as_mut()
    }

    pub fn run(
        &mut self,
        config: &Config,
        facts: &RuntimeFacts,
        ui: &dyn Ui,
        renderer: &dyn TemplateRenderer,
    ) -> StepAction {
        if self.state != StepState::NotStarted {
            tracing::warn!("Run step invoked in state {}, ignoring", self.state);
            return StepAction::Halt;
        }

        ui.say(if config.disk_image {
            "Starting VM, booting disk image"
        } else {
            "Starting VM, booting from CD-ROM"
        });

        let mut advisories = Vec::new();
        let argv = compute_argv(config, facts, renderer, &mut advisories);
        // Shown even when computing the arguments failed part way
        for advisory in &advisories {
            ui.advise(advisory);
        }
        let argv = match argv {
            Ok(argv) => argv,
            Err(e) => return self.halt(ui, format!("Error processing QemuArgs: {}", error_chain(e))),
        };

        match self.launcher.launch(&argv) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = StepState::Running;
                StepAction::Continue
            }
            Err(e) => self.halt(ui, format!("Error launching VM: {}", error_chain(e))),
        }
    }

    fn halt(&mut self, ui: &dyn Ui, message: String) -> StepAction {
        ui.error(&message);
        self.state = StepState::Halted;
        StepAction::Halt
    }

    /// Stop the VM if it is running. Failures are reported, never raised.
    pub fn cleanup(&mut self, ui: &dyn Ui) {
        let Some(handle) = self.handle.take() else {
            tracing::debug!("No VM to stop (state: {})", self.state);
            return;
        };
        if let Err(e) = self.launcher.stop(handle) {
            ui.error(&format!("Error shutting down VM: {}", error_chain(e)));
        }
        self.state = StepState::Stopped;
    }
}
