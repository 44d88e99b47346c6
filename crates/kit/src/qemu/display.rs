//! `-display` argument and the headless/VNC notices.

use indoc::{formatdoc, indoc};

use super::{Fragments, QemuTier};
use crate::config::Config;
use crate::facts::RuntimeFacts;

/// Display used when none is configured and QEMU's own default isn't wanted.
pub const FALLBACK_DISPLAY: &str = "gtk";

/// Compute the display flag, or the notice explaining how to reach a
/// headless VM.
pub fn build(config: &Config, facts: &RuntimeFacts, tier: QemuTier) -> Fragments {
    let mut out = Fragments::default();

    if config.headless {
        out.message(headless_notice(config, facts));
        return out;
    }

    if !tier.supports_display() {
        out.message(indoc! {"
            WARNING: The version of qemu on your host doesn't support display mode.
            The display parameter will be ignored."});
        return out;
    }

    match config.display.as_deref() {
        Some("none") => {}
        Some(display) => out.flags.set("-display", display),
        None if !config.use_default_display => out.flags.set("-display", FALLBACK_DISPLAY),
        None => {}
    }
    out
}

fn headless_notice(config: &Config, facts: &RuntimeFacts) -> String {
    let addr = &config.vnc_bind_address;
    match (facts.vnc_port, facts.vnc_password()) {
        (Some(port), Some(password)) => formatdoc! {"
            The VM will be run headless, without a GUI. If you want to
            view the screen of the VM, connect via VNC to vnc://{addr}:{port}
            with the password: {password}"},
        (Some(port), None) => formatdoc! {"
            The VM will be run headless, without a GUI. If you want to
            view the screen of the VM, connect via VNC without a password to
            vnc://{addr}:{port}"},
        (None, _) => String::from(indoc! {"
            The VM will be run headless, without a GUI, as configured.
            If the run isn't succeeding as you expect, please enable the GUI
            to inspect the progress of the build."}),
    }
}
