//! User facing messages.

use crate::qemu::Advisory;

/// Where status, detail and error messages for the user go.
pub trait Ui {
    fn say(&self, message: &str);
    fn message(&self, message: &str);
    fn error(&self, message: &str);

    fn advise(&self, advisory: &Advisory) {
        match advisory {
            Advisory::Say(m) => self.say(m),
            Advisory::Message(m) => self.message(m),
        }
    }
}

/// Routes messages through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUi;

impl Ui for TracingUi {
    fn say(&self, message: &str) {
        tracing::info!("==> {message}");
    }

    fn message(&self, message: &str) {
        for line in message.lines() {
            tracing::info!("    {line}");
        }
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}
