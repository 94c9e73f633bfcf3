use crate::config::NotificationsConfig;
use std::io::Write;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Delivers the user-facing "blink more" reminders
pub trait NotificationsManager: Send + Sync {
    fn notify_with_sound(&self);
    fn notify_with_vibration(&self);
}

/// Receives errors that components could not handle themselves
pub trait ErrorHandler: Send + Sync {
    fn consume(&self, component: &str, error: &str);
}

/// Terminal bell plus optional external commands
pub struct SystemNotifications {
    terminal_bell: bool,
    sound_command: Option<Vec<String>>,
    vibration_command: Option<Vec<String>>,
}

impl SystemNotifications {
    pub fn new(config: &NotificationsConfig) -> Self {
        Self {
            terminal_bell: config.terminal_bell,
            sound_command: config.sound_command.as_deref().and_then(split_command),
            vibration_command: config.vibration_command.as_deref().and_then(split_command),
        }
    }

    fn ring_bell(&self) {
        let mut stdout = std::io::stdout();
        if let Err(e) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
            warn!("Failed to ring terminal bell: {}", e);
        }
    }
}

impl NotificationsManager for SystemNotifications {
    fn notify_with_sound(&self) {
        info!("Blink reminder (sound)");
        if self.terminal_bell {
            self.ring_bell();
        }
        if let Some(command) = &self.sound_command {
            run_detached("sound", command.clone());
        }
    }

    fn notify_with_vibration(&self) {
        info!("Blink reminder (vibration)");
        match &self.vibration_command {
            Some(command) => run_detached("vibration", command.clone()),
            None => debug!("No vibration command configured"),
        }
    }
}

fn split_command(command: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = command.split_whitespace().map(String::from).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Spawn a notification command without waiting for it
fn run_detached(kind: &'static str, command: Vec<String>) {
    tokio::spawn(async move {
        let (program, args) = match command.split_first() {
            Some(split) => split,
            None => return,
        };

        match Command::new(program).args(args).status().await {
            Ok(status) if status.success() => {
                debug!("{} notification command finished", kind);
            }
            Ok(status) => {
                warn!("{} notification command exited with {}", kind, status);
            }
            Err(e) => {
                error!("Failed to run {} notification command '{}': {}", kind, program, e);
            }
        }
    });
}

/// Error handler that writes every error to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn consume(&self, component: &str, error: &str) {
        error!(component = component, "{}", error);
    }
}
