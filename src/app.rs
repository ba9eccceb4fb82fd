//! Application state and keyboard commands.

use vitalwatch_core::{Connector, MonitoringSession};

use crate::status;

/// Help text shown for `?`.
pub const HELP: &str = "Enter/l: toggle live monitoring, q: quit, ?: help";

/// Main application state.
pub struct App<C: Connector> {
    pub running: bool,
    session: MonitoringSession<C>,
    last_line: Option<String>,
    status_message: Option<String>,
}

impl<C: Connector> App<C> {
    pub fn new(session: MonitoringSession<C>) -> Self {
        Self {
            running: true,
            session,
            last_line: None,
            status_message: None,
        }
    }

    pub fn session(&self) -> &MonitoringSession<C> {
        &self.session
    }

    /// True while live monitoring is on.
    pub fn is_live(&self) -> bool {
        self.session.is_started()
    }

    /// Turn live monitoring on or off.
    pub fn toggle(&mut self) {
        if self.session.is_started() {
            self.session.stop();
            self.set_status_message("Live monitoring off".to_string());
        } else {
            self.session.start();
            self.set_status_message(format!(
                "Live monitoring on ({})",
                self.session.config().endpoint
            ));
        }
    }

    /// Stop monitoring and leave the main loop.
    pub fn quit(&mut self) {
        self.session.stop();
        self.running = false;
    }

    /// Apply one line of keyboard input.
    pub fn handle_command(&mut self, line: &str) {
        match line.trim() {
            "" | "l" | "L" => self.toggle(),
            "q" | "Q" | "quit" => self.quit(),
            "?" | "h" | "help" => self.set_status_message(HELP.to_string()),
            other => self.set_status_message(format!("Unknown command '{}' ({})", other, HELP)),
        }
    }

    /// Set a message to show once, ahead of the next status line.
    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some(message);
    }

    pub fn take_status_message(&mut self) -> Option<String> {
        self.status_message.take()
    }

    /// Current status line.
    pub fn status_line(&self) -> String {
        status::status_line(
            self.session.status(),
            &self.session.live_reading(),
            &self.session.pressure_snapshot(),
        )
    }

    /// The status line, if it changed since the last call.
    pub fn poll_status_line(&mut self) -> Option<String> {
        let line = self.status_line();
        if self.last_line.as_deref() == Some(line.as_str()) {
            return None;
        }
        self.last_line = Some(line.clone());
        Some(line)
    }
}
