//! Connection and session state enumerations.

/// State of the single broker connection owned by a monitoring session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// No connection has been requested yet.
    #[default]
    Idle,
    /// The first handshake is in progress.
    Connecting,
    /// The link is established.
    Connected,
    /// The link dropped (or a handshake failed) and a retry is pending or in progress.
    Reconnecting,
    /// Closed explicitly by the owner.
    Disconnected,
    /// The last handshake failed, or the link hit an unrecoverable error.
    Failed,
}

impl ConnectionState {
    /// Returns the display label for this state.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
        }
    }

    /// True when telemetry can flow.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl core::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// Composite status of a monitoring session as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionStatus {
    /// Monitoring is off.
    #[default]
    Stopped,
    /// `start()` was called; the pipeline has not yet observed the connection.
    Starting,
    /// The pipeline is live; carries the connection's current sub-state.
    Running(ConnectionState),
}

impl SessionStatus {
    /// True unless the session is stopped.
    pub fn is_live(&self) -> bool {
        !matches!(self, SessionStatus::Stopped)
    }
}

/// What a restarted session does with the readings it accumulated before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RestartPolicy {
    /// Keep live readings and the pressure window across stop/start.
    #[default]
    Preserve,
    /// Empty them when the session is started again.
    Reset,
}
