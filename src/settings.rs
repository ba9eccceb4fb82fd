//! Layered configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file,
//! then `VITALWATCH_*` environment variables. Nested keys use a double
//! underscore, e.g. `VITALWATCH_BROKER__URL` or `VITALWATCH_MONITOR__TOPIC`.
//!
//! ```toml
//! [broker]
//! url = "wss://broker.hivemq.com:8884/mqtt"
//! username = "station-1"
//! password = "secret"
//! reconnect_period_ms = 2000
//!
//! [monitor]
//! topic = "telemetry"
//! window_capacity = 200
//! restart = "preserve"
//! ```

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use vitalwatch_core::{
    Credentials, Endpoint, RestartPolicy, SessionConfig, SessionOptions, DEFAULT_WINDOW_CAPACITY,
    TELEMETRY_TOPIC,
};

/// Prefix of the environment variables read by [`Settings::load`].
pub const ENV_PREFIX: &str = "VITALWATCH";

/// Broker used when nothing else is configured.
pub const DEFAULT_BROKER_URL: &str = "wss://broker.hivemq.com:8884/mqtt";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub monitor: MonitorSettings,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keepalive_secs: u64,
    pub reconnect_period_ms: u64,
    pub connect_timeout_ms: u64,
    pub clean_session: bool,
    pub client_id_prefix: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            url: DEFAULT_BROKER_URL.to_string(),
            username: None,
            password: None,
            keepalive_secs: options.keepalive.as_secs(),
            reconnect_period_ms: options.reconnect_period.as_millis() as u64,
            connect_timeout_ms: options.connect_timeout.as_millis() as u64,
            clean_session: options.clean_session,
            client_id_prefix: options.client_id_prefix,
        }
    }
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("keepalive_secs", &self.keepalive_secs)
            .field("reconnect_period_ms", &self.reconnect_period_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("clean_session", &self.clean_session)
            .field("client_id_prefix", &self.client_id_prefix)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub topic: String,
    pub window_capacity: usize,
    pub restart: RestartPolicy,
    /// Status line refresh interval.
    pub refresh_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            topic: TELEMETRY_TOPIC.to_string(),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            restart: RestartPolicy::default(),
            refresh_ms: 1000,
        }
    }
}

impl Settings {
    /// Load settings from the optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    fn load_from(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let settings: Settings = builder
            .add_source(environment)
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    /// Check cross-field constraints.
    ///
    /// Not run by [`load`](Self::load), so command-line overrides can be
    /// applied first.
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;
        if self.monitor.topic.is_empty() {
            bail!("monitor.topic must not be empty");
        }
        if self.monitor.window_capacity == 0 {
            bail!("monitor.window_capacity must be at least 1");
        }
        if self.monitor.refresh_ms == 0 {
            bail!("monitor.refresh_ms must be at least 1");
        }
        if self.broker.keepalive_secs == 0 {
            bail!("broker.keepalive_secs must be at least 1");
        }
        if self.broker.reconnect_period_ms == 0 {
            bail!("broker.reconnect_period_ms must be at least 1");
        }
        if self.broker.connect_timeout_ms == 0 {
            bail!("broker.connect_timeout_ms must be at least 1");
        }
        if self.broker.password.is_some() && self.broker.username.is_none() {
            bail!("broker.password is set without broker.username");
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.broker.url)
            .with_context(|| format!("Invalid broker URL '{}'", self.broker.url))
    }

    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.broker.username.as_ref()?;
        let password = self.broker.password.as_deref().unwrap_or_default();
        Some(Credentials::new(username.as_str(), password))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            keepalive: Duration::from_secs(self.broker.keepalive_secs),
            reconnect_period: Duration::from_millis(self.broker.reconnect_period_ms),
            connect_timeout: Duration::from_millis(self.broker.connect_timeout_ms),
            clean_session: self.broker.clean_session,
            client_id_prefix: self.broker.client_id_prefix.clone(),
        }
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        let capacity = NonZeroUsize::new(self.monitor.window_capacity)
            .context("monitor.window_capacity must be at least 1")?;

        let mut config = SessionConfig::new(self.endpoint()?)
            .with_options(self.session_options())
            .with_topic(self.monitor.topic.as_str())
            .with_window_capacity(capacity)
            .with_restart_policy(self.monitor.restart);
        if let Some(credentials) = self.credentials() {
            config = config.with_credentials(credentials);
        }
        Ok(config)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.monitor.refresh_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::environment().source(Some(map))
    }

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_sources() {
        let settings = Settings::load_from(None, env(&[])).unwrap();

        assert_eq!(settings.broker.url, DEFAULT_BROKER_URL);
        assert_eq!(settings.monitor.topic, "telemetry");
        assert_eq!(settings.monitor.window_capacity, 200);
        assert_eq!(settings.monitor.restart, RestartPolicy::Preserve);
        assert!(settings.credentials().is_none());

        let options = settings.session_options();
        assert_eq!(options, SessionOptions::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let file = toml_file(
            r#"
            [broker]
            url = "mqtt://localhost:1883"
            username = "station-1"
            password = "secret"
            reconnect_period_ms = 500

            [monitor]
            window_capacity = 50
            restart = "reset"
            "#,
        );

        let settings = Settings::load_from(Some(file.path()), env(&[])).unwrap();
        assert_eq!(settings.broker.url, "mqtt://localhost:1883");
        assert_eq!(settings.broker.reconnect_period_ms, 500);
        assert_eq!(settings.broker.connect_timeout_ms, 5000);
        assert_eq!(settings.monitor.restart, RestartPolicy::Reset);

        let config = settings.session_config().unwrap();
        assert_eq!(config.window_capacity.get(), 50);
        assert_eq!(config.options.reconnect_period, Duration::from_millis(500));
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.username(), "station-1");
        assert_eq!(credentials.password(), "secret");
    }

    #[test]
    fn environment_overrides_file() {
        let file = toml_file(
            r#"
            [monitor]
            topic = "ward-3"
            "#,
        );

        let settings = Settings::load_from(
            Some(file.path()),
            env(&[
                ("VITALWATCH_MONITOR__TOPIC", "ward-4"),
                ("VITALWATCH_BROKER__URL", "ws://10.0.0.5:9001/mqtt"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.monitor.topic, "ward-4");
        assert_eq!(settings.endpoint().unwrap().port(), 9001);
    }

    #[test]
    fn rejects_invalid_settings() {
        let invalid = |contents: &str| {
            let file = toml_file(contents);
            let settings = Settings::load_from(Some(file.path()), env(&[])).unwrap();
            settings.validate().is_err()
        };

        assert!(invalid("[broker]\nurl = \"http://example.com\"\n"));
        assert!(invalid("[monitor]\nwindow_capacity = 0\n"));
        assert!(invalid("[broker]\npassword = \"secret\"\n"));
        assert!(invalid("[broker]\nkeepalive_secs = 0\n"));
        assert!(invalid("[broker]\nreconnect_period_ms = 0\n"));
        assert!(invalid("[broker]\nconnect_timeout_ms = 0\n"));
    }

    #[test]
    fn overrides_apply_before_validation() {
        let mut settings = Settings::load_from(
            None,
            env(&[
                ("VITALWATCH_BROKER__URL", "bogus"),
                ("VITALWATCH_BROKER__PASSWORD", "secret"),
            ]),
        )
        .unwrap();
        assert!(settings.validate().is_err());

        settings.broker.url = "wss://ok.example.com:8884/mqtt".to_string();
        settings.broker.username = Some("station-1".to_string());
        settings.validate().unwrap();
        assert_eq!(settings.endpoint().unwrap().port(), 8884);
    }

    #[test]
    fn debug_redacts_password() {
        let mut settings = Settings::default();
        settings.broker.username = Some("station-1".to_string());
        settings.broker.password = Some("secret".to_string());

        let debug = format!("{:?}", settings);
        assert!(debug.contains("station-1"));
        assert!(!debug.contains("secret"));
    }
}
