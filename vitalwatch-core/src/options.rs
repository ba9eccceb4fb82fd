//! Broker addressing and connection options.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::EndpointError;

/// URL scheme of a broker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// MQTT over TLS websockets.
    Wss,
    /// MQTT over plain websockets.
    Ws,
    /// MQTT over TLS.
    Mqtts,
    /// MQTT over plain TCP.
    Mqtt,
}

impl Scheme {
    /// Port used when the URL does not name one.
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Wss => 443,
            Scheme::Ws => 80,
            Scheme::Mqtts => 8883,
            Scheme::Mqtt => 1883,
        }
    }

    /// True for the TLS variants.
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Wss | Scheme::Mqtts)
    }

    /// True for the websocket variants.
    pub fn is_websocket(&self) -> bool {
        matches!(self, Scheme::Wss | Scheme::Ws)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Wss => "wss",
            Scheme::Ws => "ws",
            Scheme::Mqtts => "mqtts",
            Scheme::Mqtt => "mqtt",
        }
    }
}

impl FromStr for Scheme {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wss" => Ok(Scheme::Wss),
            "ws" => Ok(Scheme::Ws),
            "mqtts" => Ok(Scheme::Mqtts),
            "mqtt" => Ok(Scheme::Mqtt),
            other => Err(EndpointError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// A parsed broker address, e.g. `wss://broker.example.com:8884/mqtt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    /// Parse a broker URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use vitalwatch_core::{Endpoint, Scheme};
    ///
    /// let endpoint = Endpoint::parse("wss://broker.example.com:8884/mqtt").unwrap();
    /// assert_eq!(endpoint.scheme(), Scheme::Wss);
    /// assert_eq!(endpoint.host(), "broker.example.com");
    /// assert_eq!(endpoint.port(), 8884);
    /// assert_eq!(endpoint.path(), "/mqtt");
    /// ```
    pub fn parse(url: &str) -> Result<Self, EndpointError> {
        let url = url.trim();
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| EndpointError::MissingScheme(url.to_string()))?;
        let scheme: Scheme = scheme.parse()?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        // Credentials belong in configuration, not in the URL.
        let authority = authority.rsplit('@').next().unwrap_or(authority);

        let (host, port) = split_host_port(authority)?;
        if host.is_empty() {
            return Err(EndpointError::MissingHost(url.to_string()));
        }

        Ok(Self {
            url: url.to_string(),
            scheme,
            host: host.to_string(),
            port: port.unwrap_or_else(|| scheme.default_port()),
            path: path.to_string(),
        })
    }

    /// The URL as given.
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// True if the transport is encrypted.
    pub fn is_secure(&self) -> bool {
        self.scheme.is_secure()
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

fn split_host_port(authority: &str) -> Result<(&str, Option<u16>), EndpointError> {
    let parse_port = |p: &str| {
        p.parse::<u16>()
            .map_err(|_| EndpointError::InvalidPort(p.to_string()))
    };

    // Bracketed IPv6 literal
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| EndpointError::MissingHost(authority.to_string()))?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, Some(parse_port(port)?))),
            None => Ok((host, None)),
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((authority, None)),
    }
}

/// Username/password pair presented to the broker.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Delivery guarantee requested for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Session-level options applied to every connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Keepalive interval negotiated with the broker.
    pub keepalive: Duration,
    /// Flat delay between reconnection attempts.
    pub reconnect_period: Duration,
    /// Upper bound on a single handshake.
    pub connect_timeout: Duration,
    /// Ask the broker to discard any previous session state.
    pub clean_session: bool,
    /// Prefix of the generated client id.
    pub client_id_prefix: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
            reconnect_period: Duration::from_millis(2000),
            connect_timeout: Duration::from_millis(5000),
            clean_session: true,
            client_id_prefix: "web".to_string(),
        }
    }
}

impl SessionOptions {
    /// Generate a client id for one connection attempt.
    ///
    /// Every call returns a new random token.
    pub fn client_id(&self) -> String {
        format!("{}-{:016x}", self.client_id_prefix, rand::random::<u64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_wss_with_port_and_path() {
        let endpoint = Endpoint::parse("wss://cluster.example.cloud:8884/mqtt").unwrap();
        assert_eq!(endpoint.scheme(), Scheme::Wss);
        assert_eq!(endpoint.host(), "cluster.example.cloud");
        assert_eq!(endpoint.port(), 8884);
        assert_eq!(endpoint.path(), "/mqtt");
        assert!(endpoint.is_secure());
        assert_eq!(endpoint.to_string(), "wss://cluster.example.cloud:8884/mqtt");
    }

    #[test]
    fn parse_uses_scheme_default_port() {
        assert_eq!(Endpoint::parse("wss://host/mqtt").unwrap().port(), 443);
        assert_eq!(Endpoint::parse("ws://host").unwrap().port(), 80);
        assert_eq!(Endpoint::parse("mqtts://host").unwrap().port(), 8883);
        assert_eq!(Endpoint::parse("mqtt://host").unwrap().port(), 1883);
    }

    #[test]
    fn parse_without_path_defaults_to_root() {
        let endpoint = Endpoint::parse("mqtt://localhost:1883").unwrap();
        assert_eq!(endpoint.path(), "/");
        assert!(!endpoint.is_secure());
    }

    #[test]
    fn parse_ipv6_literal() {
        let endpoint = Endpoint::parse("ws://[::1]:9001/mqtt").unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.port(), 9001);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(
            Endpoint::parse("broker:8884"),
            Err(EndpointError::MissingScheme(_))
        ));
        assert!(matches!(
            Endpoint::parse("https://broker"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Endpoint::parse("wss://:8884/mqtt"),
            Err(EndpointError::MissingHost(_))
        ));
        assert!(matches!(
            Endpoint::parse("wss://broker:notaport/mqtt"),
            Err(EndpointError::InvalidPort(_))
        ));
    }

    #[test]
    fn default_options_match_broker_contract() {
        let options = SessionOptions::default();
        assert_eq!(options.keepalive, Duration::from_secs(30));
        assert_eq!(options.reconnect_period, Duration::from_millis(2000));
        assert_eq!(options.connect_timeout, Duration::from_millis(5000));
        assert!(options.clean_session);
    }

    #[test]
    fn client_ids_are_unique_and_prefixed() {
        let options = SessionOptions::default();
        let a = options.client_id();
        let b = options.client_id();
        assert!(a.starts_with("web-"));
        assert_eq!(a.len(), "web-".len() + 16);
        assert_ne!(a, b);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("device", "s3cret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("device"));
        assert!(!debug.contains("s3cret"));
    }
}
