//! User agent configuration.

use std::net::IpAddr;

/// Configuration for one registrar account.
#[derive(Debug, Clone)]
pub struct SipClientConfig {
    /// Registrar host (name or address).
    pub server: String,
    /// Registrar port.
    pub port: u16,
    /// Account username at the registrar.
    pub username: String,
    /// Account password for digest authentication.
    pub password: String,
    /// Display name advertised in From.
    pub display_name: String,
    /// Local address to bind; autodetected toward the registrar when
    /// unset.
    pub bind_ip: Option<IpAddr>,
    /// Local port to bind; defaults to 5060. Zero picks an ephemeral
    /// port.
    pub bind_port: Option<u16>,
    /// Registration lifetime requested from the registrar.
    pub expires: u32,
}

impl SipClientConfig {
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port: 5060,
            username: username.into(),
            password: password.into(),
            display_name: "voicebridge".to_string(),
            bind_ip: None,
            bind_port: None,
            expires: 3600,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_bind(mut self, ip: Option<IpAddr>, port: Option<u16>) -> Self {
        self.bind_ip = ip;
        self.bind_port = port;
        self
    }

    pub fn with_expires(mut self, expires: u32) -> Self {
        self.expires = expires;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SipClientConfig::new("fritz.box", "930", "secret");
        assert_eq!(config.port, 5060);
        assert_eq!(config.expires, 3600);
        assert!(config.bind_ip.is_none());
    }
}
