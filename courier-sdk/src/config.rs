//! Client configuration.

use std::fmt;
use std::sync::Arc;

use tokio_rustls::rustls;

/// Plug-in policy for nickname collisions: given the rejected nick, return a
/// replacement to try. Supplied by the consumer.
pub type NickFallback = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// SASL PLAIN credentials. Configuring these triggers capability
/// negotiation during registration.
#[derive(Debug, Clone)]
pub struct SaslConfig {
    pub username: String,
    pub password: String,
}

/// Configuration for connecting to an IRC server.
#[derive(Clone)]
pub struct Config {
    /// Server hostname. Also used as the TLS server name.
    pub host: String,
    /// Server port. Defaults to 6697 with TLS, 6667 without.
    pub port: Option<u16>,
    /// Use TLS.
    pub tls: bool,
    /// TLS configuration override. When unset, a client config with the
    /// webpki root store is built.
    pub tls_config: Option<Arc<rustls::ClientConfig>>,
    /// Server password, sent as `PASS` before registration.
    pub password: Option<String>,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident).
    pub username: String,
    /// Real name.
    pub realname: String,
    /// SASL credentials.
    pub sasl: Option<SaslConfig>,
    /// Called when the server rejects our nick during registration.
    pub nick_fallback: Option<NickFallback>,
    /// Reply string for CTCP VERSION requests.
    pub version: String,
}

impl Config {
    /// A plaintext configuration with username and realname defaulted from
    /// the nick. Adjust fields with struct-update syntax.
    pub fn new(host: &str, nick: &str) -> Self {
        Self {
            host: host.to_string(),
            port: None,
            tls: false,
            tls_config: None,
            password: None,
            nick: nick.to_string(),
            username: nick.to_string(),
            realname: nick.to_string(),
            sasl: None,
            nick_fallback: None,
            version: concat!("courier ", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// The port to dial, falling back to the scheme default.
    pub(crate) fn dial_port(&self) -> u16 {
        self.port.unwrap_or(if self.tls { 6697 } else { 6667 })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("nick", &self.nick)
            .field("username", &self.username)
            .field("realname", &self.realname)
            .field("sasl", &self.sasl.is_some())
            .field("nick_fallback", &self.nick_fallback.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        let plain = Config::new("irc.example", "alice");
        assert_eq!(plain.dial_port(), 6667);

        let tls = Config {
            tls: true,
            ..Config::new("irc.example", "alice")
        };
        assert_eq!(tls.dial_port(), 6697);

        let explicit = Config {
            port: Some(7000),
            tls: true,
            ..Config::new("irc.example", "alice")
        };
        assert_eq!(explicit.dial_port(), 7000);
    }
}
