//! Error types for the client engine.

use tokio_rustls::rustls;

/// Errors surfaced on the `connection_changed` channel and from the
/// transport layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer sent a line that does not parse as IRC. Terminal.
    #[error("this server does not speak IRC")]
    BadProtocol,

    /// The dial did not complete within the connect timeout.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// The TLS certificate chain is not trusted. Fatal: no retries are
    /// scheduled until the consumer repairs the configuration.
    #[error("server certificate is not trusted: {0}")]
    UntrustedCertificate(#[source] rustls::Error),

    /// The configured host is not a valid TLS server name.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),

    /// The server closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Fatal errors stop the reconnect loop; everything else is retried
    /// after backoff.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UntrustedCertificate(_) | Error::InvalidServerName(_))
    }
}

/// Classify a TLS handshake failure: an untrusted certificate chain is
/// fatal, anything else is a transient I/O error.
pub(crate) fn classify_tls_error(err: std::io::Error) -> Error {
    if let Some(tls_err) = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        if matches!(
            tls_err,
            rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer)
        ) {
            return Error::UntrustedCertificate(tls_err.clone());
        }
    }
    Error::Io(err)
}
