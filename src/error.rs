//! Error types for the client library.
//!
//! Each layer has its own `thiserror`-derived enum: transport failures feed
//! the reconnect controller, protocol violations are downgraded or logged,
//! and configuration errors are surfaced at client construction.

use thiserror::Error;

/// Convenience type alias for Results using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error umbrella for the public API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A socket, DNS, or TLS failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level violation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A configuration store or key failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Transport-layer failures.
///
/// Everything here is recoverable through the reconnect controller unless
/// the client was told to stay dead. [`TransportError::WouldBlock`] is the
/// distinct "no data yet, retry" condition and never tears a session down.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Hostname resolution produced no usable addresses.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// The hostname that failed to resolve.
        host: String,
        /// The underlying resolver error.
        #[source]
        source: std::io::Error,
    },

    /// Every candidate address refused the connection.
    #[error("unable to connect to {host}:{port}: {source}")]
    Connect {
        /// Remote hostname.
        host: String,
        /// Remote port.
        port: u16,
        /// The error from the last candidate address tried.
        #[source]
        source: std::io::Error,
    },

    /// The TLS handshake failed.
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    /// The target hostname is not a valid TLS server name.
    #[error("invalid TLS server name: {0}")]
    ServerName(String),

    /// I/O error on an established stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No data arrived within the read timeout. Retry on the next tick.
    #[error("operation timed out; retry")]
    WouldBlock,

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// The registration handshake did not complete within its time budget.
    #[error("handshake timed out")]
    HandshakeTimeout,
}

impl TransportError {
    /// Whether this error is the soft "retry later" condition rather than a
    /// dead connection.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

/// Protocol-level violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// A framed line exceeded the line-length cap. The framer discards
    /// through the next terminator and continues.
    #[error("line too long: {length} bytes (cap {cap})")]
    LineTooLong {
        /// Bytes accumulated before the line was abandoned.
        length: usize,
        /// The configured cap.
        cap: usize,
    },

    /// An outbound argument contained a CR or LF byte.
    #[error("embedded CR/LF in outbound line")]
    EmbeddedCrLf,
}

/// Failures during registration.
///
/// SASL denial is non-fatal: the handshake continues unauthenticated and the
/// server decides whether to keep the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandshakeError {
    /// SASL authentication was denied (9xx failure numeric).
    #[error("SASL authentication failed: {0}")]
    SaslFailed(String),

    /// The server sent an ERROR frame during registration.
    #[error("server error: {0}")]
    ServerError(String),
}

/// Configuration store and binding failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A key the client cannot operate without was absent from both the
    /// primary and fallback sections.
    #[error("missing required config key {key:?} in section {section:?}")]
    MissingKey {
        /// Section the lookup started in.
        section: String,
        /// The absent key.
        key: String,
    },

    /// The backing file could not be read.
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid TOML.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The store has no backing file to rehash from.
    #[error("config has no backing file")]
    NoBackingFile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::LineTooLong {
            length: 9000,
            cap: 4096,
        };
        assert_eq!(format!("{}", err), "line too long: 9000 bytes (cap 4096)");

        let err = HandshakeError::SaslFailed("bad credentials".into());
        assert_eq!(
            format!("{}", err),
            "SASL authentication failed: bad credentials"
        );
    }

    #[test]
    fn test_would_block_is_retry() {
        assert!(TransportError::WouldBlock.is_retry());
        assert!(!TransportError::Closed.is_retry());
        assert!(!TransportError::HandshakeTimeout.is_retry());
    }

    #[test]
    fn test_error_source_chaining() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TransportError::Connect {
            host: "irc.example.net".into(),
            port: 6667,
            source: io,
        };
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert_eq!(source.unwrap().to_string(), "refused");
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: Error = TransportError::Closed.into();
        assert!(matches!(err, Error::Transport(_)));

        let err: Error = ProtocolError::EmbeddedCrLf.into();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
