//! Error types for the agent.
//!
//! # Design
//! Every fatal condition of a fetch chain lands in one `AgentError`. Depth
//! exhaustion and refused off-site redirects are not errors; the controller
//! absorbs them and returns whatever it has. Each variant maps to the numeric
//! status callers can inspect through `AgentError::status`.

use std::{fmt, io};

use thiserror::Error;

/// Status reported when a read times out.
pub const STATUS_READ_TIMEOUT: i32 = -100;

const CODE_SOCKET: i32 = -3;
const CODE_DNS: i32 = -4;
const CODE_REFUSED: i32 = -5;

/// What went wrong while establishing (or using) a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    DnsFailure,
    ConnectionRefused,
    SocketError,
    TlsError,
}

/// A connection failure with the underlying numeric code.
#[derive(Debug, Error)]
#[error("{kind} ({code}): {message}")]
pub struct ConnectError {
    pub kind: ConnectErrorKind,
    pub code: i32,
    pub message: String,
}

impl fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectErrorKind::DnsFailure => "dns lookup failure",
            ConnectErrorKind::ConnectionRefused => "connection refused or timed out",
            ConnectErrorKind::SocketError => "socket error",
            ConnectErrorKind::TlsError => "tls handshake failed",
        };
        f.write_str(text)
    }
}

impl ConnectError {
    pub fn dns(message: impl Into<String>) -> Self {
        Self {
            kind: ConnectErrorKind::DnsFailure,
            code: CODE_DNS,
            message: message.into(),
        }
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self {
            kind: ConnectErrorKind::TlsError,
            code: 0,
            message: message.into(),
        }
    }

    /// Classify an I/O error raised while connecting or talking to the peer.
    pub fn from_io(err: &io::Error) -> Self {
        let (kind, fallback) = match err.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut => {
                (ConnectErrorKind::ConnectionRefused, CODE_REFUSED)
            }
            _ => (ConnectErrorKind::SocketError, CODE_SOCKET),
        };
        Self {
            kind,
            code: err.raw_os_error().unwrap_or(fallback),
            message: err.to_string(),
        }
    }
}

/// Errors returned by `Agent` operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The URI scheme is neither `http` nor `https`. No connection is made.
    #[error("invalid protocol \"{scheme}\"")]
    InvalidProtocol { scheme: String },

    /// The URI has a supported scheme but could not be parsed.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The session configuration cannot serve this request.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// No data arrived within the configured read timeout.
    #[error("read timed out")]
    ReadTimeout,

    /// The response body could not be decoded (gzip or chunked framing).
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller cancelled the chain through its `CancelToken`.
    #[error("request cancelled")]
    Cancelled,
}

impl AgentError {
    /// Numeric status that accompanies this failure.
    pub fn status(&self) -> i32 {
        match self {
            AgentError::ReadTimeout => STATUS_READ_TIMEOUT,
            AgentError::Connect(err) => err.code,
            _ => 0,
        }
    }

    /// Map an I/O error from the read phase, treating socket timeouts as
    /// `ReadTimeout`.
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => AgentError::ReadTimeout,
            _ => AgentError::Connect(ConnectError::from_io(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_timeout_reports_minus_100() {
        assert_eq!(AgentError::ReadTimeout.status(), -100);
    }

    #[test]
    fn refused_without_errno_uses_fallback_code() {
        let err = ConnectError::from_io(&io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(err.kind, ConnectErrorKind::ConnectionRefused);
        assert_eq!(err.code, -5);
        assert!(err.to_string().starts_with("connection refused or timed out (-5)"));
    }

    #[test]
    fn would_block_on_read_is_a_timeout() {
        let err = AgentError::from_read(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(matches!(err, AgentError::ReadTimeout));
    }

    #[test]
    fn invalid_protocol_message_names_scheme() {
        let err = AgentError::InvalidProtocol {
            scheme: "ftp".to_string(),
        };
        assert_eq!(err.to_string(), "invalid protocol \"ftp\"");
        assert_eq!(err.status(), 0);
    }
}
