use std::io;

use thiserror::Error;

use crate::protocol::ReplyCode;

/// SocksError covers every failure a connection can hit, from the
/// first version byte through upstream dialing. Variants that occur
/// after method selection carry a reply code so the connection driver
/// can send a best-effort reply before closing.
#[derive(Debug, Error)]
pub enum SocksError {
    #[error("unsupported SOCKS version: {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("no supported authentication method offered")]
    NoSupportedAuth,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("malformed auth subnegotiation: {0}")]
    MalformedSubnegotiation(String),

    #[error("unrecognized address type: {0:#04x}")]
    UnrecognizedAddrType(u8),

    #[error("command not supported: {0:#04x}")]
    CommandNotSupported(u8),

    #[error("connection not allowed by ruleset")]
    ConnectionNotAllowed,

    #[error("failed to resolve {name}")]
    ResolutionFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("network unreachable")]
    NetworkUnreachable,

    #[error("host unreachable")]
    HostUnreachable,

    #[error("connection refused by destination")]
    ConnectionRefused,

    #[error("upstream connect timed out")]
    TtlExpired,

    #[error("general server failure")]
    General(#[source] io::Error),

    /// Transport-level failure: short read, peer reset, etc.
    /// No reply is possible or useful for these.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SocksError {
    /// reply_code maps an error to the REP code the client should see.
    /// Returns None when the connection must be dropped without a reply
    /// (version mismatch, transport errors) or when the failing phase
    /// already wrote its own reply bytes (auth negotiation).
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            SocksError::UnrecognizedAddrType(_) => Some(ReplyCode::AddrTypeUnsupported),
            SocksError::CommandNotSupported(_) => Some(ReplyCode::CommandNotSupported),
            SocksError::ConnectionNotAllowed => Some(ReplyCode::ConnectionNotAllowed),
            SocksError::ResolutionFailed { .. } => Some(ReplyCode::HostUnreachable),
            SocksError::NetworkUnreachable => Some(ReplyCode::NetworkUnreachable),
            SocksError::HostUnreachable => Some(ReplyCode::HostUnreachable),
            SocksError::ConnectionRefused => Some(ReplyCode::ConnectionRefused),
            SocksError::TtlExpired => Some(ReplyCode::TtlExpired),
            SocksError::General(_) => Some(ReplyCode::ServerFailure),
            SocksError::UnsupportedVersion(_)
            | SocksError::NoSupportedAuth
            | SocksError::AuthenticationFailed
            | SocksError::MalformedSubnegotiation(_)
            | SocksError::Io(_) => None,
        }
    }

    /// from_connect_error classifies an upstream dial failure
    pub(crate) fn from_connect_error(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => SocksError::ConnectionRefused,
            io::ErrorKind::HostUnreachable => SocksError::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => SocksError::NetworkUnreachable,
            io::ErrorKind::TimedOut => SocksError::TtlExpired,
            _ => SocksError::General(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, SocksError>;
