use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::Conn;
use crate::credentials::CredentialStore;
use crate::error::{Result, SocksError};
use crate::protocol::{AuthMethod, AuthStatus, USERPASS_SUBNEG_VERSION, Version};

/// AuthContext is the per-connection outcome of authentication: the
/// method that won negotiation and any data the authenticator wants
/// to hand to the rule engine (for username/password auth, the key
/// "Username" maps to the authenticated user)
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub method: u8,
    pub payload: HashMap<String, String>,
}

/// AuthContext implementation block
impl AuthContext {
    /// new constructs a context with an empty payload
    pub fn new(method: u8) -> Self {
        Self {
            method,
            payload: HashMap::new(),
        }
    }
}

/// Authenticator is one SOCKS5 authentication method. After the
/// negotiator has echoed the selected method id, the authenticator
/// owns the stream for its subnegotiation: it consumes exactly the
/// request bytes its method defines, writes its reply bytes, and
/// either produces an AuthContext or fails the connection.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// method returns the method id this authenticator negotiates
    fn method(&self) -> u8;

    async fn authenticate(&self, conn: &mut dyn Conn) -> Result<AuthContext>;
}

/// NoAuth accepts every connection without a subnegotiation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    fn method(&self) -> u8 {
        AuthMethod::NoAuth as u8
    }

    async fn authenticate(&self, _conn: &mut dyn Conn) -> Result<AuthContext> {
        Ok(AuthContext::new(self.method()))
    }
}

/// UserPassAuthenticator implements RFC1929 username/password
/// authentication against a pluggable credential store
pub struct UserPassAuthenticator {
    credentials: Arc<dyn CredentialStore>,
}

/// UserPassAuthenticator implementation block
impl UserPassAuthenticator {
    /// new wraps a credential store
    pub fn new(credentials: impl CredentialStore + 'static) -> Self {
        Self {
            credentials: Arc::new(credentials),
        }
    }
}

#[async_trait]
impl Authenticator for UserPassAuthenticator {
    fn method(&self) -> u8 {
        AuthMethod::UserPass as u8
    }

    async fn authenticate(&self, conn: &mut dyn Conn) -> Result<AuthContext> {
        // Client Username/Password Request
        // +----+------+----------+------+----------+
        // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
        // +----+------+----------+------+----------+
        // | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
        // +----+------+----------+------+----------+
        let mut ver = [0u8; 1];
        conn.read_exact(&mut ver).await?;
        if ver[0] != USERPASS_SUBNEG_VERSION {
            return Err(SocksError::MalformedSubnegotiation(format!(
                "bad subnegotiation version: {:#04x}",
                ver[0]
            )));
        }

        let username = read_length_prefixed(conn).await?;
        let password = read_length_prefixed(conn).await?;

        let username = String::from_utf8(username)
            .map_err(|_| SocksError::MalformedSubnegotiation("username is not UTF-8".into()))?;
        let password = String::from_utf8(password)
            .map_err(|_| SocksError::MalformedSubnegotiation("password is not UTF-8".into()))?;

        let status = if self.credentials.valid(&username, &password) {
            AuthStatus::Success
        } else {
            AuthStatus::Failure
        };

        // Username/Password Server response
        // +----+--------+
        // |VER | STATUS |
        // +----+--------+
        // | 1  |   1    |
        // +----+--------+
        conn.write_all(&[USERPASS_SUBNEG_VERSION, status as u8])
            .await?;

        match status {
            AuthStatus::Success => {
                let mut ctx = AuthContext::new(self.method());
                ctx.payload.insert("Username".to_string(), username);
                Ok(ctx)
            }
            AuthStatus::Failure => Err(SocksError::AuthenticationFailed),
        }
    }
}

/// read_length_prefixed reads one length byte and then that many bytes
async fn read_length_prefixed(conn: &mut dyn Conn) -> Result<Vec<u8>> {
    let mut len = [0u8; 1];
    conn.read_exact(&mut len).await?;
    let mut buf = vec![0u8; len[0] as usize];
    conn.read_exact(&mut buf).await?;
    Ok(buf)
}

/// negotiate handles the method-selection handshake: it reads the
/// client's offered methods, picks the first server-configured
/// authenticator the client supports, echoes the choice, and runs
/// that authenticator's subnegotiation
///
/// Exactly one selection reply is written: either the accepted method
/// or the no-acceptable-methods sentinel.
pub(crate) async fn negotiate<S>(
    stream: &mut S,
    authenticators: &[Arc<dyn Authenticator>],
) -> Result<AuthContext>
where
    S: Conn,
{
    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let n_methods = buf[1];

    if version != Version::SOCKS5 as u8 {
        return Err(SocksError::UnsupportedVersion(version));
    }

    // A zero-length offer is legal framing and simply matches nothing
    let mut offered = vec![0u8; n_methods as usize];
    stream.read_exact(&mut offered).await?;

    // First configured authenticator the client offers wins
    let selected = authenticators
        .iter()
        .find(|a| offered.contains(&a.method()));

    // ServerChoice method selection reply format
    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    let Some(authenticator) = selected else {
        stream
            .write_all(&[Version::SOCKS5 as u8, AuthMethod::NoAcceptable as u8])
            .await?;
        return Err(SocksError::NoSupportedAuth);
    };

    stream
        .write_all(&[Version::SOCKS5 as u8, authenticator.method()])
        .await?;

    authenticator.authenticate(stream).await
}
