//! A lightweight, pluggable SOCKS5 proxy server library
//!
//! - Features:
//!     - CONNECT with bounded upstream dial and bidirectional relay
//!     - No Authentication and Username/Password Authentication,
//!       extensible through the [`auth::Authenticator`] trait
//!     - Pluggable credential stores, access rules, and name resolution
//!     - Async using tokio, one task per connection
//! - [SOCKS5 (RFC 1928)](https://datatracker.ietf.org/doc/html/rfc1928)
//! - [Username/Password Authentication (RFC 1929)](https://datatracker.ietf.org/doc/html/rfc1929)
//!
//! # Example
//! ```no_run
//! use minisocks::{Socks5Server, StaticCredentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let creds: StaticCredentials = [("foo", "bar")].into_iter().collect();
//!     let mut server = Socks5Server::new("127.0.0.1:1080").with_credentials(creds);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use tokio::io::{AsyncRead, AsyncWrite};

pub mod address;
pub mod auth;
pub mod credentials;
pub mod error;
pub mod protocol;
mod relay;
pub mod request;
pub mod resolver;
pub mod ruleset;
pub mod server;

// Re-export main types at crate root for convenience
pub use address::{AddressSpec, Host};
pub use auth::{AuthContext, Authenticator, NoAuth, UserPassAuthenticator};
pub use credentials::{CredentialStore, StaticCredentials};
pub use error::{Result, SocksError};
pub use protocol::{AuthMethod, Command, ReplyCode, Version};
pub use request::Request;
pub use resolver::{NameResolver, SystemResolver};
pub use ruleset::{PermitCommand, RuleSet, permit_all, permit_none};
pub use server::Socks5Server;

/// Conn is the byte-stream contract a client connection must satisfy.
/// Implemented for anything that can be read from and written to
/// asynchronously, which keeps the protocol phases testable against
/// in-memory streams.
pub trait Conn: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Conn for T {}
