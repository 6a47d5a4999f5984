use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::address::Host;
use crate::auth::{self, Authenticator, NoAuth, UserPassAuthenticator};
use crate::credentials::CredentialStore;
use crate::error::{Result, SocksError};
use crate::protocol::{Command, ReplyCode};
use crate::relay;
use crate::request::{Request, send_reply};
use crate::resolver::{NameResolver, SystemResolver};
use crate::ruleset::{RuleSet, permit_all};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Socks5Server is a SOCKS5 proxy server and its immutable
/// configuration: the priority-ordered authenticators, the access
/// rules, the name resolver, and an optional fallback bind address
/// for replies
pub struct Socks5Server {
    listen_addr: String,
    authenticators: Vec<Arc<dyn Authenticator>>,
    rules: Arc<dyn RuleSet>,
    resolver: Arc<dyn NameResolver>,
    bind_addr: Option<SocketAddr>,
    connect_timeout: Duration,
    listener: Option<TcpListener>,
}

/// Socks5Server implementation block
impl Socks5Server {
    /// new is a constructor for the Socks5Server type. Without
    /// further configuration the server accepts every client
    /// (no-auth), permits every command, and resolves names with the
    /// system resolver.
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            authenticators: Vec::new(),
            rules: Arc::new(permit_all()),
            resolver: Arc::new(SystemResolver),
            bind_addr: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            listener: None,
        }
    }

    /// with_authenticator appends an authenticator; earlier additions
    /// take priority during method negotiation
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticators.push(Arc::new(authenticator));
        self
    }

    /// with_credentials enables RFC1929 username/password
    /// authentication against the given store
    pub fn with_credentials(self, credentials: impl CredentialStore + 'static) -> Self {
        self.with_authenticator(UserPassAuthenticator::new(credentials))
    }

    /// with_rules replaces the access-control policy
    pub fn with_rules(mut self, rules: impl RuleSet + 'static) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    /// with_resolver replaces the name resolver
    pub fn with_resolver(mut self, resolver: impl NameResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// with_bind_addr sets the address reported in success replies
    /// when the upstream socket's local address is unavailable
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// with_connect_timeout bounds the upstream dial
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// bind to the listen address, panics when called twice
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            panic!("bind can only be called once");
        }

        let listener = TcpListener::bind(&self.listen_addr).await?;
        let addr = listener.local_addr()?;
        info!("SOCKS5 proxy listening on {addr}");

        self.listener = Some(listener);
        Ok(addr)
    }

    /// run handles server spinup and listens for incoming connections
    pub async fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self.listener.take().unwrap();

        let handler = Arc::new(Handler {
            // An unconfigured server accepts everyone
            authenticators: if self.authenticators.is_empty() {
                vec![Arc::new(NoAuth) as Arc<dyn Authenticator>]
            } else {
                self.authenticators.clone()
            },
            rules: self.rules.clone(),
            resolver: self.resolver.clone(),
            bind_addr: self.bind_addr,
            connect_timeout: self.connect_timeout,
        });

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            let handler = handler.clone();

            tokio::spawn(async move {
                info!("new client: {peer_addr}");
                if let Err(e) = handler.serve_conn(stream).await {
                    error!("connection error from {peer_addr}: {e}");
                }
            });
        }
    }
}

/// Handler is the per-connection driver shared across accepted
/// connections. All fields are read-only after construction.
struct Handler {
    authenticators: Vec<Arc<dyn Authenticator>>,
    rules: Arc<dyn RuleSet>,
    resolver: Arc<dyn NameResolver>,
    bind_addr: Option<SocketAddr>,
    connect_timeout: Duration,
}

/// Handler implementation block
impl Handler {
    /// serve_conn drives one client connection through the protocol:
    /// method negotiation, authentication, request parsing, policy,
    /// and command execution
    async fn serve_conn(&self, mut stream: TcpStream) -> Result<()> {
        // Cancelled when this connection's work ends, aborting any
        // in-flight name resolution
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let auth = auth::negotiate(&mut stream, &self.authenticators).await?;

        let request = match Request::read_from(&mut stream, auth).await {
            Ok(request) => request,
            Err(e) => return Err(reply_failure(&mut stream, e).await),
        };

        let Some(command) = Command::from_byte(request.command) else {
            let err = SocksError::CommandNotSupported(request.command);
            return Err(reply_failure(&mut stream, err).await);
        };

        // Policy gates every recognized command before execution
        if !self.rules.allow(&request) {
            return Err(reply_failure(&mut stream, SocksError::ConnectionNotAllowed).await);
        }

        match command {
            Command::Connect => self.execute_connect(stream, request, &cancel).await,
            // BIND and ASSOCIATE are recognized extension points with
            // no implementation behind them
            Command::Bind | Command::UdpAssociate => {
                let err = SocksError::CommandNotSupported(request.command);
                Err(reply_failure(&mut stream, err).await)
            }
        }
    }

    /// execute_connect performs the CONNECT command: name resolution,
    /// bounded upstream dial, success reply, relay
    async fn execute_connect(
        &self,
        mut stream: TcpStream,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ip = match &request.dest.host {
            Host::Ip(ip) => *ip,
            Host::Domain(name) => match self.resolver.resolve(name, cancel).await {
                Ok(ip) => ip,
                Err(e) => return Err(reply_failure(&mut stream, e).await),
            },
        };
        let target = request.dest.socket_addr(ip);

        let upstream = match timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(upstream)) => upstream,
            Ok(Err(e)) => {
                let err = SocksError::from_connect_error(e);
                return Err(reply_failure(&mut stream, err).await);
            }
            Err(_) => return Err(reply_failure(&mut stream, SocksError::TtlExpired).await),
        };

        // Report the upstream socket's local address, falling back to
        // the configured bind address
        let bound = upstream.local_addr().ok().or(self.bind_addr);
        send_reply(&mut stream, ReplyCode::Succeeded, bound).await?;

        info!("CONNECT {} established", request.dest);
        relay::run(stream, upstream).await;
        Ok(())
    }
}

/// reply_failure makes a best-effort reply write for errors raised
/// after method selection, then hands the error back for logging.
/// Errors with no reply code (transport failures, pre-reply protocol
/// errors) just close the connection.
async fn reply_failure(stream: &mut TcpStream, err: SocksError) -> SocksError {
    if let Some(code) = err.reply_code() {
        let _ = send_reply(stream, code, None).await;
    }
    err
}
