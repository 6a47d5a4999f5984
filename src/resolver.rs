use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SocksError};

/// NameResolver turns the domain form of a destination into an IP
/// address. The token is cancelled when the owning connection goes
/// away, so a slow lookup never outlives its client.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, name: &str, cancel: &CancellationToken) -> Result<IpAddr>;
}

/// SystemResolver uses the operating system's name resolution via
/// tokio's resolver thread pool
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl NameResolver for SystemResolver {
    async fn resolve(&self, name: &str, cancel: &CancellationToken) -> Result<IpAddr> {
        let lookup = tokio::net::lookup_host((name, 0));

        let mut addrs = tokio::select! {
            res = lookup => res.map_err(|e| SocksError::ResolutionFailed {
                name: name.to_string(),
                source: e,
            })?,
            _ = cancel.cancelled() => {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "resolution cancelled",
                )
                .into());
            }
        };

        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| SocksError::ResolutionFailed {
                name: name.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            })
    }
}
