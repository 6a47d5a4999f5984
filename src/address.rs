use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Result, SocksError};
use crate::protocol::AddressType;

/// Host is the address half of a SOCKS5 destination: either a raw IP
/// or a domain name still to be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ip(IpAddr),
    Domain(String),
}

/// AddressSpec is a SOCKS5 destination: host plus port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpec {
    pub host: Host,
    pub port: u16,
}

/// AddressSpec implementation block
impl AddressSpec {
    /// read_from parses the ATYP, DST.ADDR and DST.PORT fields of a
    /// SOCKS5 request from the stream
    ///
    /// Malformed lengths and short reads surface as transport errors;
    /// an unknown ATYP byte is the one protocol-level failure here.
    pub async fn read_from<S>(stream: &mut S) -> Result<Self>
    where
        S: AsyncRead + Unpin,
    {
        // Read address type byte from stream
        let mut atype = [0u8; 1];
        stream.read_exact(&mut atype).await?;

        let host = match AddressType::from_byte(atype[0]) {
            Some(AddressType::IPv4) => {
                let mut addr = [0u8; 4];
                stream.read_exact(&mut addr).await?;
                Host::Ip(IpAddr::V4(Ipv4Addr::from(addr)))
            }
            Some(AddressType::DomainName) => {
                // First octet contains the number of octets to follow
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await?;
                if len[0] == 0 {
                    return Err(
                        io::Error::new(io::ErrorKind::InvalidData, "empty domain name").into()
                    );
                }

                let mut domain = vec![0u8; len[0] as usize];
                stream.read_exact(&mut domain).await?;
                let domain = String::from_utf8(domain).map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("invalid domain: {e}"))
                })?;
                Host::Domain(domain)
            }
            Some(AddressType::IPv6) => {
                let mut addr = [0u8; 16];
                stream.read_exact(&mut addr).await?;
                Host::Ip(IpAddr::V6(Ipv6Addr::from(addr)))
            }
            None => return Err(SocksError::UnrecognizedAddrType(atype[0])),
        };

        // Port -> BigEndian (network order)
        let mut port_buf = [0u8; 2];
        stream.read_exact(&mut port_buf).await?;
        let port = u16::from_be_bytes(port_buf);

        Ok(AddressSpec { host, port })
    }

    /// socket_addr pairs a resolved IP with the destination port
    pub fn socket_addr(&self, ip: IpAddr) -> SocketAddr {
        SocketAddr::new(ip, self.port)
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ip(IpAddr::V6(ip)) => write!(f, "[{ip}]:{}", self.port),
            Host::Ip(IpAddr::V4(ip)) => write!(f, "{ip}:{}", self.port),
            Host::Domain(name) => write!(f, "{name}:{}", self.port),
        }
    }
}
