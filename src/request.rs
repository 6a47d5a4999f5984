use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::address::AddressSpec;
use crate::auth::AuthContext;
use crate::error::{Result, SocksError};
use crate::protocol::{AddressType, RSV, ReplyCode, Version};

/// Request is a fully parsed SOCKS5 request: the command byte as sent
/// by the client (unknown values survive parsing and are rejected by
/// the executor), the destination, and the auth context of the
/// connection. Only constructed once the whole request header has
/// been read and validated; the client stream stays with the
/// connection driver so pipelined payload bytes reach the relay.
#[derive(Debug, Clone)]
pub struct Request {
    pub command: u8,
    pub dest: AddressSpec,
    pub auth: AuthContext,
}

/// Request implementation block
impl Request {
    /// read_from parses the request packet that follows a successful
    /// authentication exchange
    ///
    /// A version mismatch here is protocol-fatal: the connection is
    /// aborted without a reply.
    pub async fn read_from<S>(stream: &mut S, auth: AuthContext) -> Result<Self>
    where
        S: AsyncRead + Unpin,
    {
        // SOCKS5 request format
        // +----+-----+-------+------+----------+----------+
        // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        let mut header = [0u8; 3];
        stream.read_exact(&mut header).await?;

        let version = header[0];
        let command = header[1];
        // header[2] is RSV, read and ignored

        if version != Version::SOCKS5 as u8 {
            return Err(SocksError::UnsupportedVersion(version));
        }

        let dest = AddressSpec::read_from(stream).await?;

        Ok(Request {
            command,
            dest,
            auth,
        })
    }
}

/// send_reply writes one SOCKS5 reply packet. The bound address is
/// the upstream socket's local address on success; failure replies
/// pass None and get the unspecified IPv4 address.
pub(crate) async fn send_reply<S>(
    stream: &mut S,
    code: ReplyCode,
    bound_addr: Option<SocketAddr>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    // SOCKS5 reply format
    // +----+-----+-------+------+----------+----------+
    // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    let bound_addr = bound_addr.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    let mut reply = vec![Version::SOCKS5 as u8, code as u8, RSV];
    match bound_addr {
        SocketAddr::V4(addr) => {
            reply.push(AddressType::IPv4 as u8);
            reply.extend_from_slice(&addr.ip().octets());
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
        SocketAddr::V6(addr) => {
            reply.push(AddressType::IPv6 as u8);
            reply.extend_from_slice(&addr.ip().octets());
            reply.extend_from_slice(&addr.port().to_be_bytes());
        }
    }

    stream.write_all(&reply).await?;
    Ok(())
}
