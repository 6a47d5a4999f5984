use std::time::Duration;

use minisocks::{Socks5Server, StaticCredentials, permit_none};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Spawns a target service that expects "ping" and answers "pong"
async fn spawn_ping_target() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        conn.write_all(b"pong").await.unwrap();
    });

    port
}

async fn spawn_server(server: Socks5Server) -> std::net::SocketAddr {
    let mut server = server;
    let addr = server.bind().await.unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

#[tokio::test]
async fn connect_with_password_auth_relays_ping_pong() {
    let target_port = spawn_ping_target().await;

    let creds: StaticCredentials = [("foo", "bar")].into_iter().collect();
    let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0").with_credentials(creds)).await;

    let mut conn = TcpStream::connect(proxy_addr).await.unwrap();

    // Greeting, subnegotiation, request and payload in one shot
    let mut req = Vec::new();
    req.extend_from_slice(&[5, 2, 0x00, 0x02]);
    req.extend_from_slice(&[1, 3, b'f', b'o', b'o', 3, b'b', b'a', b'r']);
    req.extend_from_slice(&[5, 1, 0, 1, 127, 0, 0, 1]);
    req.extend_from_slice(&target_port.to_be_bytes());
    req.extend_from_slice(b"ping");
    conn.write_all(&req).await.unwrap();

    let mut out = [0u8; 18];
    tokio::time::timeout(Duration::from_secs(2), conn.read_exact(&mut out))
        .await
        .expect("proxy reply timed out")
        .unwrap();

    // Method selection + auth status + reply header + relayed payload,
    // with the bound port zeroed out before comparing
    let mut expected = vec![5, 0x02, 1, 0];
    expected.extend_from_slice(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 0]);
    expected.extend_from_slice(b"pong");

    let mut got = out.to_vec();
    got[12] = 0;
    got[13] = 0;
    assert_eq!(got, expected);
}

#[tokio::test]
async fn connect_without_auth_relays_ping_pong() {
    let target_port = spawn_ping_target().await;
    let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0")).await;

    let mut conn = TcpStream::connect(proxy_addr).await.unwrap();

    let mut req = Vec::new();
    req.extend_from_slice(&[5, 1, 0x00]);
    req.extend_from_slice(&[5, 1, 0, 1, 127, 0, 0, 1]);
    req.extend_from_slice(&target_port.to_be_bytes());
    req.extend_from_slice(b"ping");
    conn.write_all(&req).await.unwrap();

    let mut out = [0u8; 16];
    tokio::time::timeout(Duration::from_secs(2), conn.read_exact(&mut out))
        .await
        .expect("proxy reply timed out")
        .unwrap();

    assert_eq!(out[..2], [5, 0x00]);
    assert_eq!(out[2..6], [5, 0, 0, 1]);
    assert_eq!(&out[12..], b"pong");
}

#[tokio::test]
async fn bad_credentials_get_failure_status() {
    let creds: StaticCredentials = [("foo", "bar")].into_iter().collect();
    let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0").with_credentials(creds)).await;

    let mut conn = TcpStream::connect(proxy_addr).await.unwrap();
    let mut req = Vec::new();
    req.extend_from_slice(&[5, 2, 0x00, 0x02]);
    req.extend_from_slice(&[1, 3, b'f', b'o', b'o', 3, b'b', b'a', b'z']);
    conn.write_all(&req).await.unwrap();

    let mut out = [0u8; 4];
    conn.read_exact(&mut out).await.unwrap();
    assert_eq!(out, [5, 0x02, 1, 1]);

    // Server closes the connection after a failed subnegotiation
    let mut rest = Vec::new();
    conn.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn rule_denial_replies_not_allowed() {
    let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0").with_rules(permit_none())).await;

    let mut conn = TcpStream::connect(proxy_addr).await.unwrap();
    let mut req = Vec::new();
    req.extend_from_slice(&[5, 1, 0x00]);
    req.extend_from_slice(&[5, 1, 0, 1, 127, 0, 0, 1, 0x1F, 0x90]);
    conn.write_all(&req).await.unwrap();

    let mut out = [0u8; 12];
    conn.read_exact(&mut out).await.unwrap();
    assert_eq!(out[..2], [5, 0x00]);
    assert_eq!(out[2..], [5, 2, 0, 1, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn bind_command_is_rejected() {
    let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0")).await;

    let mut conn = TcpStream::connect(proxy_addr).await.unwrap();
    let mut req = Vec::new();
    req.extend_from_slice(&[5, 1, 0x00]);
    req.extend_from_slice(&[5, 2, 0, 1, 127, 0, 0, 1, 0x1F, 0x90]);
    conn.write_all(&req).await.unwrap();

    let mut out = [0u8; 12];
    conn.read_exact(&mut out).await.unwrap();
    assert_eq!(out[2..], [5, 7, 0, 1, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn refused_upstream_replies_connection_refused() {
    // Bind then drop a listener to get a port nothing listens on
    let dead_port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0")).await;

    let mut conn = TcpStream::connect(proxy_addr).await.unwrap();
    let mut req = Vec::new();
    req.extend_from_slice(&[5, 1, 0x00]);
    req.extend_from_slice(&[5, 1, 0, 1, 127, 0, 0, 1]);
    req.extend_from_slice(&dead_port.to_be_bytes());
    conn.write_all(&req).await.unwrap();

    let mut out = [0u8; 12];
    conn.read_exact(&mut out).await.unwrap();
    assert_eq!(out[2..], [5, 5, 0, 1, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn unknown_address_type_replies_code_8() {
    let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0")).await;

    let mut conn = TcpStream::connect(proxy_addr).await.unwrap();
    let mut req = Vec::new();
    req.extend_from_slice(&[5, 1, 0x00]);
    // Stop at the bogus ATYP byte; the server fails before reading more
    req.extend_from_slice(&[5, 1, 0, 0x05]);
    conn.write_all(&req).await.unwrap();

    let mut out = [0u8; 12];
    conn.read_exact(&mut out).await.unwrap();
    assert_eq!(out[2..], [5, 8, 0, 1, 0, 0, 0, 0, 0, 0]);
}

mod plugging {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use minisocks::{NameResolver, Request, RuleSet};
    use tokio_util::sync::CancellationToken;

    /// Denies every request and records that it was asked
    struct DenyAndRecord(Arc<AtomicBool>);

    impl RuleSet for DenyAndRecord {
        fn allow(&self, _request: &Request) -> bool {
            self.0.store(true, Ordering::SeqCst);
            false
        }
    }

    /// Resolves every name to 127.0.0.1
    struct LoopbackResolver;

    #[async_trait::async_trait]
    impl NameResolver for LoopbackResolver {
        async fn resolve(
            &self,
            _name: &str,
            _cancel: &CancellationToken,
        ) -> minisocks::Result<IpAddr> {
            Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
        }
    }

    #[tokio::test]
    async fn denied_bind_replies_not_allowed() {
        let consulted = Arc::new(AtomicBool::new(false));
        let rules = DenyAndRecord(consulted.clone());
        let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0").with_rules(rules)).await;

        let mut conn = TcpStream::connect(proxy_addr).await.unwrap();
        let mut req = Vec::new();
        req.extend_from_slice(&[5, 1, 0x00]);
        req.extend_from_slice(&[5, 2, 0, 1, 127, 0, 0, 1, 0x1F, 0x90]);
        conn.write_all(&req).await.unwrap();

        let mut out = [0u8; 12];
        conn.read_exact(&mut out).await.unwrap();

        // Policy denial beats command-not-supported for BIND
        assert_eq!(out[2..], [5, 2, 0, 1, 0, 0, 0, 0, 0, 0]);
        assert!(consulted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn domain_connect_resolves_and_relays() {
        let target_port = spawn_ping_target().await;
        let proxy_addr =
            spawn_server(Socks5Server::new("127.0.0.1:0").with_resolver(LoopbackResolver)).await;

        let mut conn = TcpStream::connect(proxy_addr).await.unwrap();
        let name = b"target.test";
        let mut req = Vec::new();
        req.extend_from_slice(&[5, 1, 0x00]);
        req.extend_from_slice(&[5, 1, 0, 3, name.len() as u8]);
        req.extend_from_slice(name);
        req.extend_from_slice(&target_port.to_be_bytes());
        req.extend_from_slice(b"ping");
        conn.write_all(&req).await.unwrap();

        let mut out = [0u8; 16];
        tokio::time::timeout(Duration::from_secs(2), conn.read_exact(&mut out))
            .await
            .expect("proxy reply timed out")
            .unwrap();

        assert_eq!(out[..2], [5, 0x00]);
        assert_eq!(out[2..6], [5, 0, 0, 1]);
        assert_eq!(&out[12..], b"pong");
    }

    #[tokio::test]
    async fn unresolvable_domain_replies_host_unreachable() {
        let proxy_addr = spawn_server(Socks5Server::new("127.0.0.1:0")).await;

        let mut conn = TcpStream::connect(proxy_addr).await.unwrap();
        let name = b"no-such-host.invalid";
        let mut req = Vec::new();
        req.extend_from_slice(&[5, 1, 0x00]);
        req.extend_from_slice(&[5, 1, 0, 3, name.len() as u8]);
        req.extend_from_slice(name);
        req.extend_from_slice(&80u16.to_be_bytes());
        conn.write_all(&req).await.unwrap();

        let mut out = [0u8; 12];
        tokio::time::timeout(Duration::from_secs(5), conn.read_exact(&mut out))
            .await
            .expect("proxy reply timed out")
            .unwrap();
        assert_eq!(out[2..], [5, 4, 0, 1, 0, 0, 0, 0, 0, 0]);
    }
}
