use tokio::io::copy;
use tracing::debug;

use crate::Conn;

/// run copies bytes between the client and the upstream connection
/// until either direction sees end-of-stream or an I/O error, then
/// drops both sockets. Dropping closes them, which unblocks whatever
/// the other copy loop was waiting on, so teardown needs no further
/// coordination. Stream errors during the relay are normal
/// termination, not failures.
pub(crate) async fn run<C, U>(client: C, upstream: U)
where
    C: Conn,
    U: Conn,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut upstream_rd, mut upstream_wr) = tokio::io::split(upstream);

    let client_to_upstream = async { copy(&mut client_rd, &mut upstream_wr).await };
    let upstream_to_client = async { copy(&mut upstream_rd, &mut client_wr).await };

    tokio::select! {
        res = client_to_upstream => match res {
            Ok(bytes) => debug!("relay finished: client -> upstream, {bytes} bytes"),
            Err(e) => debug!("relay terminated: client -> upstream, {e}"),
        },
        res = upstream_to_client => match res {
            Ok(bytes) => debug!("relay finished: upstream -> client, {bytes} bytes"),
            Err(e) => debug!("relay terminated: upstream -> client, {e}"),
        },
    }
    // Both halves drop here, closing both sockets and aborting the
    // still-pending copy direction.
}
