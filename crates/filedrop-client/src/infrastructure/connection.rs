//! TCP helpers with per-operation timeouts.
//!
//! A timeout is reported as an `io::Error` of kind `TimedOut` so callers can
//! tell it apart from a refused or reset connection.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{timeout, Instant};
use tracing::debug;

fn timed_out(what: &str, limit: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{what} timed out after {limit:?}"),
    )
}

/// Resolves `addr` and opens a TCP connection, giving up after `limit`.
pub async fn connect_with_timeout<A: ToSocketAddrs>(
    addr: A,
    limit: Duration,
) -> io::Result<TcpStream> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(result) => result,
        Err(_) => Err(timed_out("connect", limit)),
    }
}

/// Writes all of `bytes`, giving up if the whole write takes longer than
/// `limit`.
pub async fn write_with_timeout<W>(writer: &mut W, bytes: &[u8], limit: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match timeout(limit, writer.write_all(bytes)).await {
        Ok(result) => result,
        Err(_) => Err(timed_out("write", limit)),
    }
}

/// Waits up to `limit` for the peer to close its side, discarding anything
/// it sends.
///
/// Returns `true` if the peer closed in time.
pub async fn await_close<R>(reader: &mut R, limit: Duration) -> bool
where
    R: AsyncRead + Unpin,
{
    let now = Instant::now();
    let deadline = now
        .checked_add(limit)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30));
    let mut scratch = [0u8; 256];
    loop {
        match tokio::time::timeout_at(deadline, reader.read(&mut scratch)).await {
            Ok(Ok(0)) => return true,
            Ok(Ok(n)) => debug!("ignoring {n} unexpected bytes from server"),
            Ok(Err(e)) => {
                debug!("read while waiting for close failed: {e}");
                return true;
            }
            Err(_) => return false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
