//! Transport session: the silence-terminated receive loop.
//!
//! The wire format has no length prefix and no end marker, so the loop has to
//! infer "the file is complete" from how the connection behaves:
//!
//! | Read result                          | Meaning                 | Outcome            |
//! |--------------------------------------|-------------------------|--------------------|
//! | `Ok(0)`                              | peer closed             | complete transfer  |
//! | nothing within `inter_packet_timeout`| sender went quiet       | complete transfer  |
//! | `Err(Interrupted)`                   | spurious wake-up        | read again         |
//! | `Err(WouldBlock \| TimedOut)`        | socket-level timeout    | complete transfer  |
//! | any other `Err`                      | connection broken       | abort, data lost   |
//! | buffer full                          | sender sent too much    | complete transfer  |
//! | session deadline fires               | stuck connection        | abort, data lost   |
//! | shutdown requested                   | operator stop           | abort, data lost   |
//!
//! Each successful read restarts the inter-packet countdown (a new
//! `timeout` wraps every read) and resets the session deadline.

use std::io::ErrorKind;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::domain::ServerConfig;
use crate::infrastructure::controller::{ArmedConnection, Interrupt};

/// Limits that shape one receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub inter_packet_timeout: Duration,
    pub max_buffer_size: usize,
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            inter_packet_timeout: config.inter_packet_timeout,
            max_buffer_size: config.max_buffer_size,
        }
    }
}

/// Why a session ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    PeerClosed,
    Silence,
    BufferFull,
}

/// Everything received on a connection that ended normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub data: Vec<u8>,
    pub packets: u32,
    pub end: EndReason,
}

impl SessionOutcome {
    pub fn bytes_received(&self) -> usize {
        self.data.len()
    }
}

/// A session that ended without a usable transfer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("read failed after {received} bytes: {source}")]
    Io {
        received: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("session deadline of {0:?} expired")]
    DeadlineExpired(Duration),

    #[error("shutdown requested")]
    Shutdown,
}

impl From<Interrupt> for SessionError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::DeadlineExpired(period) => Self::DeadlineExpired(period),
            Interrupt::Shutdown => Self::Shutdown,
        }
    }
}

/// Reads from `conn` until the transfer is over.
///
/// Returns every byte received when the session ends normally (peer close,
/// silence, or full buffer).  A connection that sends nothing yields an empty
/// outcome rather than an error.
///
/// # Errors
///
/// - [`SessionError::Io`] on a non-timeout read failure; partial data is
///   discarded.
/// - [`SessionError::DeadlineExpired`] / [`SessionError::Shutdown`] when the
///   controller interrupts the session.
pub async fn run_session<S>(
    conn: &mut ArmedConnection<S>,
    limits: &SessionLimits,
) -> Result<SessionOutcome, SessionError>
where
    S: AsyncRead + Unpin,
{
    let peer = conn.record().peer;
    let (stream, timers) = conn.parts();

    let mut buffer = vec![0u8; limits.max_buffer_size];
    let mut received = 0usize;
    let mut packets = 0u32;

    let end = loop {
        if received == buffer.len() {
            info!("{peer}: buffer full at {received} bytes, stopping read");
            break EndReason::BufferFull;
        }

        let read = timeout(
            limits.inter_packet_timeout,
            stream.read(&mut buffer[received..]),
        );

        let result = tokio::select! {
            biased;
            interrupt = timers.interrupted() => return Err(interrupt.into()),
            result = read => result,
        };

        match result {
            Err(_elapsed) => {
                info!(
                    "{peer}: inter-packet timeout ({:?}), ending transmission",
                    limits.inter_packet_timeout
                );
                break EndReason::Silence;
            }
            Ok(Ok(0)) => {
                info!("{peer}: connection closed by client after {packets} packets");
                break EndReason::PeerClosed;
            }
            Ok(Ok(n)) => {
                packets += 1;
                received += n;
                timers.on_activity();
                debug!("{peer}: packet {packets}: +{n} bytes = {received} total");
            }
            Ok(Err(e)) => match e.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                    info!("{peer}: read timed out ({e}), ending transmission");
                    break EndReason::Silence;
                }
                _ => return Err(SessionError::Io { received, source: e }),
            },
        }
    };

    timers.clear();
    buffer.truncate(received);

    Ok(SessionOutcome {
        data: buffer,
        packets,
        end,
    })
}

/// Renders the first `limit` bytes for logs: printable ASCII as-is, anything
/// else as `\xNN`.
pub fn data_preview(data: &[u8], limit: usize) -> String {
    let mut out = String::with_capacity(limit);
    for &b in data.iter().take(limit) {
        if (0x20..=0x7E).contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::controller::{Controller, WorkerRecord};
    use std::io;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::time::{sleep, Instant};
    use tokio_test::io::Builder;

    const LIMITS: SessionLimits = SessionLimits {
        inter_packet_timeout: Duration::from_secs(3),
        max_buffer_size: 64 * 1024,
    };

    fn arm<S>(controller: &Controller, stream: S, deadline: Duration) -> ArmedConnection<S> {
        controller.arm(
            stream,
            WorkerRecord::new("127.0.0.1:40000".parse().unwrap()),
            deadline,
        )
    }

    /// Keeps the writer end alive without sending anything.
    fn hold_open(peer: DuplexStream) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            sleep(Duration::from_secs(3600)).await;
            drop(peer);
        })
    }

    // ── Normal endings ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_peer_close_ends_session_with_all_bytes() {
        // Arrange
        let controller = Controller::new();
        let (server, mut client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(30));

        client.write_all(b"report.txt\nhello").await.unwrap();
        drop(client);

        // Act
        let outcome = run_session(&mut conn, &LIMITS).await.unwrap();

        // Assert
        assert_eq!(outcome.data, b"report.txt\nhello");
        assert_eq!(outcome.end, EndReason::PeerClosed);
        assert_eq!(outcome.bytes_received(), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_with_short_gaps_are_concatenated() {
        let controller = Controller::new();
        let (server, mut client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(30));

        let writer = tokio::spawn(async move {
            for chunk in [&b"data.bin\n"[..], b"first-", b"second-", b"third"] {
                client.write_all(chunk).await.unwrap();
                sleep(Duration::from_secs(2)).await;
            }
        });

        let outcome = run_session(&mut conn, &LIMITS).await.unwrap();
        writer.await.unwrap();

        assert_eq!(outcome.data, b"data.bin\nfirst-second-third");
        assert_eq!(outcome.packets, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_ends_session_successfully() {
        let controller = Controller::new();
        let (server, mut client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(30));

        client.write_all(b"quiet.txt\nabc").await.unwrap();
        let _keep = hold_open(client);

        let started = Instant::now();
        let outcome = run_session(&mut conn, &LIMITS).await.unwrap();

        assert_eq!(outcome.data, b"quiet.txt\nabc");
        assert_eq!(outcome.end, EndReason::Silence);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_is_empty_not_error() {
        let controller = Controller::new();
        let (server, client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(30));
        let _keep = hold_open(client);

        let outcome = run_session(&mut conn, &LIMITS).await.unwrap();

        assert!(outcome.data.is_empty());
        assert_eq!(outcome.packets, 0);
        assert_eq!(outcome.end, EndReason::Silence);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_close_is_empty_not_error() {
        let controller = Controller::new();
        let (server, client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(30));
        drop(client);

        let outcome = run_session(&mut conn, &LIMITS).await.unwrap();

        assert!(outcome.data.is_empty());
        assert_eq!(outcome.end, EndReason::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_full_stops_reading() {
        let controller = Controller::new();
        let (server, mut client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(30));
        let limits = SessionLimits {
            max_buffer_size: 8,
            ..LIMITS
        };

        client.write_all(b"abcdefghijklmnopqrst").await.unwrap();
        let _keep = hold_open(client);

        let outcome = run_session(&mut conn, &limits).await.unwrap();

        assert_eq!(outcome.data, b"abcdefgh");
        assert_eq!(outcome.end, EndReason::BufferFull);
    }

    #[tokio::test]
    async fn test_interrupted_read_is_retried() {
        let controller = Controller::new();
        let mock = Builder::new()
            .read_error(io::Error::from(io::ErrorKind::Interrupted))
            .read(b"x.txt\nz")
            .build();
        let mut conn = arm(&controller, mock, Duration::from_secs(30));

        let outcome = run_session(&mut conn, &LIMITS).await.unwrap();

        assert_eq!(outcome.data, b"x.txt\nz");
        assert_eq!(outcome.end, EndReason::PeerClosed);
    }

    #[tokio::test]
    async fn test_would_block_is_treated_as_silence() {
        let controller = Controller::new();
        let mock = Builder::new()
            .read(b"a.txt\nb")
            .read_error(io::Error::from(io::ErrorKind::WouldBlock))
            .build();
        let mut conn = arm(&controller, mock, Duration::from_secs(30));

        let outcome = run_session(&mut conn, &LIMITS).await.unwrap();

        assert_eq!(outcome.data, b"a.txt\nb");
        assert_eq!(outcome.end, EndReason::Silence);
    }

    // ── Abnormal endings ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_io_error_discards_partial_data() {
        let controller = Controller::new();
        let mock = Builder::new()
            .read(b"partial")
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let mut conn = arm(&controller, mock, Duration::from_secs(30));

        let result = run_session(&mut conn, &LIMITS).await;

        match result {
            Err(SessionError::Io { received, source }) => {
                assert_eq!(received, 7);
                assert_eq!(source.kind(), io::ErrorKind::ConnectionReset);
            }
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_aborts_silent_session() {
        // Arrange: silence threshold longer than the deadline
        let controller = Controller::new();
        let (server, client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(2));
        let limits = SessionLimits {
            inter_packet_timeout: Duration::from_secs(10),
            ..LIMITS
        };
        let _keep = hold_open(client);

        // Act
        let result = run_session(&mut conn, &limits).await;

        // Assert
        assert!(matches!(result, Err(SessionError::DeadlineExpired(d)) if d == Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_read_resets_deadline() {
        // Sends one byte every 1.5 s for 7.5 s; the 3 s deadline must never fire.
        let controller = Controller::new();
        let (server, mut client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(3));
        let limits = SessionLimits {
            inter_packet_timeout: Duration::from_secs(2),
            ..LIMITS
        };

        let writer = tokio::spawn(async move {
            client.write_all(b"t\n").await.unwrap();
            for _ in 0..5 {
                sleep(Duration::from_millis(1500)).await;
                client.write_all(b"x").await.unwrap();
            }
        });

        let outcome = run_session(&mut conn, &limits).await.unwrap();
        writer.await.unwrap();

        assert_eq!(outcome.data, b"t\nxxxxx");
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_deadline_survives_reads() {
        let controller = Controller::new();
        let (server, mut client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(u64::MAX));

        client.write_all(b"a.txt\n").await.unwrap();
        client.write_all(b"hi").await.unwrap();
        drop(client);

        let outcome = run_session(&mut conn, &LIMITS).await.unwrap();

        assert_eq!(outcome.data, b"a.txt\nhi");
        assert_eq!(outcome.end, EndReason::PeerClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_session() {
        let controller = std::sync::Arc::new(Controller::new());
        let (server, mut client) = tokio::io::duplex(1024);
        let mut conn = arm(&controller, server, Duration::from_secs(30));

        client.write_all(b"big.iso\npartial").await.unwrap();
        let _keep = hold_open(client);

        let trigger = {
            let controller = std::sync::Arc::clone(&controller);
            tokio::spawn(async move {
                sleep(Duration::from_millis(500)).await;
                controller.on_external_shutdown();
            })
        };

        let result = run_session(&mut conn, &LIMITS).await;
        trigger.await.unwrap();

        assert!(matches!(result, Err(SessionError::Shutdown)));
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    #[test]
    fn test_data_preview_escapes_non_printable() {
        assert_eq!(data_preview(b"ab\n\x00c", 32), "ab\\x0a\\x00c");
    }

    #[test]
    fn test_data_preview_respects_limit() {
        assert_eq!(data_preview(b"abcdef", 3), "abc");
    }

    #[test]
    fn test_limits_from_config() {
        let limits = SessionLimits::from(&ServerConfig::default());
        assert_eq!(limits.inter_packet_timeout, Duration::from_secs(3));
        assert_eq!(limits.max_buffer_size, 65536);
    }
}
