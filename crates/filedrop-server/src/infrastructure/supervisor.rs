//! Supervisor: listener, accept loop and per-connection workers.
//!
//! ```text
//! run_server
//!   ├── validate config, prepare storage root
//!   ├── bind_listener (reuse-addr, backlog)
//!   └── serve_forever ── loop ─┬─ shutdown requested → drain_workers, return
//!                              ├─ worker finished   → on_child_exited
//!                              └─ accept            → admission check, spawn run_worker
//! ```
//!
//! Each accepted connection gets its own Tokio task.  The accept loop never
//! waits on a worker; finished workers are reclaimed whenever the `JoinSet`
//! reports one, so none linger.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::application::{ingest_upload, UploadSink};
use crate::domain::ServerConfig;
use crate::infrastructure::controller::{
    drain_exited, on_child_exited, ArmedConnection, Controller, WorkerExit, WorkerRecord,
    WorkerReport,
};
use crate::infrastructure::session::{
    data_preview, run_session, SessionError, SessionLimits, SessionOutcome,
};
use crate::infrastructure::storage::FsUploadSink;

/// How long running workers get to finish after shutdown before they are
/// aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

// ── Public API ────────────────────────────────────────────────────────────────

/// Creates a listening socket with address reuse enabled.
///
/// # Errors
///
/// Returns the underlying I/O error if the socket cannot be created, bound
/// or put into listening state.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// Runs the upload server until `controller` reports shutdown.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the storage root cannot
/// be created, or the listener cannot be bound.  Per-connection failures
/// never end the server.
pub async fn run_server(config: ServerConfig, controller: Arc<Controller>) -> anyhow::Result<()> {
    config.validate().context("invalid server configuration")?;

    let sink = FsUploadSink::new(&config.storage_root);
    sink.prepare().await.with_context(|| {
        format!(
            "failed to create storage root {}",
            config.storage_root.display()
        )
    })?;

    let listener = bind_listener(config.bind_addr, config.backlog)
        .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;

    info!(
        "listening on {} (storage root {})",
        listener.local_addr().unwrap_or(config.bind_addr),
        config.storage_root.display()
    );

    serve_forever(listener, Arc::new(config), controller, Arc::new(sink)).await;
    Ok(())
}

/// Accepts connections on `listener` and hands each to its own worker.
///
/// Returns after shutdown has been requested and running workers have been
/// drained.
pub async fn serve_forever(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    controller: Arc<Controller>,
    sink: Arc<dyn UploadSink>,
) {
    let mut workers: JoinSet<WorkerReport> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = controller.shutdown_requested() => {
                info!("shutdown requested; stopping accept loop");
                break;
            }

            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                let reaped = on_child_exited(joined, &mut workers);
                debug!("reclaimed {reaped} worker(s), {} still running", workers.len());
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    drain_exited(&mut workers);
                    if let Some(limit) = config.max_workers {
                        if workers.len() >= limit {
                            warn!("worker limit {limit} reached; refusing connection from {peer}");
                            drop(stream);
                            continue;
                        }
                    }

                    let record = WorkerRecord::new(peer);
                    info!("created worker {} for {peer}", record.id);
                    workers.spawn(run_worker(
                        stream,
                        record,
                        Arc::clone(&config),
                        Arc::clone(&controller),
                        Arc::clone(&sink),
                    ));
                }
                Err(e) => {
                    // Transient (e.g. too many open files); keep serving.
                    error!("accept error: {e}");
                }
            },
        }
    }

    drop(listener);
    drain_workers(&mut workers).await;
}

// ── Per-connection worker ─────────────────────────────────────────────────────

async fn run_worker(
    stream: TcpStream,
    record: WorkerRecord,
    config: Arc<ServerConfig>,
    controller: Arc<Controller>,
    sink: Arc<dyn UploadSink>,
) -> WorkerReport {
    let conn = controller.arm(stream, record.clone(), config.session_deadline);
    let exit = handle_connection(conn, &config, sink.as_ref()).await;
    WorkerReport { record, exit }
}

/// Runs one connection to completion and decides how the worker ends.
///
/// Generic over the stream so it can be driven by in-memory pipes.
pub async fn handle_connection<S>(
    mut conn: ArmedConnection<S>,
    config: &ServerConfig,
    sink: &dyn UploadSink,
) -> WorkerExit
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limits = SessionLimits::from(config);

    match run_session(&mut conn, &limits).await {
        Ok(outcome) => {
            let exit = finish_transfer(conn.record(), outcome, config, sink).await;
            conn.teardown().await;
            exit
        }
        Err(SessionError::DeadlineExpired(_)) => {
            conn.on_timeout().await;
            WorkerExit::TimedOut
        }
        Err(SessionError::Shutdown) => {
            conn.on_shutdown().await;
            WorkerExit::Shutdown
        }
        Err(e @ SessionError::Io { .. }) => {
            error!("{}: {e}; discarding received data", conn.record().peer);
            conn.teardown().await;
            WorkerExit::Failed
        }
    }
}

async fn finish_transfer(
    record: &WorkerRecord,
    outcome: SessionOutcome,
    config: &ServerConfig,
    sink: &dyn UploadSink,
) -> WorkerExit {
    let peer = record.peer;
    info!(
        "{peer}: transmission complete: {} bytes in {} packets ({:?})",
        outcome.bytes_received(),
        outcome.packets,
        outcome.end
    );

    if outcome.data.is_empty() {
        warn!("{peer}: no data received");
        return WorkerExit::Empty;
    }
    debug!("{peer}: first bytes: {}", data_preview(&outcome.data, 32));

    match ingest_upload(&outcome.data, config.max_filename_len, sink).await {
        Ok(_) => WorkerExit::Stored,
        Err(e) => {
            error!("{peer}: upload dropped: {e}");
            WorkerExit::Dropped
        }
    }
}

/// Gives running workers a short grace period, then aborts the rest.
async fn drain_workers(workers: &mut JoinSet<WorkerReport>) {
    if workers.is_empty() {
        return;
    }
    info!("waiting for {} worker(s) to finish", workers.len());

    let drained = timeout(SHUTDOWN_GRACE, async {
        while let Some(joined) = workers.join_next().await {
            on_child_exited(joined, workers);
        }
    })
    .await;

    if drained.is_err() {
        warn!("aborting {} worker(s) still running", workers.len());
        workers.shutdown().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{StoreError, StoredUpload};
    use filedrop_core::SafeFilename;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingSink {
        stored: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait::async_trait]
    impl UploadSink for RecordingSink {
        async fn store(
            &self,
            name: &SafeFilename,
            content: &[u8],
        ) -> Result<StoredUpload, StoreError> {
            self.stored
                .lock()
                .unwrap()
                .push((name.to_string(), content.to_vec()));
            Ok(StoredUpload {
                path: PathBuf::from("/mem").join(name),
                bytes_written: content.len() as u64,
                size_on_disk: None,
            })
        }
    }

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..ServerConfig::default()
        }
    }

    fn record() -> WorkerRecord {
        WorkerRecord::new("127.0.0.1:40000".parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_connection_stores_upload_on_close() {
        // Arrange
        let controller = Controller::new();
        let config = test_config();
        let sink = RecordingSink::default();
        let (server, mut client) = tokio::io::duplex(4096);
        let conn = controller.arm(server, record(), config.session_deadline);

        // Act
        client.write_all(b"report.txt\nhello").await.unwrap();
        client.shutdown().await.unwrap();
        let exit = handle_connection(conn, &config, &sink).await;

        // Assert
        assert_eq!(exit, WorkerExit::Stored);
        let stored = sink.stored.lock().unwrap();
        assert_eq!(stored[0], ("report.txt".to_string(), b"hello".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_connection_closes_stream_after_silence() {
        let controller = Controller::new();
        let config = test_config();
        let sink = RecordingSink::default();
        let (server, mut client) = tokio::io::duplex(4096);
        let conn = controller.arm(server, record(), config.session_deadline);

        client.write_all(b"notes.md\n# title").await.unwrap();
        let worker = tokio::spawn(async move {
            let exit = handle_connection(conn, &config, &sink).await;
            (exit, sink)
        });

        // The server closes its side once the silence threshold passes.
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        let (exit, sink) = worker.await.unwrap();

        assert!(rest.is_empty());
        assert_eq!(exit, WorkerExit::Stored);
        assert_eq!(sink.stored.lock().unwrap()[0].1, b"# title");
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_connection_empty_is_not_stored() {
        let controller = Controller::new();
        let config = test_config();
        let sink = RecordingSink::default();
        let (server, client) = tokio::io::duplex(4096);
        let conn = controller.arm(server, record(), config.session_deadline);
        drop(client);

        let exit = handle_connection(conn, &config, &sink).await;

        assert_eq!(exit, WorkerExit::Empty);
        assert!(sink.stored.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_connection_drops_traversal_attempt() {
        let controller = Controller::new();
        let config = test_config();
        let sink = RecordingSink::default();
        let (server, mut client) = tokio::io::duplex(4096);
        let conn = controller.arm(server, record(), config.session_deadline);

        client.write_all(b"../../etc/passwd\nroot::0:0").await.unwrap();
        client.shutdown().await.unwrap();
        let exit = handle_connection(conn, &config, &sink).await;

        assert_eq!(exit, WorkerExit::Dropped);
        assert!(sink.stored.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_connection_deadline_stores_nothing() {
        let controller = Controller::new();
        let config = ServerConfig {
            inter_packet_timeout: Duration::from_secs(60),
            session_deadline: Duration::from_secs(5),
            ..test_config()
        };
        let sink = RecordingSink::default();
        let (server, mut client) = tokio::io::duplex(4096);
        let conn = controller.arm(server, record(), config.session_deadline);

        client.write_all(b"stuck.bin\npartial").await.unwrap();
        let holder = tokio::spawn(async move {
            sleep(Duration::from_secs(3600)).await;
            drop(client);
        });

        let exit = handle_connection(conn, &config, &sink).await;
        holder.abort();

        assert_eq!(exit, WorkerExit::TimedOut);
        assert!(sink.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bind_listener_on_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_run_server_rejects_invalid_config() {
        let config = ServerConfig {
            max_buffer_size: 0,
            ..test_config()
        };

        let result = run_server(config, Arc::new(Controller::new())).await;

        assert!(result.is_err());
    }
}
