//! Hub network layer: TCP accept loop and per-connection tasks.
//!
//! Every accepted socket goes through the same stages:
//! 1. Wait for a `Register` frame under the registration timeout
//! 2. Register with the [`ConnectionManager`](crate::manager::ConnectionManager)
//! 3. Spawn a writer task that drains the connection's outbound queue
//! 4. Run the [`ResultCorrelator`] on the read half until either side stops
//! 5. Run the close path once, removing the server everywhere

use crate::config::HubConfig;
use crate::connection::{ConnectionId, ServerConnection};
use crate::correlator::ResultCorrelator;
use crate::error::HubError;
use crate::events::{EventBus, HubEvent};
use crate::handle::HubHandle;
use crate::ledger::CommandLedger;
use crate::manager::{ConnectionManager, SharedManager};
use log::{debug, error, info, warn};
use shared::{read_frame, Packet, ServerId, ServerStatus};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Shared pieces every connection task needs.
#[derive(Clone)]
struct ConnectionContext {
    manager: SharedManager,
    events: Arc<EventBus>,
    ledger: Arc<CommandLedger>,
    config: HubConfig,
    shutdown: CancellationToken,
}

/// The relay hub: owns the listener and every connection task.
pub struct Hub {
    listener: TcpListener,
    context: ConnectionContext,
}

impl Hub {
    pub async fn bind(config: HubConfig) -> Result<Self, HubError> {
        let listener = TcpListener::bind(config.bind_address).await?;
        info!("Hub listening on {}", listener.local_addr()?);

        Ok(Hub {
            listener,
            context: ConnectionContext {
                manager: ConnectionManager::shared(),
                events: Arc::new(EventBus::new(config.event_buffer)),
                ledger: Arc::new(CommandLedger::new()),
                config,
                shutdown: CancellationToken::new(),
            },
        })
    }

    /// Address actually bound; differs from the config when port 0 was used.
    pub fn local_addr(&self) -> Result<SocketAddr, HubError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> HubHandle {
        HubHandle::new(
            Arc::clone(&self.context.manager),
            Arc::clone(&self.context.events),
            Arc::clone(&self.context.ledger),
            self.context.shutdown.clone(),
        )
    }

    /// Accepts game servers until [`HubHandle::shutdown`] is called, then
    /// closes every connection and waits for their tasks before returning.
    pub async fn run(self) -> Result<(), HubError> {
        let Hub { listener, context } = self;
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = context.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        debug!("Accepted connection from {}", remote_addr);
                        connections.spawn(handle_connection(context.clone(), stream, remote_addr));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        let open = context.manager.write().await.close_all();
        info!("Shutting down hub, closing {} connections", open);

        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed during shutdown: {}", e);
            }
        }

        drop(listener);
        info!("Hub stopped");
        Ok(())
    }
}

async fn handle_connection(context: ConnectionContext, stream: TcpStream, remote_addr: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", remote_addr, e);
    }

    let cancel = context.shutdown.child_token();
    let (mut reader, writer) = stream.into_split();

    let registration = await_registration(
        &mut reader,
        context.config.registration_timeout,
        context.config.max_frame_len,
        &cancel,
    )
    .await;
    let (server_id, status) = match registration {
        Ok(registration) => registration,
        Err(e) => {
            warn!("Dropping connection from {}: {}", remote_addr, e);
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(context.config.outbound_buffer.max(1));
    let connection = ServerConnection::new(server_id.clone(), remote_addr, outbound_tx, cancel.clone());
    let connection_id = match admit(&context, connection, status).await {
        Ok(connection_id) => connection_id,
        Err(e) => {
            warn!("Rejected registration from {}: {}", remote_addr, e);
            return;
        }
    };

    let writer_task = tokio::spawn(run_writer(
        writer,
        outbound_rx,
        cancel.clone(),
        server_id.clone(),
    ));

    let correlator = ResultCorrelator::new(Arc::clone(&context.manager), Arc::clone(&context.events));
    if let Err(e) = correlator
        .run(&mut reader, &server_id, &cancel, context.config.max_frame_len)
        .await
    {
        warn!("Closing connection to server {}: {}", server_id, e);
    }

    cancel.cancel();
    if let Err(e) = writer_task.await {
        error!("Writer task for server {} failed: {}", server_id, e);
    }

    let removed = {
        let mut manager = context.manager.write().await;
        let removed = manager.close(&server_id, connection_id);
        if removed {
            forget_pending(&context.ledger, &server_id);
        }
        removed
    };
    if removed {
        context.events.publish(HubEvent::Disconnected { server_id });
    }
}

/// Registers a connection and announces it.
///
/// Refused once shutdown has started, so nothing registers after
/// `close_all` has run. A closing entry under the same id is evicted and
/// announced as disconnected first.
async fn admit(
    context: &ConnectionContext,
    connection: ServerConnection,
    status: ServerStatus,
) -> Result<ConnectionId, HubError> {
    let server_id = connection.server_id.clone();
    let (evicted, registered) = {
        let mut manager = context.manager.write().await;
        if context.shutdown.is_cancelled() {
            return Err(HubError::ShuttingDown);
        }
        let evicted = manager.evict_stale(&server_id);
        if evicted.is_some() {
            forget_pending(&context.ledger, &server_id);
        }
        (evicted, manager.register(connection, status))
    };

    if evicted.is_some() {
        context.events.publish(HubEvent::Disconnected {
            server_id: server_id.clone(),
        });
    }
    let (connection_id, status) = registered?;
    context
        .events
        .publish(HubEvent::Connected { server_id, status });
    Ok(connection_id)
}

/// Called with the manager write lock held, so no submit can record
/// against the session being removed.
fn forget_pending(ledger: &CommandLedger, server_id: &ServerId) {
    let dropped = ledger.forget(server_id.as_str());
    if !dropped.is_empty() {
        debug!(
            "Discarded {} pending requests for server {}",
            dropped.len(),
            server_id
        );
    }
}

/// Reads the first frame of a new connection, which must be `Register`.
async fn await_registration<R>(
    reader: &mut R,
    registration_timeout: Duration,
    max_frame_len: usize,
    cancel: &CancellationToken,
) -> Result<(ServerId, ServerStatus), HubError>
where
    R: AsyncRead + Unpin,
{
    let first = tokio::select! {
        _ = cancel.cancelled() => return Err(HubError::ShuttingDown),
        frame = timeout(registration_timeout, read_frame(reader, max_frame_len)) => {
            frame.map_err(|_| HubError::RegistrationTimeout(registration_timeout))??
        }
    };

    match first {
        Some(Packet::Register { server_id, status }) => Ok((server_id, status)),
        Some(other) => Err(HubError::UnexpectedPacket(other.kind())),
        None => Err(HubError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before registering",
        ))),
    }
}

/// Drains the outbound queue onto the socket, one frame at a time.
///
/// A failed write cancels the connection's token, which stops the reader
/// and sends the connection down its close path.
async fn run_writer<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    cancel: CancellationToken,
    server_id: ServerId,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            result = writer.write_all(&frame) => result,
        };
        if let Err(e) = written {
            warn!("Failed to write to server {}: {}", server_id, e);
            cancel.cancel();
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Error shutting down writer for server {}: {}", server_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::encode;
    use tokio_test::io::Builder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_registration_accepts_register_frame() {
        let status = ServerStatus::new("Alpha", "1.2.3.4:25565", 20).with_players(["a"]);
        let frame = encode(&Packet::Register {
            server_id: ServerId::new("alpha"),
            status: status.clone(),
        })
        .unwrap();
        let mut reader = Builder::new().read(&frame).build();

        let (server_id, received) =
            await_registration(&mut reader, TIMEOUT, shared::MAX_FRAME_LEN, &CancellationToken::new())
                .await
                .unwrap();
        assert_eq!(server_id.as_str(), "alpha");
        assert_eq!(received, status);
    }

    #[tokio::test]
    async fn test_registration_rejects_other_first_frame() {
        let frame = encode(&Packet::StatusUpdate {
            status: ServerStatus::default(),
        })
        .unwrap();
        let mut reader = Builder::new().read(&frame).build();

        let err =
            await_registration(&mut reader, TIMEOUT, shared::MAX_FRAME_LEN, &CancellationToken::new())
                .await
                .unwrap_err();
        assert!(matches!(err, HubError::UnexpectedPacket("StatusUpdate")));
    }

    #[tokio::test]
    async fn test_registration_eof_is_io_error() {
        let mut reader = Builder::new().build();
        let err =
            await_registration(&mut reader, TIMEOUT, shared::MAX_FRAME_LEN, &CancellationToken::new())
                .await
                .unwrap_err();
        assert!(matches!(err, HubError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_registration_times_out() {
        let (_peer, mut hub_side) = tokio::io::duplex(64);
        let err = await_registration(
            &mut hub_side,
            Duration::from_millis(20),
            shared::MAX_FRAME_LEN,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HubError::RegistrationTimeout(_)));
    }

    #[tokio::test]
    async fn test_registration_stops_on_shutdown() {
        let (_peer, mut hub_side) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = await_registration(&mut hub_side, TIMEOUT, shared::MAX_FRAME_LEN, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::ShuttingDown));
    }

    fn test_context(config: HubConfig) -> ConnectionContext {
        ConnectionContext {
            manager: ConnectionManager::shared(),
            events: Arc::new(EventBus::new(config.event_buffer)),
            ledger: Arc::new(CommandLedger::new()),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    fn test_connection(
        server_id: &str,
        cancel: CancellationToken,
    ) -> (ServerConnection, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(4);
        let connection = ServerConnection::new(
            ServerId::new(server_id),
            "127.0.0.1:40000".parse().unwrap(),
            tx,
            cancel,
        );
        (connection, rx)
    }

    #[tokio::test]
    async fn test_write_error_cancels_connection() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let writer = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer reset"))
            .build();

        tx.send(encode(&Packet::RestartRequest).unwrap()).await.unwrap();
        run_writer(writer, rx, cancel.clone(), ServerId::new("alpha")).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_write_error_stops_reader() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let context = test_context(HubConfig::default());
        let server_id = ServerId::new("alpha");

        // Idle peer: the reader only returns once the token fires
        let (_peer, mut hub_side) = tokio::io::duplex(64);
        let correlator = ResultCorrelator::new(Arc::clone(&context.manager), Arc::clone(&context.events));
        let reader_cancel = cancel.clone();
        let reader_id = server_id.clone();
        let reader = tokio::spawn(async move {
            correlator
                .run(&mut hub_side, &reader_id, &reader_cancel, shared::MAX_FRAME_LEN)
                .await
        });

        let writer = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"))
            .build();
        tx.send(encode(&Packet::RestartRequest).unwrap()).await.unwrap();
        run_writer(writer, rx, cancel.clone(), server_id).await;

        let stopped = timeout(TIMEOUT, reader).await.unwrap().unwrap();
        assert!(stopped.is_ok());
    }

    #[tokio::test]
    async fn test_admit_announces_connection() {
        let context = test_context(HubConfig::default());
        let mut events = context.events.subscribe();
        let (connection, _rx) = test_connection("alpha", context.shutdown.child_token());

        let connection_id = admit(&context, connection, ServerStatus::new("Alpha", "", 20))
            .await
            .unwrap();
        assert_eq!(connection_id, 1);
        assert!(matches!(
            events.try_recv(),
            Some(HubEvent::Connected { ref server_id, .. }) if server_id.as_str() == "alpha"
        ));
        assert_eq!(context.manager.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_admit_refused_after_shutdown() {
        let context = test_context(HubConfig::default());
        let mut events = context.events.subscribe();
        let (connection, _rx) = test_connection("alpha", context.shutdown.child_token());

        context.shutdown.cancel();
        let err = admit(&context, connection, ServerStatus::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::ShuttingDown));
        assert!(context.manager.read().await.is_empty());
        assert_eq!(events.try_recv(), None);
    }

    #[tokio::test]
    async fn test_admit_evicts_closing_session() {
        let context = test_context(HubConfig::default());
        let first_cancel = context.shutdown.child_token();
        let (first, _rx1) = test_connection("alpha", first_cancel.clone());
        let first_id = admit(&context, first, ServerStatus::default()).await.unwrap();
        context.ledger.record(crate::ledger::CommandRequest::new(
            "alpha",
            "tps",
            vec![],
            crate::ledger::RequestToken(1),
        ));

        let mut events = context.events.subscribe();
        first_cancel.cancel();
        let (second, _rx2) = test_connection("alpha", context.shutdown.child_token());
        let second_id = admit(&context, second, ServerStatus::default()).await.unwrap();

        assert_ne!(first_id, second_id);
        assert_eq!(context.ledger.pending_for("alpha"), 0);
        assert!(matches!(events.try_recv(), Some(HubEvent::Disconnected { .. })));
        assert!(matches!(events.try_recv(), Some(HubEvent::Connected { .. })));

        // The old session's own close path no longer owns the entry
        let mut manager = context.manager.write().await;
        assert!(!manager.close(&ServerId::new("alpha"), first_id));
        assert_eq!(manager.lookup("alpha").unwrap().id, second_id);
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = HubConfig {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            ..HubConfig::default()
        };
        let hub = Hub::bind(config).await.unwrap();
        assert_ne!(hub.local_addr().unwrap().port(), 0);

        let handle = hub.handle();
        let run = tokio::spawn(hub.run());
        handle.shutdown();
        run.await.unwrap().unwrap();
    }
}
