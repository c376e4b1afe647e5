//! Game-server side of the hub protocol.

use log::{debug, info};
use shared::{read_frame, write_frame, CodecError, Packet, ServerId, ServerStatus, MAX_FRAME_LEN};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hub sent unexpected {0} frame")]
    UnexpectedPacket(&'static str),

    #[error("hub closed the connection")]
    Disconnected,
}

/// Something the hub asked this game server to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRequest {
    Execute { command: String, args: Vec<String> },
    Restart,
}

/// A registered connection to the hub.
pub struct PeerClient {
    server_id: ServerId,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl PeerClient {
    /// Connects and sends the `Register` frame.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        server_id: ServerId,
        status: ServerStatus,
    ) -> Result<Self, PeerError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let remote = stream.peer_addr()?;
        let (reader, mut writer) = stream.into_split();

        write_frame(
            &mut writer,
            &Packet::Register {
                server_id: server_id.clone(),
                status,
            },
        )
        .await?;
        info!("Registered with hub at {} as {}", remote, server_id);

        Ok(Self {
            server_id,
            reader,
            writer,
        })
    }

    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    pub fn split(self) -> (PeerSender, PeerReceiver) {
        (
            PeerSender {
                writer: self.writer,
            },
            PeerReceiver {
                reader: self.reader,
                max_frame_len: MAX_FRAME_LEN,
            },
        )
    }
}

pub struct PeerSender {
    writer: OwnedWriteHalf,
}

impl PeerSender {
    pub async fn send_status(&mut self, status: ServerStatus) -> Result<(), PeerError> {
        write_frame(&mut self.writer, &Packet::StatusUpdate { status }).await?;
        Ok(())
    }

    pub async fn send_result(&mut self, command: String, output: String) -> Result<(), PeerError> {
        debug!("Answering '{}'", command);
        write_frame(&mut self.writer, &Packet::CommandResult { command, output }).await?;
        Ok(())
    }

    /// Closes the write side; the hub sees a clean end of stream.
    pub async fn shutdown(&mut self) -> Result<(), PeerError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

pub struct PeerReceiver {
    reader: OwnedReadHalf,
    max_frame_len: usize,
}

impl PeerReceiver {
    /// Waits for the next request. `Ok(None)` when the hub closed the
    /// connection. Not cancel-safe.
    pub async fn next_request(&mut self) -> Result<Option<PeerRequest>, PeerError> {
        match read_frame(&mut self.reader, self.max_frame_len).await? {
            Some(Packet::ExecuteCommand { command, args }) => {
                Ok(Some(PeerRequest::Execute { command, args }))
            }
            Some(Packet::RestartRequest) => Ok(Some(PeerRequest::Restart)),
            Some(other) => Err(PeerError::UnexpectedPacket(other.kind())),
            None => Ok(None),
        }
    }
}
