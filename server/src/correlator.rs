//! Reader side of an active connection.
//!
//! Decodes frames from one game server until the stream ends and turns
//! them into [`HubEvent`]s tagged with that server's id. Frames from a
//! single connection are handled strictly in arrival order.

use crate::error::HubError;
use crate::events::{CommandResult, EventBus, HubEvent};
use crate::manager::SharedManager;
use log::{debug, info};
use shared::{read_frame, Packet, ServerId};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct ResultCorrelator {
    manager: SharedManager,
    events: Arc<EventBus>,
}

impl ResultCorrelator {
    pub fn new(manager: SharedManager, events: Arc<EventBus>) -> Self {
        Self { manager, events }
    }

    /// Applies one frame received from a registered server.
    pub async fn handle_packet(&self, server_id: &ServerId, packet: Packet) -> Result<(), HubError> {
        match packet {
            Packet::StatusUpdate { status } => {
                let updated = self.manager.write().await.update_status(server_id, status);
                match updated {
                    Some(status) => {
                        self.events.publish(HubEvent::StatusUpdated {
                            server_id: server_id.clone(),
                            status,
                        });
                    }
                    None => debug!("Dropping status from removed server {}", server_id),
                }
                Ok(())
            }
            Packet::CommandResult { command, output } => {
                self.events.publish(HubEvent::CommandResult(CommandResult {
                    server_id: server_id.clone(),
                    command,
                    output,
                }));
                Ok(())
            }
            other => Err(HubError::UnexpectedPacket(other.kind())),
        }
    }

    /// Reads until the peer closes the stream, a frame fails to decode, or
    /// `cancel` fires. A clean close and cancellation both return `Ok`.
    pub async fn run<R>(
        &self,
        reader: &mut R,
        server_id: &ServerId,
        cancel: &CancellationToken,
        max_frame_len: usize,
    ) -> Result<(), HubError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                frame = read_frame(reader, max_frame_len) => frame?,
            };

            match frame {
                Some(packet) => self.handle_packet(server_id, packet).await?,
                None => {
                    info!("Server {} closed the connection", server_id);
                    return Ok(());
                }
            }
        }
    }
}
