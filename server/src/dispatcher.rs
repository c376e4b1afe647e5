//! Fire-and-forget delivery of commands to game servers.

use crate::error::HubError;
use crate::ledger::{CommandLedger, CommandRequest};
use crate::manager::SharedManager;
use log::debug;
use shared::{encode, Packet};
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandDispatcher {
    manager: SharedManager,
    ledger: Arc<CommandLedger>,
}

impl CommandDispatcher {
    pub fn new(manager: SharedManager, ledger: Arc<CommandLedger>) -> Self {
        Self { manager, ledger }
    }

    /// Queues `ExecuteCommand` for a server. Returns as soon as the frame is
    /// queued; the reply arrives later as an event.
    pub async fn dispatch(
        &self,
        server_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<(), HubError> {
        let packet = Packet::ExecuteCommand {
            command: command.to_string(),
            args: args.to_vec(),
        };
        self.enqueue(server_id, &packet).await?;
        debug!("Dispatched '{}' to server {}", command, server_id);
        Ok(())
    }

    /// Queues `RestartRequest` for a server.
    pub async fn restart(&self, server_id: &str) -> Result<(), HubError> {
        self.enqueue(server_id, &Packet::RestartRequest).await?;
        debug!("Requested restart of server {}", server_id);
        Ok(())
    }

    /// Dispatches a request and records it in the ledger if it was queued.
    ///
    /// The record happens under the same manager lock that validated the
    /// connection, so a concurrent close cannot leave it orphaned.
    pub async fn submit(&self, request: CommandRequest) -> Result<(), HubError> {
        let frame = encode(&Packet::ExecuteCommand {
            command: request.command.clone(),
            args: request.args.clone(),
        })
        .map_err(HubError::EncodingFailure)?;
        let server_id = request.server_id.clone();
        let command = request.command.clone();

        let manager = self.manager.read().await;
        self.ledger
            .record_with(request, || manager.send(server_id.as_str(), frame))?;
        debug!("Submitted '{}' to server {}", command, server_id);
        Ok(())
    }

    async fn enqueue(&self, server_id: &str, packet: &Packet) -> Result<(), HubError> {
        let frame = encode(packet).map_err(HubError::EncodingFailure)?;
        let manager = self.manager.read().await;
        manager.send(server_id, frame)
    }
}
