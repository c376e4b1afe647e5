use crate::connection::ServerConnection;
use crate::dispatcher::CommandDispatcher;
use crate::error::HubError;
use crate::events::{CommandResult, EventBus, EventSubscription};
use crate::ledger::{CommandLedger, CommandRequest};
use crate::manager::SharedManager;
use crate::state::OnlineSummary;
use shared::{ServerId, ServerStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cloneable front-end view of a running hub.
///
/// Every operation a chat bot or console needs goes through here; none of
/// them wait on a game server's socket.
#[derive(Clone)]
pub struct HubHandle {
    manager: SharedManager,
    dispatcher: CommandDispatcher,
    events: Arc<EventBus>,
    ledger: Arc<CommandLedger>,
    shutdown: CancellationToken,
}

impl HubHandle {
    pub(crate) fn new(
        manager: SharedManager,
        events: Arc<EventBus>,
        ledger: Arc<CommandLedger>,
        shutdown: CancellationToken,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(Arc::clone(&manager), Arc::clone(&ledger));
        Self {
            manager,
            dispatcher,
            events,
            ledger,
            shutdown,
        }
    }

    pub async fn dispatch(
        &self,
        server_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<(), HubError> {
        self.ensure_running()?;
        self.dispatcher.dispatch(server_id, command, args).await
    }

    pub async fn restart(&self, server_id: &str) -> Result<(), HubError> {
        self.ensure_running()?;
        self.dispatcher.restart(server_id).await
    }

    pub async fn submit(&self, request: CommandRequest) -> Result<(), HubError> {
        self.ensure_running()?;
        self.dispatcher.submit(request).await
    }

    pub async fn list_active(&self) -> Vec<ServerId> {
        self.manager.read().await.list_active()
    }

    pub async fn get_all(&self) -> Vec<(ServerId, Arc<ServerStatus>)> {
        self.manager.read().await.get_all()
    }

    pub async fn online_summary(&self) -> OnlineSummary {
        self.manager.read().await.summary()
    }

    pub async fn lookup(&self, server_id: &str) -> Result<ServerConnection, HubError> {
        self.manager.read().await.lookup(server_id).cloned()
    }

    pub async fn status(&self, server_id: &str) -> Option<Arc<ServerStatus>> {
        self.manager.read().await.status(server_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.manager.read().await.len()
    }

    pub fn subscribe(&self) -> EventSubscription {
        self.events.subscribe()
    }

    pub fn subscribe_to(&self, server_id: impl Into<ServerId>) -> EventSubscription {
        self.events.subscribe_to(server_id.into())
    }

    /// Matches a received result with the oldest request submitted to the
    /// same server.
    pub fn resolve(&self, result: &CommandResult) -> Option<CommandRequest> {
        self.ledger.resolve(result)
    }

    pub fn pending_requests(&self, server_id: &str) -> usize {
        self.ledger.pending_for(server_id)
    }

    /// Asks the hub to stop. [`Hub::run`](crate::network::Hub::run) returns
    /// once every connection has been closed.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Completes once shutdown has been requested.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }

    fn ensure_running(&self) -> Result<(), HubError> {
        if self.is_shutting_down() {
            return Err(HubError::ShuttingDown);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ConnectionManager;
    use shared::{decode, Packet};
    use tokio::sync::mpsc;

    fn test_handle() -> HubHandle {
        HubHandle::new(
            ConnectionManager::shared(),
            Arc::new(EventBus::new(8)),
            Arc::new(CommandLedger::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_empty_hub_queries() {
        let handle = test_handle();
        assert!(handle.list_active().await.is_empty());
        assert!(handle.get_all().await.is_empty());
        assert_eq!(handle.online_summary().await.servers_online, 0);
        assert!(matches!(
            handle.lookup("alpha").await,
            Err(HubError::NotFound(_))
        ));
        assert!(matches!(
            handle.dispatch("alpha", "tps", &[]).await,
            Err(HubError::ServerNotConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_through_handle() {
        let handle = test_handle();
        let (tx, mut rx) = mpsc::channel(8);
        let connection = ServerConnection::new(
            ServerId::new("alpha"),
            "127.0.0.1:40000".parse().unwrap(),
            tx,
            CancellationToken::new(),
        );
        handle
            .manager
            .write()
            .await
            .register(connection, ServerStatus::new("Alpha", "", 20))
            .unwrap();

        assert_eq!(handle.lookup("alpha").await.unwrap().id, 1);
        handle.dispatch("alpha", "tps", &[]).await.unwrap();
        assert_eq!(
            decode(&rx.recv().await.unwrap()).unwrap(),
            Packet::ExecuteCommand {
                command: "tps".to_string(),
                args: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_operations_rejected_after_shutdown() {
        let handle = test_handle();
        handle.shutdown();
        assert!(handle.is_shutting_down());
        assert!(matches!(
            handle.restart("alpha").await,
            Err(HubError::ShuttingDown)
        ));
    }
}
