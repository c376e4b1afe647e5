//! Registry of live game-server connections.
//!
//! This module owns the mapping from [`ServerId`] to the live session and
//! the status table that goes with it:
//! - Registration with duplicate rejection
//! - Lookup and listing of active servers
//! - Enqueueing outbound frames on a server's writer
//! - The single close path that removes a server from both tables
//!
//! The manager itself is a plain struct. The hub shares it as
//! [`SharedManager`], so every mutation of the registry and the status
//! table happens under one write lock and readers never see the two
//! disagree.

use crate::connection::{ConnectionId, ConnectionState, ServerConnection};
use crate::error::HubError;
use crate::state::{OnlineSummary, ServerStateStore};
use log::info;
use shared::{ServerId, ServerStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedManager = Arc<RwLock<ConnectionManager>>;

pub struct ConnectionManager {
    /// Active connections indexed by the id they registered with
    connections: HashMap<ServerId, ServerConnection>,
    /// Last status broadcast for each entry in `connections`
    store: ServerStateStore,
    /// Next id handed to a registering connection
    next_connection_id: ConnectionId,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            store: ServerStateStore::new(),
            next_connection_id: 1,
        }
    }

    pub fn shared() -> SharedManager {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Registers a connection that has sent its `Register` frame.
    ///
    /// Fails with `DuplicateServerId` when the id is held by an active
    /// connection. The existing connection is left untouched so a flapping
    /// server cannot knock out its own healthy session. An entry that is
    /// already closing is evicted instead.
    pub fn register(
        &mut self,
        mut connection: ServerConnection,
        status: ServerStatus,
    ) -> Result<(ConnectionId, Arc<ServerStatus>), HubError> {
        let server_id = connection.server_id.clone();
        if let Some(existing) = self.connections.get(server_id.as_str()) {
            if existing.is_active() {
                return Err(HubError::DuplicateServerId(server_id));
            }
            self.evict_stale(&server_id);
        }

        if connection.state() == ConnectionState::Connecting {
            connection.advance(ConnectionState::Registered);
        }
        if !connection.advance(ConnectionState::Active) {
            return Err(HubError::ServerNotConnected(server_id));
        }

        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;
        connection.id = connection_id;

        info!(
            "Server {} registered from {} (connection {})",
            server_id, connection.remote_addr, connection_id
        );
        self.connections.insert(server_id.clone(), connection);
        let status = self.store.upsert(server_id, status);
        Ok((connection_id, status))
    }

    pub fn lookup(&self, server_id: &str) -> Result<&ServerConnection, HubError> {
        self.connections
            .get(server_id)
            .ok_or_else(|| HubError::NotFound(ServerId::new(server_id)))
    }

    /// Sorted ids of every registered server.
    pub fn list_active(&self) -> Vec<ServerId> {
        let mut ids: Vec<ServerId> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Queues an encoded frame for a server's writer.
    pub fn send(&self, server_id: &str, frame: Vec<u8>) -> Result<(), HubError> {
        match self.connections.get(server_id) {
            Some(connection) => connection.send(frame),
            None => Err(HubError::ServerNotConnected(ServerId::new(server_id))),
        }
    }

    /// Applies a status broadcast. Ignored once the server has been removed.
    pub fn update_status(
        &mut self,
        server_id: &ServerId,
        status: ServerStatus,
    ) -> Option<Arc<ServerStatus>> {
        if !self.connections.contains_key(server_id.as_str()) {
            return None;
        }
        Some(self.store.upsert(server_id.clone(), status))
    }

    /// Removes a server from the registry and the status table together.
    ///
    /// Only the connection that registered the entry can remove it, so a
    /// stale close cannot evict a newer session under the same id.
    /// Returns true if the entry was removed.
    pub fn close(&mut self, server_id: &ServerId, connection_id: ConnectionId) -> bool {
        let owned = self
            .connections
            .get(server_id.as_str())
            .map(|connection| connection.id == connection_id)
            .unwrap_or(false);
        if !owned {
            return false;
        }

        if let Some(mut connection) = self.connections.remove(server_id.as_str()) {
            connection.close();
        }
        self.store.remove(server_id.as_str());
        info!("Server {} disconnected (connection {})", server_id, connection_id);
        true
    }

    /// Removes an entry whose connection is closing but whose own close path
    /// has not run yet. Returns the evicted connection's id.
    ///
    /// The evicted session's later `close` is a no-op because its
    /// connection id no longer owns the entry.
    pub fn evict_stale(&mut self, server_id: &ServerId) -> Option<ConnectionId> {
        let stale = self
            .connections
            .get(server_id.as_str())
            .map(|connection| !connection.is_active())
            .unwrap_or(false);
        if !stale {
            return None;
        }

        let mut connection = self.connections.remove(server_id.as_str())?;
        connection.close();
        self.store.remove(server_id.as_str());
        info!(
            "Evicted stale entry for server {} (connection {})",
            server_id, connection.id
        );
        Some(connection.id)
    }

    /// Tells every connection to stop. Entries are removed by each
    /// connection's own close path as its tasks wind down.
    pub fn close_all(&mut self) -> usize {
        for connection in self.connections.values_mut() {
            connection.close();
        }
        self.connections.len()
    }

    pub fn status(&self, server_id: &str) -> Option<Arc<ServerStatus>> {
        self.store.get(server_id)
    }

    pub fn get_all(&self) -> Vec<(ServerId, Arc<ServerStatus>)> {
        self.store.get_all()
    }

    pub fn summary(&self) -> OnlineSummary {
        self.store.summary()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
