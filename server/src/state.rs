//! Live status table for registered game servers.

use shared::{ServerId, ServerStatus};
use std::collections::HashMap;
use std::sync::Arc;

/// Aggregate view behind the "online servers" query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlineSummary {
    pub servers_online: usize,
    pub total_players: u64,
    /// Sorted by server id
    pub servers: Vec<(ServerId, Arc<ServerStatus>)>,
}

/// Most recent status per server.
///
/// Snapshots are stored behind `Arc` so readers can hold on to them while
/// newer broadcasts replace the entry.
#[derive(Debug, Default)]
pub struct ServerStateStore {
    statuses: HashMap<ServerId, Arc<ServerStatus>>,
}

impl ServerStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever was stored for `server_id` and returns the new snapshot.
    pub fn upsert(&mut self, server_id: ServerId, status: ServerStatus) -> Arc<ServerStatus> {
        let status = Arc::new(status);
        self.statuses.insert(server_id, Arc::clone(&status));
        status
    }

    pub fn get(&self, server_id: &str) -> Option<Arc<ServerStatus>> {
        self.statuses.get(server_id).cloned()
    }

    pub fn get_all(&self) -> Vec<(ServerId, Arc<ServerStatus>)> {
        let mut all: Vec<_> = self
            .statuses
            .iter()
            .map(|(id, status)| (id.clone(), Arc::clone(status)))
            .collect();
        all.sort_by(|(a, _), (b, _)| a.cmp(b));
        all
    }

    pub fn remove(&mut self, server_id: &str) -> Option<Arc<ServerStatus>> {
        self.statuses.remove(server_id)
    }

    pub fn summary(&self) -> OnlineSummary {
        let servers = self.get_all();
        OnlineSummary {
            servers_online: servers.len(),
            total_players: servers
                .iter()
                .map(|(_, status)| u64::from(status.players_online))
                .sum(),
            servers,
        }
    }

    pub fn contains(&self, server_id: &str) -> bool {
        self.statuses.contains_key(server_id)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
