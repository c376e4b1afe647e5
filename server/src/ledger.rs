//! Pairs command results with the requests that caused them.
//!
//! The wire carries no request id, so a result is matched to the oldest
//! request still pending for the same server. That is only as accurate as
//! the game server's own ordering.

use crate::events::CommandResult;
use shared::ServerId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Caller-chosen tag for a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub server_id: ServerId,
    pub command: String,
    pub args: Vec<String>,
    pub token: RequestToken,
}

impl CommandRequest {
    pub fn new(
        server_id: impl Into<ServerId>,
        command: impl Into<String>,
        args: Vec<String>,
        token: RequestToken,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            command: command.into(),
            args,
            token,
        }
    }
}

#[derive(Debug, Default)]
pub struct CommandLedger {
    pending: Mutex<HashMap<ServerId, VecDeque<CommandRequest>>>,
}

impl CommandLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, request: CommandRequest) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(request.server_id.clone())
            .or_default()
            .push_back(request);
    }

    /// Runs `send` with the ledger locked and records the request only if it
    /// succeeded. A result cannot be resolved, and the server cannot be
    /// forgotten, between the send and the record.
    pub fn record_with<E>(
        &self,
        request: CommandRequest,
        send: impl FnOnce() -> Result<(), E>,
    ) -> Result<(), E> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        send()?;
        pending
            .entry(request.server_id.clone())
            .or_default()
            .push_back(request);
        Ok(())
    }

    /// Pops the oldest request pending for the result's server.
    pub fn resolve(&self, result: &CommandResult) -> Option<CommandRequest> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = pending.get_mut(result.server_id.as_str())?;
        let request = queue.pop_front();
        if queue.is_empty() {
            pending.remove(result.server_id.as_str());
        }
        request
    }

    /// Drops everything pending for a server. Returns the discarded requests.
    pub fn forget(&self, server_id: &str) -> Vec<CommandRequest> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(server_id)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn pending_for(&self, server_id: &str) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(server_id)
            .map_or(0, VecDeque::len)
    }
}
