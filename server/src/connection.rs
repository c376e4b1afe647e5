//! A single game-server session as seen by the hub.
//!
//! A [`ServerConnection`] is a handle: it carries the sending side of the
//! connection's outbound queue and its cancellation token, never the socket.
//! The socket halves belong to the reader and writer tasks spawned by the
//! network layer.

use crate::error::HubError;
use log::warn;
use shared::ServerId;
use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Identifies one TCP session; a server that reconnects gets a new one.
pub type ConnectionId = u64;

/// Lifecycle of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered,
    Active,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Registered)
                | (Registered, Active)
                | (Connecting, Closed)
                | (Registered, Closed)
                | (Active, Closed)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ServerConnection {
    /// Assigned by the manager on registration
    pub id: ConnectionId,
    pub server_id: ServerId,
    pub remote_addr: SocketAddr,
    pub connected_at: SystemTime,
    state: ConnectionState,
    outbound: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
}

impl ServerConnection {
    pub fn new(
        server_id: ServerId,
        remote_addr: SocketAddr,
        outbound: mpsc::Sender<Vec<u8>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: 0,
            server_id,
            remote_addr,
            connected_at: SystemTime::now(),
            state: ConnectionState::Connecting,
            outbound,
            cancel,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Moves to `next` if the lifecycle allows it. Returns false otherwise.
    pub fn advance(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(
                "Rejected state change {:?} -> {:?} for server {}",
                self.state, next, self.server_id
            );
            return false;
        }
        self.state = next;
        true
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active && !self.is_closed()
    }

    /// True once the connection's tasks have been told to stop or the
    /// writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }

    /// Queues an encoded frame for the connection's writer task.
    ///
    /// Never waits on the socket; the writer drains the queue in order. A
    /// peer that stops reading fills its queue and further frames are
    /// refused with `OutboundQueueFull`.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), HubError> {
        if !self.is_active() {
            return Err(HubError::ServerNotConnected(self.server_id.clone()));
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => HubError::OutboundQueueFull(self.server_id.clone()),
            TrySendError::Closed(_) => HubError::ServerNotConnected(self.server_id.clone()),
        })
    }

    /// Signals the reader and writer tasks to stop.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.state = ConnectionState::Closed;
    }
}
