//! Out-of-band delivery of hub events to front ends.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: a full
//! queue loses the event and a dropped subscriber is pruned on the next
//! publish.

use log::{debug, warn};
use shared::{ServerId, ServerStatus};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Output returned by a game server for an earlier command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub server_id: ServerId,
    pub command: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Connected {
        server_id: ServerId,
        status: Arc<ServerStatus>,
    },
    StatusUpdated {
        server_id: ServerId,
        status: Arc<ServerStatus>,
    },
    CommandResult(CommandResult),
    Disconnected {
        server_id: ServerId,
    },
}

impl HubEvent {
    pub fn server_id(&self) -> &ServerId {
        match self {
            HubEvent::Connected { server_id, .. }
            | HubEvent::StatusUpdated { server_id, .. }
            | HubEvent::Disconnected { server_id } => server_id,
            HubEvent::CommandResult(result) => &result.server_id,
        }
    }
}

struct Subscriber {
    filter: Option<ServerId>,
    sender: mpsc::Sender<HubEvent>,
}

impl Subscriber {
    fn wants(&self, event: &HubEvent) -> bool {
        match &self.filter {
            Some(server_id) => server_id == event.server_id(),
            None => true,
        }
    }
}

pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Receives every event the hub publishes.
    pub fn subscribe(&self) -> EventSubscription {
        self.add_subscriber(None)
    }

    /// Receives only the events of one server.
    pub fn subscribe_to(&self, server_id: ServerId) -> EventSubscription {
        self.add_subscriber(Some(server_id))
    }

    fn add_subscriber(&self, filter: Option<ServerId>) -> EventSubscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { filter, sender });
        EventSubscription { receiver }
    }

    /// Hands `event` to every interested subscriber and returns how many
    /// accepted it.
    pub fn publish(&self, event: HubEvent) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        subscribers.retain(|subscriber| {
            if !subscriber.wants(&event) {
                return !subscriber.sender.is_closed();
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Event queue full, dropping event for server {}",
                        event.server_id()
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });

        if delivered == 0 {
            debug!("No subscriber took event for server {}", event.server_id());
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|subscriber| !subscriber.sender.is_closed())
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub struct EventSubscription {
    receiver: mpsc::Receiver<HubEvent>,
}

impl EventSubscription {
    /// Waits for the next event. `None` once the hub has gone away.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HubEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
