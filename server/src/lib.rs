//! # Polychat Hub Library
//!
//! This library implements the relay hub that sits between chat front ends
//! and a fleet of game servers. Game servers connect to the hub over TCP,
//! register under a stable id and keep it informed about who is online.
//! Front ends use the hub to send commands to any registered server and
//! receive the output when the server answers.
//!
//! ## Core Responsibilities
//!
//! ### Connection Registry
//! Tracks every registered game server and its live session:
//! - Registration handshake with a timeout for silent sockets
//! - Rejection of a second session claiming an id already in use
//! - One close path that removes a server from every table at once
//!
//! ### Status Tracking
//! Keeps the most recent status snapshot of each server. Snapshots are
//! replaced wholesale and handed out as immutable `Arc`s, so the "online
//! servers" view never reflects half an update.
//!
//! ### Command Relay
//! Commands and restart requests are fire-and-forget: the hub queues the
//! frame on the server's writer and returns immediately. Results arrive
//! later on the same connection and are published as events.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! Each connection gets a reader task (the [`correlator`]) and a writer
//! task draining a bounded outbound queue. A slow or stalled game
//! server only ever blocks its own writer; once its queue is full further
//! dispatches to it fail with `OutboundQueueFull`.
//!
//! ### Shared Registry
//! The registry and status table live together in one
//! [`ConnectionManager`](manager::ConnectionManager) behind a
//! `tokio::sync::RwLock`. Queries take the read lock; registration,
//! status updates and removal take the write lock.
//!
//! ### Cancellation
//! Every connection owns a child of the hub's shutdown token. Cancelling it
//! stops both tasks; cancelling the root stops everything.
//!
//! ## Module Organization
//!
//! - `config`: [`HubConfig`] runtime settings
//! - `connection`: per-session handle and lifecycle states
//! - `manager`: registry plus status table
//! - `state`: status snapshots and the online summary
//! - `dispatcher`: outbound `ExecuteCommand` and `RestartRequest`
//! - `correlator`: inbound `StatusUpdate` and `CommandResult`
//! - `events`: subscriber queues for hub events
//! - `ledger`: pairs results with earlier requests by order
//! - `handle`: [`HubHandle`], the front-end API
//! - `network`: [`Hub`], the accept loop and connection tasks
//! - `console`: stdin front end used by the binary
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Hub, HubConfig, HubEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Hub::bind(HubConfig::default()).await?;
//!     let handle = hub.handle();
//!     let mut events = handle.subscribe();
//!     tokio::spawn(hub.run());
//!
//!     while let Some(event) = events.recv().await {
//!         if let HubEvent::Connected { server_id, .. } = event {
//!             handle.dispatch(server_id.as_str(), "tps", &[]).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod console;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handle;
pub mod ledger;
pub mod manager;
pub mod network;
pub mod state;

pub use config::HubConfig;
pub use error::{ErrorClass, HubError};
pub use events::{CommandResult, EventSubscription, HubEvent};
pub use handle::HubHandle;
pub use ledger::{CommandRequest, RequestToken};
pub use network::Hub;
pub use state::OnlineSummary;
