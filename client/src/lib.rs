//! # Polychat Game-Server Client
//!
//! The game-server half of the Polychat protocol. A game server connects to
//! the hub, registers under its id, reports its status and answers the
//! commands the hub relays to it.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - [`PeerClient`](network::PeerClient) connects and sends `Register`
//! - [`PeerSender`](network::PeerSender) pushes status broadcasts and command output
//! - [`PeerReceiver`](network::PeerReceiver) yields commands and restart requests
//!
//! ### Simulation Module (`simulation`)
//! A fake game server with players joining and leaving and a small set of
//! console commands. The `polychat-client` binary uses it to drive a hub
//! without a real game.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{PeerClient, PeerRequest};
//! use shared::{ServerId, ServerStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let status = ServerStatus::new("Alpha", "1.2.3.4:25565", 20);
//!     let peer = PeerClient::connect("127.0.0.1:5005", ServerId::new("alpha"), status).await?;
//!     let (mut sender, mut receiver) = peer.split();
//!
//!     while let Some(request) = receiver.next_request().await? {
//!         match request {
//!             PeerRequest::Execute { command, .. } => {
//!                 sender.send_result(command, "done".to_string()).await?
//!             }
//!             PeerRequest::Restart => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod simulation;
