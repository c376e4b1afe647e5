//! Wire types shared by the Polychat hub and the game servers connected to it.
//!
//! Everything that crosses the TCP link lives here: the identifiers, the
//! status snapshot a game server broadcasts, the [`Packet`] vocabulary and
//! the length-prefixed [`codec`] that frames it.

pub mod codec;

pub use codec::{
    decode, decode_frame, encode, read_frame, write_frame, CodecError, LENGTH_PREFIX_LEN,
    MAX_FRAME_LEN,
};

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Stable identifier a game server registers under.
///
/// Reconnecting with the same id is treated as the same server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ServerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ServerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Occupancy snapshot broadcast by a game server.
///
/// A new snapshot always replaces the previous one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub server_name: String,
    pub server_address: String,
    pub players_online: u32,
    pub max_players: u32,
    pub online_player_names: Vec<String>,
}

impl ServerStatus {
    pub fn new(
        server_name: impl Into<String>,
        server_address: impl Into<String>,
        max_players: u32,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            server_address: server_address.into(),
            players_online: 0,
            max_players,
            online_player_names: Vec::new(),
        }
    }

    /// Replaces the player list and keeps the online count in step with it.
    pub fn with_players<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.online_player_names = names.into_iter().map(Into::into).collect();
        self.players_online = self.online_player_names.len() as u32;
        self
    }

    pub fn is_full(&self) -> bool {
        self.players_online >= self.max_players
    }
}

/// Every message that can travel between the hub and a game server.
///
/// The declaration order fixes the variant tags on the wire, so new
/// variants must only ever be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    /// First frame on every connection, game server to hub.
    Register {
        server_id: ServerId,
        status: ServerStatus,
    },
    /// Unsolicited status broadcast, game server to hub.
    StatusUpdate { status: ServerStatus },
    /// Hub to game server.
    ExecuteCommand { command: String, args: Vec<String> },
    /// Game server to hub, answering an earlier `ExecuteCommand`.
    CommandResult { command: String, output: String },
    /// Hub to game server.
    RestartRequest,
}

impl Packet {
    /// Number of variants; any tag at or above this is rejected on decode.
    pub const VARIANT_COUNT: u32 = 5;

    /// Short name used in log lines and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Register { .. } => "Register",
            Packet::StatusUpdate { .. } => "StatusUpdate",
            Packet::ExecuteCommand { .. } => "ExecuteCommand",
            Packet::CommandResult { .. } => "CommandResult",
            Packet::RestartRequest => "RestartRequest",
        }
    }
}
