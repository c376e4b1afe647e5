//! A stand-in game server with fake players, used to exercise a hub.

use rand::Rng;
use shared::ServerStatus;

/// Chance per tick that a player joins.
const JOIN_CHANCE: f64 = 0.3;
/// Chance per tick that a player leaves.
const LEAVE_CHANCE: f64 = 0.2;

pub struct SimulatedServer {
    status: ServerStatus,
    tps: f64,
    next_player: u32,
}

impl SimulatedServer {
    pub fn new(name: impl Into<String>, address: impl Into<String>, max_players: u32) -> Self {
        Self {
            status: ServerStatus::new(name, address, max_players),
            tps: 20.0,
            next_player: 1,
        }
    }

    pub fn status(&self) -> &ServerStatus {
        &self.status
    }

    pub fn tps(&self) -> f64 {
        self.tps
    }

    /// Advances the simulation: players may come and go and the tick rate drifts.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) {
        if !self.status.is_full() && rng.gen_bool(JOIN_CHANCE) {
            let name = format!("player{}", self.next_player);
            self.next_player += 1;
            self.add_player(name);
        }
        if !self.status.online_player_names.is_empty() && rng.gen_bool(LEAVE_CHANCE) {
            let index = rng.gen_range(0..self.status.online_player_names.len());
            self.status.online_player_names.remove(index);
            self.sync_count();
        }
        self.tps = rng.gen_range(18.0..=20.0);
    }

    pub fn add_player(&mut self, name: impl Into<String>) -> bool {
        if self.status.is_full() {
            return false;
        }
        self.status.online_player_names.push(name.into());
        self.sync_count();
        true
    }

    /// Runs a console command and returns what the server would print.
    pub fn execute(&mut self, command: &str, args: &[String]) -> String {
        match command {
            "tps" => format!("{:.1}", self.tps),
            "list" => {
                let mut output = format!(
                    "There are {} of a max of {} players online:",
                    self.status.players_online, self.status.max_players
                );
                if !self.status.online_player_names.is_empty() {
                    output.push(' ');
                    output.push_str(&self.status.online_player_names.join(", "));
                }
                output
            }
            "say" if args.is_empty() => "Usage: say <message>".to_string(),
            "say" => format!("[Server] {}", args.join(" ")),
            "kick" => match args.first() {
                Some(name) => self.kick(name),
                None => "Usage: kick <player>".to_string(),
            },
            other => format!("Unknown command: {}", other),
        }
    }

    fn kick(&mut self, name: &str) -> String {
        let before = self.status.online_player_names.len();
        self.status.online_player_names.retain(|player| player != name);
        if self.status.online_player_names.len() == before {
            return format!("No player named {} is online", name);
        }
        self.sync_count();
        format!("Kicked {}", name)
    }

    fn sync_count(&mut self) {
        self.status.players_online = self.status.online_player_names.len() as u32;
    }
}
