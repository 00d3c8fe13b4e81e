//! Player registry and leaderboard aggregation
//!
//! The registry keeps `username -> id` a bijection: registering a username
//! that is already taken evicts the previous holder, and a connection that
//! re-registers under a new name gives up its old one.

use log::info;
use shared::{LeaderboardEntry, PlayerId, RoundResults, LEADERBOARD_SIZE};
use std::collections::HashMap;

/// A registered player and their running statistics
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub rounds_played: u32,
    /// Running average reaction time in seconds
    pub avg_time: f64,
    pub ready: bool,
    /// Registration order, used to keep leaderboard ties stable
    seq: u64,
}

impl Player {
    fn new(id: PlayerId, username: String, seq: u64) -> Self {
        Self {
            id,
            username,
            rounds_played: 0,
            avg_time: 0.0,
            ready: true,
            seq,
        }
    }

    /// Folds one more round into the running average
    pub fn record_round(&mut self, reaction_time: f64) {
        let total = self.avg_time * self.rounds_played as f64;
        self.rounds_played += 1;
        self.avg_time = (total + reaction_time) / self.rounds_played as f64;
    }
}

/// Id and username of a player at the moment a round was built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub username: String,
}

/// Outcome of a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Player that previously held the username, if any
    pub evicted: Option<PlayerId>,
}

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
    username_to_id: HashMap<String, PlayerId>,
    next_seq: u64,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `id` under `username`, evicting whoever held the name before
    pub fn register(&mut self, id: PlayerId, username: &str) -> Admission {
        let mut evicted = None;

        if let Some(old_id) = self.username_to_id.get(username).copied() {
            if old_id != id && self.players.remove(&old_id).is_some() {
                info!("Evicted player {} holding username '{}'", old_id, username);
                evicted = Some(old_id);
            }
        }

        // Same connection under a new name drops the old mapping
        if let Some(previous) = self.players.get(&id) {
            if previous.username != username {
                self.username_to_id.remove(&previous.username);
            }
        }

        self.username_to_id.insert(username.to_string(), id);

        let seq = match self.players.get(&id) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.players
            .insert(id, Player::new(id, username.to_string(), seq));
        info!("Registered player {} as '{}'", id, username);

        Admission { evicted }
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        if self.username_to_id.get(&player.username) == Some(&id) {
            self.username_to_id.remove(&player.username);
        }
        info!("Removed player {} ('{}')", id, player.username);
        Some(player)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn id_for(&self, username: &str) -> Option<PlayerId> {
        self.username_to_id.get(username).copied()
    }

    pub fn set_ready(&mut self, id: PlayerId) -> bool {
        match self.players.get_mut(&id) {
            Some(player) => {
                player.ready = true;
                true
            }
            None => false,
        }
    }

    pub fn clear_ready(&mut self) {
        for player in self.players.values_mut() {
            player.ready = false;
        }
    }

    /// True when at least one player is registered and every player is ready
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.ready)
    }

    /// Registered players in registration order
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.ordered()
            .into_iter()
            .map(|p| RosterEntry {
                id: p.id,
                username: p.username.clone(),
            })
            .collect()
    }

    /// Folds round results into each still-registered player's average
    pub fn apply_results(&mut self, results: &RoundResults) {
        for entry in &results.entries {
            if let Some(player) = self.players.get_mut(&entry.player_id) {
                player.record_round(entry.result.scored_time());
            }
        }
    }

    /// Players with at least one round, fastest average first
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut ranked: Vec<&Player> = self
            .ordered()
            .into_iter()
            .filter(|p| p.rounds_played > 0)
            .collect();

        // sort_by is stable, so ties keep registration order
        ranked.sort_by(|a, b| a.avg_time.total_cmp(&b.avg_time));

        ranked
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .map(|p| LeaderboardEntry {
                player_id: p.id,
                username: p.username.clone(),
                avg_time: p.avg_time,
                rounds_played: p.rounds_played,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    fn ordered(&self) -> Vec<&Player> {
        let mut players: Vec<&Player> = self.players.values().collect();
        players.sort_by_key(|p| p.seq);
        players
    }
}
