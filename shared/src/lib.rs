//! Wire protocol and data types shared between the reaction-game server and its clients.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PROTOCOL_VERSION: u32 = 1;

/// Reaction time charged for an invalid or missing click, in seconds.
pub const PENALTY_TIME: f64 = 10.0;

pub const LEADERBOARD_SIZE: usize = 20;

/// Connection-scoped player identity assigned by the server.
pub type PlayerId = u32;

/// Wall-clock time in fractional seconds since the Unix epoch.
pub fn timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs_f64()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
    },
    Register {
        username: String,
    },
    JoinWaitingRoom,
    Click {
        payload: ClickPayload,
    },
    Heartbeat,
    StatusRequest,
    Disconnect,

    // Server -> client
    Connected {
        client_id: u32,
    },
    RegistrationStatus {
        success: bool,
        player_id: PlayerId,
        username: String,
        game_state: GameState,
        round_in_progress: bool,
    },
    PlayerCount {
        count: usize,
    },
    ClickResult {
        result: ClickResult,
    },
    RoundStart {
        round_type: RoundType,
        round_data: RoundData,
    },
    RoundEnd {
        results: RoundResults,
        leaderboard: Vec<LeaderboardEntry>,
    },
    Status(StatusSnapshot),
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundType {
    ColorChange,
    Brightness,
    ClickBox,
    DoubleTrouble,
    TicTacToe,
}

impl RoundType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ColorChange => "ColorChangeRound",
            Self::Brightness => "BrightnessRound",
            Self::ClickBox => "ClickBoxRound",
            Self::DoubleTrouble => "DoubleTroubleRound",
            Self::TicTacToe => "TicTacToeRound",
        }
    }
}

impl std::fmt::Display for RoundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Position in normalized container space, both axes in `0.0..=1.0`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BoardCell {
    pub row: u8,
    pub col: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    X,
    O,
}

pub type Board = [[Option<Mark>; 3]; 3];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum ClickPosition {
    Point(Point),
    Cell(BoardCell),
}

/// What a client reports when it clicks. Times are client-clock seconds.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ClickPayload {
    pub client_now: Option<f64>,
    pub client_click: Option<f64>,
    pub position: Option<ClickPosition>,
}

impl ClickPayload {
    pub fn at(client_click: f64, client_now: f64) -> Self {
        Self {
            client_now: Some(client_now),
            client_click: Some(client_click),
            position: None,
        }
    }

    pub fn with_position(mut self, position: ClickPosition) -> Self {
        self.position = Some(position);
        self
    }
}

/// Round configuration revealed to clients when the round starts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum RoundData {
    ColorChange {
        instructions: String,
        max_duration: f64,
        delay: f64,
    },
    Brightness {
        instructions: String,
        target_brightness: u8,
        initial_pause: f64,
        brightness_duration: f64,
        max_duration: f64,
    },
    ClickBox {
        instructions: String,
        max_duration: f64,
        delay: f64,
        position: Point,
    },
    DoubleTrouble {
        instructions: String,
        max_duration: f64,
        delay: f64,
        good_position: Point,
        bad_position: Point,
        good_color: String,
        bad_color: String,
    },
    TicTacToe {
        instructions: String,
        max_duration: f64,
        delay: f64,
        board: Board,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ClickStatus {
    Success,
    TooEarly,
    TooLate,
    OffTarget,
    WrongTarget,
    NoClick,
    Invalid,
    NoRound,
    NotRegistered,
    /// Registered after the current round started
    NotInRound,
}

impl ClickStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TooEarly => "too_early",
            Self::TooLate => "too_late",
            Self::OffTarget => "off_target",
            Self::WrongTarget => "wrong_move",
            Self::NoClick => "no_click",
            Self::Invalid => "error",
            Self::NoRound => "no_round",
            Self::NotRegistered => "not_registered",
            Self::NotInRound => "not_in_round",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Outcome of one click, and the per-player record a round keeps.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClickResult {
    pub status: ClickStatus,
    pub message: String,
    /// Seconds on the server timeline.
    pub reaction_time: Option<f64>,
    pub brightness_error: Option<f64>,
    pub score: Option<u32>,
}

impl ClickResult {
    pub fn new(status: ClickStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            reaction_time: None,
            brightness_error: None,
            score: None,
        }
    }

    /// A failed click charged the full penalty time.
    pub fn penalty(status: ClickStatus, message: impl Into<String>) -> Self {
        Self::new(status, message).with_reaction_time(PENALTY_TIME)
    }

    pub fn with_reaction_time(mut self, reaction_time: f64) -> Self {
        self.reaction_time = Some(reaction_time);
        self
    }

    pub fn with_brightness_error(mut self, error: f64) -> Self {
        self.brightness_error = Some(error);
        self
    }

    pub fn with_score(mut self, score: u32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn success(&self) -> bool {
        self.status.is_success()
    }

    /// Reaction time folded into a player's running average.
    pub fn scored_time(&self) -> f64 {
        self.reaction_time.unwrap_or(PENALTY_TIME)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResultEntry {
    pub player_id: PlayerId,
    pub username: String,
    pub result: ClickResult,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoundResults {
    pub round_type: RoundType,
    pub entries: Vec<ResultEntry>,
    /// Revealed once a tic-tac-toe round is over.
    pub winning_move: Option<BoardCell>,
}

impl RoundResults {
    pub fn get(&self, player_id: PlayerId) -> Option<&ClickResult> {
        self.entries
            .iter()
            .find(|entry| entry.player_id == player_id)
            .map(|entry| &entry.result)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub username: String,
    pub avg_time: f64,
    pub rounds_played: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Waiting,
    InProgress,
}

/// Session snapshot handed to a newly registered player.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameState {
    pub status: GameStatus,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub round: Option<(RoundType, RoundData)>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum CurrentRound {
    Waiting,
    Round {
        round_type: RoundType,
        in_progress: bool,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: String,
    pub active_players: usize,
    pub current_round: CurrentRound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_round_type_names() {
        assert_eq!(RoundType::ColorChange.name(), "ColorChangeRound");
        assert_eq!(RoundType::TicTacToe.to_string(), "TicTacToeRound");
    }

    #[test]
    fn test_point_distance() {
        let a = Point { x: 0.1, y: 0.1 };
        let b = Point { x: 0.4, y: 0.5 };
        assert_approx_eq!(a.distance(&b), 0.5, 1e-9);
        assert_approx_eq!(b.distance(&a), 0.5, 1e-9);
    }

    #[test]
    fn test_penalty_result() {
        let result = ClickResult::penalty(ClickStatus::TooEarly, "Too early!");
        assert!(!result.success());
        assert_eq!(result.reaction_time, Some(PENALTY_TIME));
    }

    #[test]
    fn test_scored_time_defaults_to_penalty() {
        let result = ClickResult::new(ClickStatus::WrongTarget, "Incorrect move!");
        assert_eq!(result.scored_time(), PENALTY_TIME);

        let result = ClickResult::new(ClickStatus::Success, "ok").with_reaction_time(0.42);
        assert_eq!(result.scored_time(), 0.42);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ClickStatus::WrongTarget.as_str(), "wrong_move");
        assert!(ClickStatus::Success.is_success());
        assert!(!ClickStatus::NoClick.is_success());
    }

    #[test]
    fn test_packet_serialization_click() {
        let payload = ClickPayload::at(100.25, 100.5)
            .with_position(ClickPosition::Cell(BoardCell { row: 2, col: 1 }));
        let packet = Packet::Click { payload };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Click { payload } => {
                assert_eq!(payload.client_click, Some(100.25));
                assert_eq!(payload.client_now, Some(100.5));
                assert_eq!(
                    payload.position,
                    Some(ClickPosition::Cell(BoardCell { row: 2, col: 1 }))
                );
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_round_start() {
        let mut board: Board = [[None; 3]; 3];
        board[0][0] = Some(Mark::X);
        board[1][1] = Some(Mark::O);

        let packet = Packet::RoundStart {
            round_type: RoundType::TicTacToe,
            round_data: RoundData::TicTacToe {
                instructions: "Find the winning move".to_string(),
                max_duration: 10.0,
                delay: 3.0,
                board,
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::RoundStart {
                round_type,
                round_data: RoundData::TicTacToe { board: b, .. },
            } => {
                assert_eq!(round_type, RoundType::TicTacToe);
                assert_eq!(b, board);
            }
            other => panic!("Wrong packet after deserialization: {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_secs_advances() {
        let first = timestamp_secs();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timestamp_secs() > first);
    }
}
