//! Round variants and the contract the session manager drives them through
//!
//! A round owns its configuration, its timeline (`start_time` when execution
//! begins, `active_time` when the stimulus goes live) and one result record
//! per player. All times are seconds on the server timeline and are passed in
//! explicitly so the manager decides what "now" is.
//!
//! The manager runs the timeline on its own task:
//!
//! 1. [`Round::begin`] at task start
//! 2. sleep [`Timeline::stimulus_delay`]
//! 3. [`Round::activate`]
//! 4. sleep the rest of [`Timeline::max_duration`]
//!
//! Clicks may arrive at any point in between and are judged against whatever
//! the timeline has recorded so far.

pub mod brightness;
pub mod click_box;
pub mod color_change;
pub mod double_trouble;
pub mod tic_tac_toe;

use crate::players::RosterEntry;
use rand::Rng;
use shared::{
    ClickPayload, ClickResult, ClickStatus, PlayerId, ResultEntry, RoundData, RoundType,
};
use std::collections::HashMap;
use std::time::Duration;

pub use brightness::BrightnessRound;
pub use click_box::ClickBoxRound;
pub use color_change::ColorChangeRound;
pub use double_trouble::DoubleTroubleRound;
pub use tic_tac_toe::TicTacToeRound;

/// Pre-stimulus delay and total length of a round
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    pub stimulus_delay: Duration,
    pub max_duration: Duration,
}

impl Timeline {
    pub fn from_secs(stimulus_delay: f64, max_duration: f64) -> Self {
        Self {
            stimulus_delay: Duration::from_secs_f64(stimulus_delay),
            max_duration: Duration::from_secs_f64(max_duration),
        }
    }
}

/// Client-reported clock readings mapped onto the server timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSync {
    pub server_now: f64,
    pub client_now: f64,
    pub client_click: f64,
}

impl ClockSync {
    /// Missing client readings fall back to the server's own clock
    pub fn new(payload: &ClickPayload, server_now: f64) -> Self {
        Self {
            server_now,
            client_now: payload.client_now.unwrap_or(server_now),
            client_click: payload.client_click.unwrap_or(server_now),
        }
    }

    pub fn skew(&self) -> f64 {
        self.server_now - self.client_now
    }

    /// Moves a client-clock instant onto the server timeline
    pub fn to_server(&self, client_time: f64) -> f64 {
        client_time + self.skew()
    }

    pub fn adjusted_click(&self) -> f64 {
        self.to_server(self.client_click)
    }
}

/// State every variant carries: timeline marks, roster snapshot and results
#[derive(Debug, Clone)]
pub struct RoundCore {
    pub start_time: Option<f64>,
    pub active_time: Option<f64>,
    pub roster: Vec<RosterEntry>,
    pub results: HashMap<PlayerId, ClickResult>,
}

impl RoundCore {
    pub fn new(roster: Vec<RosterEntry>) -> Self {
        Self {
            start_time: None,
            active_time: None,
            roster,
            results: HashMap::new(),
        }
    }

    pub fn record(&mut self, player_id: PlayerId, result: ClickResult) {
        self.results.insert(player_id, result);
    }

    /// Whether the player was registered when the round started
    pub fn in_roster(&self, player_id: PlayerId) -> bool {
        self.roster.iter().any(|entry| entry.id == player_id)
    }

    pub fn all_clicked(&self) -> bool {
        self.roster
            .iter()
            .all(|entry| self.results.contains_key(&entry.id))
    }

    /// Elapsed time since start exceeds `max_duration`; false before start
    pub fn past_max_duration(&self, now: f64, max_duration: f64) -> bool {
        self.start_time
            .map_or(false, |start| now - start > max_duration)
    }

    /// Stimulus is live and more than `window` seconds have passed since
    pub fn past_window(&self, now: f64, window: f64) -> bool {
        self.active_time.map_or(false, |active| now - active > window)
    }

    /// One entry per roster player; `missing` fills in for non-clickers
    pub fn backfill(&self, missing: impl Fn() -> ClickResult) -> Vec<ResultEntry> {
        self.roster
            .iter()
            .map(|entry| ResultEntry {
                player_id: entry.id,
                username: entry.username.clone(),
                result: self
                    .results
                    .get(&entry.id)
                    .cloned()
                    .unwrap_or_else(&missing),
            })
            .collect()
    }
}

/// Behavior shared by every round variant
pub trait Round: Send + Sync {
    fn round_type(&self) -> RoundType;

    /// Configuration safe to reveal before the stimulus
    fn client_data(&self) -> RoundData;

    fn timeline(&self) -> Timeline;

    fn core(&self) -> &RoundCore;

    fn core_mut(&mut self) -> &mut RoundCore;

    fn process_click(
        &mut self,
        player_id: PlayerId,
        payload: &ClickPayload,
        server_now: f64,
    ) -> ClickResult;

    /// Whether the round may end before its timeline runs out
    fn should_end(&self, now: f64) -> bool;

    /// Final per-player results, non-clickers backfilled
    fn results(&self) -> shared::RoundResults;

    fn begin(&mut self, now: f64) {
        self.core_mut().start_time = Some(now);
    }

    /// Marks the stimulus live; never earlier than the start mark
    fn activate(&mut self, now: f64) {
        let core = self.core_mut();
        let at = core.start_time.map_or(now, |start| now.max(start));
        core.active_time = Some(at);
    }

    fn start_time(&self) -> Option<f64> {
        self.core().start_time
    }

    fn active_time(&self) -> Option<f64> {
        self.core().active_time
    }
}

/// The closed set of round variants a session draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum RoundKind {
    ColorChange,
    Brightness,
    ClickBox,
    DoubleTrouble,
    TicTacToe,
}

impl RoundKind {
    pub const ALL: [RoundKind; 5] = [
        RoundKind::ColorChange,
        RoundKind::Brightness,
        RoundKind::ClickBox,
        RoundKind::DoubleTrouble,
        RoundKind::TicTacToe,
    ];

    pub fn round_type(&self) -> RoundType {
        match self {
            Self::ColorChange => RoundType::ColorChange,
            Self::Brightness => RoundType::Brightness,
            Self::ClickBox => RoundType::ClickBox,
            Self::DoubleTrouble => RoundType::DoubleTrouble,
            Self::TicTacToe => RoundType::TicTacToe,
        }
    }

    /// Builds a fresh round with randomized configuration
    pub fn build<R: Rng + ?Sized>(&self, roster: Vec<RosterEntry>, rng: &mut R) -> Box<dyn Round> {
        match self {
            Self::ColorChange => Box::new(ColorChangeRound::new(roster, rng)),
            Self::Brightness => Box::new(BrightnessRound::new(roster, rng)),
            Self::ClickBox => Box::new(ClickBoxRound::new(roster, rng)),
            Self::DoubleTrouble => Box::new(DoubleTroubleRound::new(roster, rng)),
            Self::TicTacToe => Box::new(TicTacToeRound::new(roster, rng)),
        }
    }
}

/// Result for a click carrying a position the variant cannot use
pub(crate) fn invalid_click(message: &str) -> ClickResult {
    ClickResult::new(ClickStatus::Invalid, message)
}
