//! Session and round management
//!
//! [`GameManager`] owns the player registry and the single active round. It is
//! a cheap cloneable handle: every clone shares one session behind a
//! `tokio::sync::RwLock`, and every mutation happens under its write guard.
//!
//! Round lifecycle is `IDLE -> RUNNING -> IDLE`. A round can be ended from two
//! places: its own timeline task running out, or a click after which the round
//! reports it should end early. Both paths go through [`GameManager`]'s
//! end-of-round step under the write guard and name the round id they mean to
//! end, so a round ends at most once and a stale timeline never ends a newer
//! round.

use crate::players::{Admission, PlayerRegistry};
use crate::rounds::{Round, RoundKind};
use crate::utils::now_secs;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use shared::{
    ClickPayload, ClickResult, ClickStatus, CurrentRound, GameState, GameStatus,
    LeaderboardEntry, PlayerId, RoundData, RoundResults, RoundType, StatusSnapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Notifications the manager publishes for the transport layer to broadcast
#[derive(Debug, Clone)]
pub enum GameEvent {
    RoundStart {
        round_type: RoundType,
        round_data: RoundData,
    },
    RoundEnd {
        results: RoundResults,
        leaderboard: Vec<LeaderboardEntry>,
    },
}

/// Reply to a registration attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub success: bool,
    pub player_id: PlayerId,
    pub username: String,
    pub game_state: GameState,
    pub round_in_progress: bool,
    /// Player evicted because they held the same username
    pub evicted: Option<PlayerId>,
}

struct ActiveRound {
    id: u64,
    round: Box<dyn Round>,
    /// Timeline task; kept for inspection, never aborted
    task: Option<JoinHandle<()>>,
}

struct Session {
    players: PlayerRegistry,
    current_round: Option<ActiveRound>,
    round_in_progress: bool,
    next_round_id: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            players: PlayerRegistry::new(),
            current_round: None,
            round_in_progress: false,
            next_round_id: 0,
        }
    }

    fn round_mut(&mut self, round_id: u64) -> Option<&mut Box<dyn Round>> {
        self.current_round
            .as_mut()
            .filter(|active| active.id == round_id)
            .map(|active| &mut active.round)
    }

    fn should_start_next_round(&self) -> bool {
        !self.round_in_progress && self.players.all_ready()
    }

    fn game_state(&self) -> GameState {
        let round = match &self.current_round {
            Some(active) if self.round_in_progress => {
                Some((active.round.round_type(), active.round.client_data()))
            }
            _ => None,
        };

        GameState {
            status: if self.round_in_progress {
                GameStatus::InProgress
            } else {
                GameStatus::Waiting
            },
            leaderboard: self.players.leaderboard(),
            round,
        }
    }

    fn current_round_info(&self) -> CurrentRound {
        match &self.current_round {
            None => CurrentRound::Waiting,
            Some(active) => CurrentRound::Round {
                round_type: active.round.round_type(),
                in_progress: self.round_in_progress,
            },
        }
    }
}

/// Shared handle to the game session
#[derive(Clone)]
pub struct GameManager {
    session: Arc<RwLock<Session>>,
    round_kinds: Arc<Vec<RoundKind>>,
    events: mpsc::UnboundedSender<GameEvent>,
}

impl GameManager {
    /// Creates a session drawing rounds from `round_kinds` (all kinds when empty)
    ///
    /// Returns the manager and the receiving end of its event stream.
    pub fn new(round_kinds: Vec<RoundKind>) -> (Self, mpsc::UnboundedReceiver<GameEvent>) {
        let round_kinds = if round_kinds.is_empty() {
            RoundKind::ALL.to_vec()
        } else {
            round_kinds
        };
        let (events, events_rx) = mpsc::unbounded_channel();

        let manager = Self {
            session: Arc::new(RwLock::new(Session::new())),
            round_kinds: Arc::new(round_kinds),
            events,
        };
        (manager, events_rx)
    }

    pub fn round_kinds(&self) -> &[RoundKind] {
        &self.round_kinds
    }

    /// Registers `player_id` under `username`, evicting any previous holder
    pub async fn register(&self, player_id: PlayerId, username: &str) -> Registration {
        let username = username.trim();
        let mut session = self.session.write().await;

        if username.is_empty() {
            warn!("Rejected registration with empty username from {}", player_id);
            return Registration {
                success: false,
                player_id,
                username: String::new(),
                game_state: session.game_state(),
                round_in_progress: session.round_in_progress,
                evicted: None,
            };
        }

        let Admission { evicted } = session.players.register(player_id, username);

        Registration {
            success: true,
            player_id,
            username: username.to_string(),
            game_state: session.game_state(),
            round_in_progress: session.round_in_progress,
            evicted,
        }
    }

    /// Removes a player; an in-progress round backfills them at its end
    pub async fn disconnect(&self, player_id: PlayerId) -> bool {
        let mut session = self.session.write().await;
        session.players.remove(player_id).is_some()
    }

    pub async fn mark_ready(&self, player_id: PlayerId) -> bool {
        let mut session = self.session.write().await;
        session.players.set_ready(player_id)
    }

    /// No round in progress, at least one player, and everyone ready
    pub async fn should_start_next_round(&self) -> bool {
        self.session.read().await.should_start_next_round()
    }

    /// Marks the player ready and starts a round if that completes the room
    ///
    /// Returns true if a round was started.
    pub async fn join_waiting_room(&self, player_id: PlayerId) -> bool {
        let mut session = self.session.write().await;
        if !session.players.set_ready(player_id) {
            return false;
        }
        if session.should_start_next_round() {
            return self.start_round_locked(&mut session);
        }
        false
    }

    /// Starts a random round unless one is already running
    ///
    /// Returns immediately; the round's timeline runs on its own task.
    pub async fn start_next_round(&self) -> bool {
        let mut session = self.session.write().await;
        self.start_round_locked(&mut session)
    }

    /// Judges a click against the active round
    pub async fn process_click(&self, player_id: PlayerId, payload: &ClickPayload) -> ClickResult {
        let mut session = self.session.write().await;

        if !session.round_in_progress {
            return ClickResult::new(ClickStatus::NoRound, "No round in progress");
        }
        if !session.players.contains(player_id) {
            return ClickResult::new(ClickStatus::NotRegistered, "Player not registered");
        }

        let now = now_secs();
        let Some(active) = session.current_round.as_mut() else {
            return ClickResult::new(ClickStatus::NoRound, "No round in progress");
        };
        // Late joiners wait for the next round
        if !active.round.core().in_roster(player_id) {
            return ClickResult::new(
                ClickStatus::NotInRound,
                "You joined after this round started",
            );
        }

        let result = active.round.process_click(player_id, payload, now);
        debug!(
            "Player {} clicked in round {}: {}",
            player_id,
            active.id,
            result.status.as_str()
        );

        if active.round.should_end(now) {
            self.spawn_round_end(active.id);
        }

        result
    }

    pub async fn is_round_in_progress(&self) -> bool {
        self.session.read().await.round_in_progress
    }

    pub async fn player_count(&self) -> usize {
        self.session.read().await.players.len()
    }

    /// Snapshot for a newly registered player
    pub async fn game_state(&self) -> GameState {
        self.session.read().await.game_state()
    }

    pub async fn current_round_info(&self) -> CurrentRound {
        self.session.read().await.current_round_info()
    }

    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.session.read().await.players.leaderboard()
    }

    pub async fn status(&self) -> StatusSnapshot {
        let session = self.session.read().await;
        StatusSnapshot {
            status: "online".to_string(),
            active_players: session.players.len(),
            current_round: session.current_round_info(),
        }
    }

    /// Whether the current round's timeline task is still sleeping
    pub async fn round_timeline_running(&self) -> bool {
        let session = self.session.read().await;
        session
            .current_round
            .as_ref()
            .and_then(|active| active.task.as_ref())
            .map_or(false, |task| !task.is_finished())
    }

    fn start_round_locked(&self, session: &mut Session) -> bool {
        if session.round_in_progress {
            debug!("Round start ignored: a round is already in progress");
            return false;
        }

        session.players.clear_ready();

        let round = {
            let mut rng = rand::thread_rng();
            let kind = self
                .round_kinds
                .choose(&mut rng)
                .copied()
                .unwrap_or(RoundKind::ColorChange);
            kind.build(session.players.roster(), &mut rng)
        };

        session.next_round_id += 1;
        let round_id = session.next_round_id;
        let round_type = round.round_type();
        let round_data = round.client_data();

        info!(
            "Starting round {} ({}) with {} players",
            round_id,
            round_type,
            session.players.len()
        );

        session.current_round = Some(ActiveRound {
            id: round_id,
            round,
            task: None,
        });
        session.round_in_progress = true;

        self.publish(GameEvent::RoundStart {
            round_type,
            round_data,
        });

        let task = self.spawn_round_timeline(round_id);
        if let Some(active) = session.current_round.as_mut() {
            active.task = Some(task);
        }
        true
    }

    /// Ends `round_id` if it is still the running round
    fn end_round_locked(&self, session: &mut Session, round_id: u64) -> bool {
        let results = match &session.current_round {
            Some(active) if session.round_in_progress && active.id == round_id => {
                active.round.results()
            }
            _ => {
                debug!("Round {} already ended", round_id);
                return false;
            }
        };

        session.round_in_progress = false;
        session.players.apply_results(&results);
        let leaderboard = session.players.leaderboard();

        info!(
            "Round {} ({}) ended with {} results",
            round_id,
            results.round_type,
            results.entries.len()
        );

        self.publish(GameEvent::RoundEnd {
            results,
            leaderboard,
        });

        // Ready flags were cleared at round start, so this only fires once
        // every player has re-joined the waiting room
        if session.should_start_next_round() {
            self.start_round_locked(session);
        }
        true
    }

    fn spawn_round_timeline(&self, round_id: u64) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_round_timeline(round_id).await;
        })
    }

    fn spawn_round_end(&self, round_id: u64) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut session = manager.session.write().await;
            manager.end_round_locked(&mut session, round_id);
        });
    }

    /// Sleeps through the round's timeline, then ends it if nothing else did
    async fn run_round_timeline(&self, round_id: u64) {
        let timeline = {
            let mut session = self.session.write().await;
            match session.round_mut(round_id) {
                Some(round) => {
                    round.begin(now_secs());
                    round.timeline()
                }
                None => return,
            }
        };

        sleep(timeline.stimulus_delay).await;

        let elapsed = {
            let mut session = self.session.write().await;
            match session.round_mut(round_id) {
                Some(round) => {
                    round.activate(now_secs());
                    match (round.start_time(), round.active_time()) {
                        (Some(start), Some(active)) => active - start,
                        _ => timeline.stimulus_delay.as_secs_f64(),
                    }
                }
                None => timeline.stimulus_delay.as_secs_f64(),
            }
        };
        debug!("Round {} stimulus live after {:.3}s", round_id, elapsed);

        let remaining = timeline.max_duration.as_secs_f64() - elapsed;
        if remaining > 0.0 {
            sleep(Duration::from_secs_f64(remaining)).await;
        }

        let mut session = self.session.write().await;
        self.end_round_locked(&mut session, round_id);
    }

    fn publish(&self, event: GameEvent) {
        if let Err(e) = self.events.send(event) {
            warn!("Dropped game event, no listener: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::PENALTY_TIME;
    use std::time::Instant;
    use tokio::time::timeout;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<GameEvent>) -> GameEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for game event")
            .expect("event channel closed")
    }

    fn color_change_manager() -> (GameManager, mpsc::UnboundedReceiver<GameEvent>) {
        GameManager::new(vec![RoundKind::ColorChange])
    }

    #[tokio::test]
    async fn test_empty_round_kinds_defaults_to_all() {
        let (manager, _rx) = GameManager::new(Vec::new());
        assert_eq!(manager.round_kinds(), &RoundKind::ALL);
    }

    #[tokio::test]
    async fn test_register_reports_state() {
        let (manager, _rx) = color_change_manager();

        let registration = manager.register(1, "  alice ").await;

        assert!(registration.success);
        assert_eq!(registration.username, "alice");
        assert!(!registration.round_in_progress);
        assert_eq!(registration.game_state.status, GameStatus::Waiting);
        assert!(registration.game_state.round.is_none());
        assert_eq!(manager.player_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_username_rejected() {
        let (manager, _rx) = color_change_manager();

        let registration = manager.register(1, "   ").await;

        assert!(!registration.success);
        assert_eq!(manager.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_reregistration_evicts_previous_connection() {
        let (manager, _rx) = color_change_manager();

        manager.register(1, "alice").await;
        manager.register(2, "alice").await;
        let last = manager.register(3, "alice").await;

        assert_eq!(last.evicted, Some(2));
        assert_eq!(manager.player_count().await, 1);
        assert!(!manager.mark_ready(1).await);
        assert!(!manager.mark_ready(2).await);
        assert!(manager.mark_ready(3).await);
    }

    #[tokio::test]
    async fn test_should_start_boundaries() {
        let (manager, _rx) = color_change_manager();

        // Empty registry
        assert!(!manager.should_start_next_round().await);

        // Everyone ready, nothing running
        manager.register(1, "alice").await;
        manager.register(2, "bob").await;
        assert!(manager.should_start_next_round().await);

        // One player not ready
        manager.session.write().await.players.clear_ready();
        manager.mark_ready(1).await;
        assert!(!manager.should_start_next_round().await);

        // Everyone ready but a round is in progress
        manager.mark_ready(2).await;
        assert!(manager.start_next_round().await);
        manager.mark_ready(1).await;
        manager.mark_ready(2).await;
        assert!(!manager.should_start_next_round().await);
    }

    #[tokio::test]
    async fn test_start_clears_ready_and_rejects_second_start() {
        let (manager, mut rx) = color_change_manager();
        manager.register(1, "alice").await;

        assert!(manager.start_next_round().await);
        assert!(!manager.start_next_round().await);
        assert!(manager.is_round_in_progress().await);

        {
            let session = manager.session.read().await;
            assert!(!session.players.get(1).unwrap().ready);
        }

        match next_event(&mut rx).await {
            GameEvent::RoundStart {
                round_type,
                round_data,
            } => {
                assert_eq!(round_type, RoundType::ColorChange);
                assert!(matches!(round_data, RoundData::ColorChange { .. }));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_click_without_round() {
        let (manager, _rx) = color_change_manager();
        manager.register(1, "alice").await;

        let result = manager.process_click(1, &ClickPayload::default()).await;

        assert_eq!(result.status, ClickStatus::NoRound);
        assert_eq!(result.message, "No round in progress");
    }

    #[tokio::test]
    async fn test_click_from_unregistered_player() {
        let (manager, _rx) = color_change_manager();
        manager.register(1, "alice").await;
        manager.start_next_round().await;

        let result = manager.process_click(99, &ClickPayload::default()).await;

        assert_eq!(result.status, ClickStatus::NotRegistered);
        assert!(manager.is_round_in_progress().await);
    }

    #[tokio::test]
    async fn test_game_state_during_round() {
        let (manager, _rx) = color_change_manager();
        manager.register(1, "alice").await;
        manager.start_next_round().await;

        let registration = manager.register(2, "bob").await;

        assert!(registration.round_in_progress);
        assert_eq!(registration.game_state.status, GameStatus::InProgress);
        let (round_type, _) = registration.game_state.round.unwrap();
        assert_eq!(round_type, RoundType::ColorChange);
    }

    #[tokio::test]
    async fn test_all_clicked_ends_round_early() {
        let (manager, mut rx) = color_change_manager();
        manager.register(1, "alice").await;
        manager.register(2, "bob").await;

        assert!(manager.join_waiting_room(1).await);
        assert!(matches!(next_event(&mut rx).await, GameEvent::RoundStart { .. }));

        // Both click before the color flips
        manager.process_click(1, &ClickPayload::default()).await;
        assert!(manager.is_round_in_progress().await);
        manager.process_click(2, &ClickPayload::default()).await;

        match next_event(&mut rx).await {
            GameEvent::RoundEnd {
                results,
                leaderboard,
            } => {
                assert_eq!(results.entries.len(), 2);
                assert!(results
                    .entries
                    .iter()
                    .all(|e| e.result.status == ClickStatus::TooEarly));
                assert_eq!(leaderboard.len(), 2);
                assert!(leaderboard
                    .iter()
                    .all(|e| e.rounds_played == 1 && e.avg_time == PENALTY_TIME));
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        assert!(!manager.is_round_in_progress().await);
        // Timeline keeps sleeping after an early end
        assert!(manager.round_timeline_running().await);

        // Ready flags stay cleared, so no round auto-starts
        assert!(!manager.should_start_next_round().await);
        assert!(rx.try_recv().is_err());

        assert!(!manager.join_waiting_room(1).await);
        assert!(manager.join_waiting_room(2).await);
        assert!(matches!(next_event(&mut rx).await, GameEvent::RoundStart { .. }));
    }

    #[tokio::test]
    async fn test_round_ends_at_most_once() {
        let (manager, mut rx) = color_change_manager();
        manager.register(1, "alice").await;
        manager.start_next_round().await;
        next_event(&mut rx).await;

        {
            let mut session = manager.session.write().await;
            assert!(manager.end_round_locked(&mut session, 1));
            assert!(!manager.end_round_locked(&mut session, 1));
        }

        assert!(matches!(next_event(&mut rx).await, GameEvent::RoundEnd { .. }));
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.leaderboard().await[0].rounds_played, 1);
    }

    #[tokio::test]
    async fn test_stale_round_id_cannot_end_newer_round() {
        let (manager, _rx) = color_change_manager();
        manager.register(1, "alice").await;
        manager.start_next_round().await;

        {
            let mut session = manager.session.write().await;
            assert!(manager.end_round_locked(&mut session, 1));
        }
        manager.mark_ready(1).await;
        assert!(manager.start_next_round().await);

        let mut session = manager.session.write().await;
        assert!(!manager.end_round_locked(&mut session, 1));
        assert!(session.round_in_progress);
        assert!(manager.end_round_locked(&mut session, 2));
    }

    #[tokio::test]
    async fn test_disconnect_mid_round_is_backfilled() {
        let (manager, mut rx) = color_change_manager();
        manager.register(1, "alice").await;
        manager.register(2, "bob").await;
        manager.start_next_round().await;
        next_event(&mut rx).await;

        assert!(manager.disconnect(2).await);
        manager.process_click(1, &ClickPayload::default()).await;

        // Bob's slot stays open, so the round keeps running
        assert!(manager.is_round_in_progress().await);

        {
            let mut session = manager.session.write().await;
            manager.end_round_locked(&mut session, 1);
        }

        match next_event(&mut rx).await {
            GameEvent::RoundEnd {
                results,
                leaderboard,
            } => {
                assert_eq!(results.get(2).unwrap().status, ClickStatus::NoClick);
                assert_eq!(leaderboard.len(), 1);
                assert_eq!(leaderboard[0].username, "alice");
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(manager.player_count().await, 1);
    }

    #[tokio::test]
    async fn test_late_joiner_waits_for_next_round() {
        let (manager, mut rx) = color_change_manager();
        manager.register(1, "alice").await;
        manager.start_next_round().await;
        next_event(&mut rx).await;

        manager.register(2, "carol").await;
        let result = manager.process_click(2, &ClickPayload::default()).await;

        assert_eq!(result.status, ClickStatus::NotInRound);
        assert!(manager.is_round_in_progress().await);

        manager.process_click(1, &ClickPayload::default()).await;

        match next_event(&mut rx).await {
            GameEvent::RoundEnd {
                results,
                leaderboard,
            } => {
                assert_eq!(results.entries.len(), 1);
                assert!(results.get(2).is_none());
                assert_eq!(leaderboard.len(), 1);
                assert_eq!(leaderboard[0].username, "alice");
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_click_after_stimulus_is_scored() {
        let (manager, mut rx) = GameManager::new(vec![RoundKind::ClickBox]);
        manager.register(1, "alice").await;
        manager.start_next_round().await;
        next_event(&mut rx).await;

        sleep(Duration::from_millis(3300)).await;

        {
            let session = manager.session.read().await;
            let round = &session.current_round.as_ref().unwrap().round;
            let lead = round.active_time().unwrap() - round.start_time().unwrap();
            assert!((2.95..3.5).contains(&lead), "box appeared after {}s", lead);
        }

        let result = manager.process_click(1, &ClickPayload::default()).await;
        assert!(result.success(), "{:?}", result);
        let reaction_time = result.reaction_time.unwrap();
        assert!(reaction_time > 0.0 && reaction_time < 1.0);

        match next_event(&mut rx).await {
            GameEvent::RoundEnd {
                results,
                leaderboard,
            } => {
                assert_eq!(results.get(1).unwrap().status, ClickStatus::Success);
                assert_eq!(leaderboard[0].rounds_played, 1);
                assert_approx_eq!(leaderboard[0].avg_time, reaction_time, 1e-9);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_round_without_clicks_ends_at_max_duration() {
        let (manager, mut rx) = GameManager::new(vec![RoundKind::ClickBox]);
        manager.register(1, "alice").await;
        manager.start_next_round().await;
        next_event(&mut rx).await;
        let started = Instant::now();

        let event = timeout(Duration::from_secs(12), rx.recv())
            .await
            .expect("round never ended")
            .expect("event channel closed");
        let elapsed = started.elapsed();

        assert!(
            elapsed >= Duration::from_millis(9900) && elapsed < Duration::from_millis(11500),
            "round ended after {:?}",
            elapsed
        );
        match event {
            GameEvent::RoundEnd {
                results,
                leaderboard,
            } => {
                assert_eq!(results.get(1).unwrap().status, ClickStatus::NoClick);
                assert_eq!(leaderboard[0].avg_time, PENALTY_TIME);
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        assert!(!manager.is_round_in_progress().await);
        sleep(Duration::from_millis(50)).await;
        assert!(!manager.round_timeline_running().await);
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let (manager, _rx) = color_change_manager();

        let status = manager.status().await;
        assert_eq!(status.status, "online");
        assert_eq!(status.active_players, 0);
        assert_eq!(status.current_round, CurrentRound::Waiting);

        manager.register(1, "alice").await;
        manager.start_next_round().await;
        assert_eq!(
            manager.status().await.current_round,
            CurrentRound::Round {
                round_type: RoundType::ColorChange,
                in_progress: true
            }
        );

        {
            let mut session = manager.session.write().await;
            manager.end_round_locked(&mut session, 1);
        }
        let status = manager.status().await;
        assert_eq!(status.active_players, 1);
        assert_eq!(
            status.current_round,
            CurrentRound::Round {
                round_type: RoundType::ColorChange,
                in_progress: false
            }
        );
    }
}
