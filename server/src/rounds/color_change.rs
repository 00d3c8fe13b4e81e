//! Color change round: react the moment the box turns green

use super::{ClockSync, Round, RoundCore, Timeline};
use crate::players::RosterEntry;
use rand::Rng;
use shared::{ClickPayload, ClickResult, ClickStatus, PlayerId, RoundData, RoundResults, RoundType};

const MIN_DELAY: f64 = 2.0;
const MAX_DELAY: f64 = 7.0;
const MAX_DURATION: f64 = 10.0;
const SUCCESS_WINDOW: f64 = 3.0;

/// A box flips color after a random delay; click as soon as it does
#[derive(Debug, Clone)]
pub struct ColorChangeRound {
    core: RoundCore,
    delay: f64,
}

impl ColorChangeRound {
    pub fn new<R: Rng + ?Sized>(roster: Vec<RosterEntry>, rng: &mut R) -> Self {
        Self::with_delay(roster, rng.gen_range(MIN_DELAY..MAX_DELAY))
    }

    pub fn with_delay(roster: Vec<RosterEntry>, delay: f64) -> Self {
        Self {
            core: RoundCore::new(roster),
            delay,
        }
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    fn judge(&self, click_time: f64) -> ClickResult {
        let Some(active) = self.core.active_time else {
            return ClickResult::penalty(
                ClickStatus::TooEarly,
                "Too early! The color hasn't changed yet.",
            );
        };

        let reaction_time = click_time - active;
        if reaction_time < 0.0 {
            ClickResult::penalty(
                ClickStatus::TooEarly,
                "Too early! The color hadn't changed yet.",
            )
        } else if reaction_time <= SUCCESS_WINDOW {
            ClickResult::new(
                ClickStatus::Success,
                format!("Nice! You reacted in {:.3} seconds.", reaction_time),
            )
            .with_reaction_time(reaction_time)
        } else {
            ClickResult::penalty(
                ClickStatus::TooLate,
                format!("Too slow! You took {:.3} seconds.", reaction_time),
            )
        }
    }
}

impl Round for ColorChangeRound {
    fn round_type(&self) -> RoundType {
        RoundType::ColorChange
    }

    fn client_data(&self) -> RoundData {
        RoundData::ColorChange {
            instructions: "Click when the box changes color! Don't click too early.".to_string(),
            max_duration: MAX_DURATION,
            delay: self.delay,
        }
    }

    fn timeline(&self) -> Timeline {
        Timeline::from_secs(self.delay, MAX_DURATION)
    }

    fn core(&self) -> &RoundCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RoundCore {
        &mut self.core
    }

    fn process_click(
        &mut self,
        player_id: PlayerId,
        payload: &ClickPayload,
        server_now: f64,
    ) -> ClickResult {
        // Judged on receipt; the client's clock readings are not trusted here
        let sync = ClockSync::new(payload, server_now);
        let result = self.judge(sync.server_now);
        self.core.record(player_id, result.clone());
        result
    }

    fn should_end(&self, now: f64) -> bool {
        self.core.past_max_duration(now, MAX_DURATION)
            || self.core.past_window(now, SUCCESS_WINDOW)
            || self.core.all_clicked()
    }

    fn results(&self) -> RoundResults {
        RoundResults {
            round_type: RoundType::ColorChange,
            entries: self.core.backfill(|| {
                ClickResult::penalty(ClickStatus::NoClick, "You didn't click during this round.")
            }),
            winning_move: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rounds::test_support::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::PENALTY_TIME;

    fn started_round(ids: &[PlayerId]) -> ColorChangeRound {
        let mut round = ColorChangeRound::with_delay(roster(ids), 4.0);
        round.begin(100.0);
        round
    }

    #[test]
    fn test_delay_within_bounds() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let round = ColorChangeRound::new(roster(&[1]), &mut rng);
            assert!(round.delay() >= MIN_DELAY && round.delay() < MAX_DELAY);
            assert_eq!(round.timeline().max_duration.as_secs_f64(), MAX_DURATION);
        }
    }

    #[test]
    fn test_click_before_flip_is_penalized() {
        let mut round = started_round(&[1]);

        let result = round.process_click(1, &click_at(101.0), 101.0);

        assert_eq!(result.status, ClickStatus::TooEarly);
        assert_eq!(result.reaction_time, Some(PENALTY_TIME));
    }

    #[test]
    fn test_click_exactly_at_flip_succeeds() {
        let mut round = started_round(&[1]);
        round.activate(104.0);

        let result = round.process_click(1, &click_at(104.0), 104.0);

        assert!(result.success());
        assert_eq!(result.reaction_time, Some(0.0));
    }

    #[test]
    fn test_click_at_window_edge_succeeds() {
        let mut round = started_round(&[1]);
        round.activate(104.0);

        let result = round.process_click(1, &click_at(107.0), 107.0);

        assert!(result.success());
        assert_approx_eq!(result.reaction_time.unwrap(), SUCCESS_WINDOW, 1e-9);
    }

    #[test]
    fn test_click_after_window_is_penalized() {
        let mut round = started_round(&[1]);
        round.activate(104.0);

        let late = 104.0 + SUCCESS_WINDOW + 1e-6;
        let result = round.process_click(1, &click_at(late), late);

        assert_eq!(result.status, ClickStatus::TooLate);
        assert_eq!(result.reaction_time, Some(PENALTY_TIME));
    }

    #[test]
    fn test_client_clock_is_ignored() {
        let mut round = started_round(&[1]);
        round.activate(104.0);

        // Client claims it clicked before the flip on a skewed clock
        let payload = ClickPayload::at(50.0, 51.0);
        let result = round.process_click(1, &payload, 104.5);

        assert!(result.success());
        assert_approx_eq!(result.reaction_time.unwrap(), 0.5, 1e-9);
    }

    #[test]
    fn test_later_click_overwrites() {
        let mut round = started_round(&[1, 2]);

        round.process_click(1, &click_at(101.0), 101.0);
        round.activate(104.0);
        round.process_click(1, &click_at(104.25), 104.25);

        let results = round.results();
        assert!(results.get(1).unwrap().success());
    }

    #[test]
    fn test_should_end_conditions() {
        let mut round = started_round(&[1, 2]);
        assert!(!round.should_end(101.0));

        round.process_click(1, &click_at(101.0), 101.0);
        assert!(!round.should_end(101.0));

        round.process_click(2, &click_at(101.5), 101.5);
        assert!(round.should_end(101.5));

        let mut round = started_round(&[1, 2]);
        round.activate(104.0);
        assert!(!round.should_end(107.0));
        assert!(round.should_end(107.1));

        let round = started_round(&[1, 2]);
        assert!(round.should_end(110.5));
    }

    #[test]
    fn test_results_backfill_non_clickers() {
        let mut round = started_round(&[1, 2]);
        round.activate(104.0);
        round.process_click(2, &click_at(104.3), 104.3);

        let results = round.results();

        assert_eq!(results.entries.len(), 2);
        let missing = results.get(1).unwrap();
        assert_eq!(missing.status, ClickStatus::NoClick);
        assert_eq!(missing.reaction_time, Some(PENALTY_TIME));
        assert!(results.get(2).unwrap().success());
    }
}
