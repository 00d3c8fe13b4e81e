//! Brightness round: stop the ramp at the target level

use super::{ClockSync, Round, RoundCore, Timeline};
use crate::players::RosterEntry;
use rand::Rng;
use shared::{
    ClickPayload, ClickResult, ClickStatus, PlayerId, RoundData, RoundResults, RoundType,
    PENALTY_TIME,
};

const INITIAL_PAUSE: f64 = 2.0;
const BRIGHTNESS_DURATION: f64 = 5.0;
const MAX_DURATION: f64 = 10.0;
const MAX_ERROR: f64 = 100.0;
const PERFECT_ERROR: f64 = 5.0;
const GOOD_ERROR: f64 = 15.0;

/// Brightness ramps from 0% to 100%; click when it matches the target
#[derive(Debug, Clone)]
pub struct BrightnessRound {
    core: RoundCore,
    target_brightness: u8,
}

impl BrightnessRound {
    pub fn new<R: Rng + ?Sized>(roster: Vec<RosterEntry>, rng: &mut R) -> Self {
        Self::with_target(roster, rng.gen_range(30..=80))
    }

    pub fn with_target(roster: Vec<RosterEntry>, target_brightness: u8) -> Self {
        Self {
            core: RoundCore::new(roster),
            target_brightness,
        }
    }

    pub fn target_brightness(&self) -> u8 {
        self.target_brightness
    }

    /// Brightness percentage `elapsed` seconds into the ramp
    pub fn brightness_at(elapsed: f64) -> f64 {
        elapsed / BRIGHTNESS_DURATION * 100.0
    }

    /// Scores a click `elapsed` seconds into the ramp
    pub fn score(&self, elapsed: f64) -> ClickResult {
        if elapsed > BRIGHTNESS_DURATION {
            return ClickResult::penalty(
                ClickStatus::TooLate,
                "Too late! The brightness change has completed.",
            )
            .with_brightness_error(MAX_ERROR);
        }

        let error = (Self::brightness_at(elapsed) - self.target_brightness as f64).abs();
        if error >= MAX_ERROR {
            return ClickResult::penalty(
                ClickStatus::OffTarget,
                format!("Off target! You were {:.1}% off.", error),
            )
            .with_brightness_error(MAX_ERROR);
        }

        let reaction_time = elapsed * (1.0 + error / 100.0);
        let (status, message) = if error < PERFECT_ERROR {
            (
                ClickStatus::Success,
                format!("Perfect! You were only {:.1}% off the target.", error),
            )
        } else if error < GOOD_ERROR {
            (
                ClickStatus::Success,
                format!("Good! You were {:.1}% off the target.", error),
            )
        } else {
            (
                ClickStatus::OffTarget,
                format!("Off target! You were {:.1}% off.", error),
            )
        };

        ClickResult::new(status, message)
            .with_reaction_time(reaction_time)
            .with_brightness_error(error)
    }
}

impl Round for BrightnessRound {
    fn round_type(&self) -> RoundType {
        RoundType::Brightness
    }

    fn client_data(&self) -> RoundData {
        RoundData::Brightness {
            instructions: format!(
                "Click when the brightness matches the target of {}%",
                self.target_brightness
            ),
            target_brightness: self.target_brightness,
            initial_pause: INITIAL_PAUSE,
            brightness_duration: BRIGHTNESS_DURATION,
            max_duration: MAX_DURATION,
        }
    }

    fn timeline(&self) -> Timeline {
        Timeline::from_secs(INITIAL_PAUSE, MAX_DURATION)
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
        let click_time = ClockSync::new(payload, server_now).adjusted_click();

        let result = match self.core.active_time {
            Some(active) if click_time >= active => self.score(click_time - active),
            _ => ClickResult::penalty(
                ClickStatus::TooEarly,
                "Too early! The brightness hasn't started changing yet.",
            )
            .with_brightness_error(MAX_ERROR),
        };

        self.core.record(player_id, result.clone());
        result
    }

    fn should_end(&self, now: f64) -> bool {
        self.core.past_max_duration(now, MAX_DURATION)
            || self.core.past_window(now, BRIGHTNESS_DURATION)
            || self.core.all_clicked()
    }

    fn results(&self) -> RoundResults {
        RoundResults {
            round_type: RoundType::Brightness,
            entries: self.core.backfill(|| {
                ClickResult::new(ClickStatus::NoClick, "You didn't click during this round.")
                    .with_reaction_time(PENALTY_TIME)
                    .with_brightness_error(MAX_ERROR)
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

    fn live_round(target: u8) -> BrightnessRound {
        let mut round = BrightnessRound::with_target(roster(&[1, 2]), target);
        round.begin(100.0);
        round.activate(102.0);
        round
    }

    /// Seconds into the ramp at which brightness reads `percent`
    fn at_percent(percent: f64) -> f64 {
        percent / 100.0 * BRIGHTNESS_DURATION
    }

    #[test]
    fn test_target_within_bounds() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let round = BrightnessRound::new(roster(&[1]), &mut rng);
            assert!((30..=80).contains(&round.target_brightness()));
        }
    }

    #[test]
    fn test_brightness_interpolation() {
        assert_approx_eq!(BrightnessRound::brightness_at(0.0), 0.0, 1e-9);
        assert_approx_eq!(BrightnessRound::brightness_at(2.5), 50.0, 1e-9);
        assert_approx_eq!(BrightnessRound::brightness_at(5.0), 100.0, 1e-9);
    }

    #[test]
    fn test_perfect_tier() {
        let round = live_round(50);
        let elapsed = at_percent(54.9);

        let result = round.score(elapsed);

        assert!(result.success());
        assert!(result.message.starts_with("Perfect!"));
        assert_approx_eq!(result.brightness_error.unwrap(), 4.9, 1e-9);
        assert_approx_eq!(result.reaction_time.unwrap(), elapsed * 1.049, 1e-9);
    }

    #[test]
    fn test_good_tier() {
        let round = live_round(50);

        let result = round.score(at_percent(35.1));

        assert!(result.success());
        assert!(result.message.starts_with("Good!"));
        assert_approx_eq!(result.brightness_error.unwrap(), 14.9, 1e-9);
    }

    #[test]
    fn test_off_target_tier() {
        let round = live_round(50);
        let elapsed = at_percent(70.0);

        let result = round.score(elapsed);

        assert_eq!(result.status, ClickStatus::OffTarget);
        assert!(result.message.starts_with("Off target!"));
        assert_approx_eq!(result.brightness_error.unwrap(), 20.0, 1e-9);
        assert_approx_eq!(result.reaction_time.unwrap(), elapsed * 1.2, 1e-9);
    }

    #[test]
    fn test_early_click_is_penalized() {
        let mut round = BrightnessRound::with_target(roster(&[1]), 40);
        round.begin(100.0);

        let result = round.process_click(1, &click_at(101.0), 101.0);
        assert_eq!(result.status, ClickStatus::TooEarly);
        assert_eq!(result.reaction_time, Some(PENALTY_TIME));
        assert_eq!(result.brightness_error, Some(MAX_ERROR));
    }

    #[test]
    fn test_late_click_is_penalized() {
        let mut round = live_round(40);

        let result = round.process_click(1, &click_at(107.5), 107.5);

        assert_eq!(result.status, ClickStatus::TooLate);
        assert_eq!(result.reaction_time, Some(PENALTY_TIME));
        assert_eq!(result.brightness_error, Some(MAX_ERROR));
    }

    #[test]
    fn test_skew_correction_applies() {
        let mut round = live_round(50);

        // Client clock runs 500s behind; it clicked 0.5s before it sent
        let payload = ClickPayload::at(-395.0, -394.5);
        let result = round.process_click(1, &payload, 105.0);

        // Adjusted click lands at 104.5, 2.5s into the ramp: 50%
        assert!(result.success());
        assert_approx_eq!(result.brightness_error.unwrap(), 0.0, 1e-6);
        assert_approx_eq!(result.reaction_time.unwrap(), 2.5, 1e-6);
    }

    #[test]
    fn test_skewed_click_before_ramp_is_early() {
        let mut round = live_round(50);

        let payload = ClickPayload::at(10.0, 11.0);
        let result = round.process_click(1, &payload, 102.5);

        assert_eq!(result.status, ClickStatus::TooEarly);
    }

    #[test]
    fn test_should_end_after_ramp() {
        let round = live_round(50);
        assert!(!round.should_end(106.9));
        assert!(round.should_end(107.1));
    }

    #[test]
    fn test_results_backfill() {
        let mut round = live_round(50);
        round.process_click(1, &click_at(104.5), 104.5);

        let results = round.results();
        let missing = results.get(2).unwrap();

        assert_eq!(missing.status, ClickStatus::NoClick);
        assert_eq!(missing.reaction_time, Some(PENALTY_TIME));
        assert_eq!(missing.brightness_error, Some(MAX_ERROR));
    }
}
