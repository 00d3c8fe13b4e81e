//! Double trouble round: hit the green box and avoid the red one

use super::{invalid_click, ClockSync, Round, RoundCore, Timeline};
use crate::players::RosterEntry;
use crate::utils::random_position;
use rand::Rng;
use shared::{
    ClickPayload, ClickPosition, ClickResult, ClickStatus, PlayerId, Point, RoundData,
    RoundResults, RoundType,
};

const DELAY: f64 = 3.0;
const MAX_DURATION: f64 = 10.0;
const SUCCESS_WINDOW: f64 = 7.0;
/// Minimum distance between the two boxes in normalized space
const MIN_SEPARATION: f64 = 0.2;
const GOOD_COLOR: &str = "#4CAF50";
const BAD_COLOR: &str = "#FF5252";

/// A green and a red box appear together; only the green one counts
#[derive(Debug, Clone)]
pub struct DoubleTroubleRound {
    core: RoundCore,
    good_position: Point,
    bad_position: Point,
}

impl DoubleTroubleRound {
    pub fn new<R: Rng + ?Sized>(roster: Vec<RosterEntry>, rng: &mut R) -> Self {
        let good_position = random_position(rng);
        let bad_position = loop {
            let candidate = random_position(rng);
            if candidate.distance(&good_position) > MIN_SEPARATION {
                break candidate;
            }
        };

        Self::with_positions(roster, good_position, bad_position)
    }

    pub fn with_positions(roster: Vec<RosterEntry>, good_position: Point, bad_position: Point) -> Self {
        Self {
            core: RoundCore::new(roster),
            good_position,
            bad_position,
        }
    }

    pub fn good_position(&self) -> Point {
        self.good_position
    }

    pub fn bad_position(&self) -> Point {
        self.bad_position
    }

    fn judge(&self, active: f64, click_time: f64, position: Point) -> ClickResult {
        let reaction_time = click_time - active;
        if reaction_time < 0.0 {
            return ClickResult::penalty(
                ClickStatus::TooEarly,
                "Too early! The boxes hadn't appeared yet.",
            );
        }
        if reaction_time > SUCCESS_WINDOW {
            return ClickResult::penalty(
                ClickStatus::TooLate,
                format!("Too slow! You took {:.3} seconds.", reaction_time),
            );
        }

        if position.distance(&self.good_position) < position.distance(&self.bad_position) {
            ClickResult::new(
                ClickStatus::Success,
                format!(
                    "Nice! You clicked the correct box in {:.3} seconds.",
                    reaction_time
                ),
            )
            .with_reaction_time(reaction_time)
        } else {
            ClickResult::penalty(ClickStatus::WrongTarget, "Oops! You clicked the wrong box!")
        }
    }
}

impl Round for DoubleTroubleRound {
    fn round_type(&self) -> RoundType {
        RoundType::DoubleTrouble
    }

    fn client_data(&self) -> RoundData {
        RoundData::DoubleTrouble {
            instructions: "Two colored boxes will appear. Click the GREEN box as fast as you can, avoid the RED box!".to_string(),
            max_duration: MAX_DURATION,
            delay: DELAY,
            good_position: self.good_position,
            bad_position: self.bad_position,
            good_color: GOOD_COLOR.to_string(),
            bad_color: BAD_COLOR.to_string(),
        }
    }

    fn timeline(&self) -> Timeline {
        Timeline::from_secs(DELAY, MAX_DURATION)
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
        let click_time = ClockSync::new(payload, server_now).server_now;

        let Some(active) = self.core.active_time else {
            let result = ClickResult::penalty(
                ClickStatus::TooEarly,
                "Too early! The boxes haven't appeared yet.",
            );
            self.core.record(player_id, result.clone());
            return result;
        };

        // Malformed clicks are answered but leave the round untouched
        let position = match payload.position {
            Some(ClickPosition::Point(point)) => point,
            _ => return invalid_click("Invalid click detected."),
        };

        let result = self.judge(active, click_time, position);
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
            round_type: RoundType::DoubleTrouble,
            entries: self.core.backfill(|| {
                ClickResult::penalty(
                    ClickStatus::NoClick,
                    "You didn't click any box during this round.",
                )
            }),
            winning_move: None,
        }
    }
}
