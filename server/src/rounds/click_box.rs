//! Click box round: hit a box that pops up at a random spot

use super::{ClockSync, Round, RoundCore, Timeline};
use crate::players::RosterEntry;
use crate::utils::random_position;
use rand::Rng;
use shared::{
    ClickPayload, ClickResult, ClickStatus, PlayerId, Point, RoundData, RoundResults, RoundType,
};

const DELAY: f64 = 3.0;
const MAX_DURATION: f64 = 10.0;
const SUCCESS_WINDOW: f64 = 7.0;

/// A small box appears at a random spot after a fixed delay
#[derive(Debug, Clone)]
pub struct ClickBoxRound {
    core: RoundCore,
    position: Point,
}

impl ClickBoxRound {
    pub fn new<R: Rng + ?Sized>(roster: Vec<RosterEntry>, rng: &mut R) -> Self {
        Self {
            core: RoundCore::new(roster),
            position: random_position(rng),
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }
}

impl Round for ClickBoxRound {
    fn round_type(&self) -> RoundType {
        RoundType::ClickBox
    }

    fn client_data(&self) -> RoundData {
        RoundData::ClickBox {
            instructions:
                "A small box will appear after 3 seconds. Click it as fast as you can!".to_string(),
            max_duration: MAX_DURATION,
            delay: DELAY,
            position: self.position,
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

        let result = match self.core.active_time {
            None => ClickResult::penalty(
                ClickStatus::TooEarly,
                "Too early! The box hasn't appeared yet.",
            ),
            Some(active) => {
                let reaction_time = click_time - active;
                if reaction_time < 0.0 {
                    ClickResult::penalty(
                        ClickStatus::TooEarly,
                        "Too early! The box hadn't appeared yet.",
                    )
                } else if reaction_time <= SUCCESS_WINDOW {
                    ClickResult::new(
                        ClickStatus::Success,
                        format!("Nice! You clicked in {:.3} seconds.", reaction_time),
                    )
                    .with_reaction_time(reaction_time)
                } else {
                    ClickResult::penalty(
                        ClickStatus::TooLate,
                        format!("Too slow! You took {:.3} seconds.", reaction_time),
                    )
                }
            }
        };

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
            round_type: RoundType::ClickBox,
            entries: self.core.backfill(|| {
                ClickResult::penalty(
                    ClickStatus::NoClick,
                    "You didn't click the box during this round.",
                )
            }),
            winning_move: None,
        }
    }
}
