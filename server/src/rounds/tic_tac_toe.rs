//! Tic-tac-toe round: spot the single move that wins for X
//!
//! Boards come from a fixed catalog of mid-game layouts. The catalog is not
//! trusted: every layout is checked by trying X in each empty cell, and only
//! layouts with exactly one winning cell are ever dealt.

use super::{invalid_click, ClockSync, Round, RoundCore, Timeline};
use crate::players::RosterEntry;
use crate::utils::round_to;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::OnceLock;
use shared::{
    Board, BoardCell, ClickPayload, ClickPosition, ClickResult, ClickStatus, Mark, PlayerId,
    RoundData, RoundResults, RoundType,
};

const DELAY: f64 = 3.0;
const MAX_DURATION: f64 = 10.0;
const SUCCESS_WINDOW: f64 = 7.0;
const MAX_SCORE: f64 = 100.0;
const MIN_SCORE: f64 = 50.0;

const X: Option<Mark> = Some(Mark::X);
const O: Option<Mark> = Some(Mark::O);
const E: Option<Mark> = None;

/// Candidate layouts; eligibility is decided by [`winning_cells`]
pub const BOARD_CATALOG: [Board; 11] = [
    // Rows
    [[X, X, E], [O, O, E], [E, E, E]],
    [[E, E, E], [X, X, E], [O, O, E]],
    [[E, O, E], [E, O, E], [X, X, E]],
    // Columns
    [[X, O, E], [X, O, E], [E, E, E]],
    [[E, X, O], [E, X, E], [E, E, O]],
    [[O, E, X], [E, E, X], [E, O, E]],
    // Diagonals
    [[X, E, O], [E, X, O], [E, E, E]],
    [[O, E, E], [O, X, E], [E, E, X]],
    // Mixed
    [[X, O, E], [E, X, O], [E, E, E]],
    [[O, X, E], [X, O, E], [E, E, E]],
    [[E, O, X], [E, X, O], [E, E, E]],
];

/// Winning move of `BOARD_CATALOG[0]`
const FIRST_LAYOUT_WIN: BoardCell = BoardCell { row: 0, col: 2 };

const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// Whether `mark` holds any row, column or diagonal
pub fn has_three_in_a_row(board: &Board, mark: Mark) -> bool {
    LINES
        .iter()
        .any(|line| line.iter().all(|&(r, c)| board[r][c] == Some(mark)))
}

/// Empty cells that complete three in a row when X is placed there
pub fn winning_cells(board: &Board) -> Vec<BoardCell> {
    let mut cells = Vec::new();
    for row in 0..3 {
        for col in 0..3 {
            if board[row][col].is_some() {
                continue;
            }
            let mut trial = *board;
            trial[row][col] = Some(Mark::X);
            if has_three_in_a_row(&trial, Mark::X) {
                cells.push(BoardCell {
                    row: row as u8,
                    col: col as u8,
                });
            }
        }
    }
    cells
}

/// The winning cell if the board has exactly one
pub fn unique_winning_move(board: &Board) -> Option<BoardCell> {
    match winning_cells(board).as_slice() {
        [cell] => Some(*cell),
        _ => None,
    }
}

/// Catalog layouts that have exactly one winning move for X
pub fn eligible_boards() -> &'static [(Board, BoardCell)] {
    static ELIGIBLE: OnceLock<Vec<(Board, BoardCell)>> = OnceLock::new();
    ELIGIBLE.get_or_init(|| {
        BOARD_CATALOG
            .iter()
            .filter_map(|board| unique_winning_move(board).map(|cell| (*board, cell)))
            .collect()
    })
}

/// Deals a random eligible board with its winning move
pub fn generate_board<R: Rng + ?Sized>(rng: &mut R) -> (Board, BoardCell) {
    eligible_boards()
        .choose(rng)
        .copied()
        .unwrap_or((BOARD_CATALOG[0], FIRST_LAYOUT_WIN))
}

/// Score for a correct move: 100 for instant, 50 at the end of the window
pub fn score_for(reaction_time: f64) -> u32 {
    let score = (MAX_SCORE - (reaction_time / SUCCESS_WINDOW) * 50.0).max(MIN_SCORE);
    score.round() as u32
}

#[derive(Debug, Clone)]
pub struct TicTacToeRound {
    core: RoundCore,
    board: Board,
    winning_move: BoardCell,
}

impl TicTacToeRound {
    pub fn new<R: Rng + ?Sized>(roster: Vec<RosterEntry>, rng: &mut R) -> Self {
        let (board, winning_move) = generate_board(rng);
        Self {
            core: RoundCore::new(roster),
            board,
            winning_move,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn winning_move(&self) -> BoardCell {
        self.winning_move
    }
}

impl Round for TicTacToeRound {
    fn round_type(&self) -> RoundType {
        RoundType::TicTacToe
    }

    fn client_data(&self) -> RoundData {
        RoundData::TicTacToe {
            instructions: "Find and click on the winning move for X as fast as you can!"
                .to_string(),
            max_duration: MAX_DURATION,
            delay: DELAY,
            board: self.board,
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
        let sync = ClockSync::new(payload, server_now);

        let cell = match payload.position {
            Some(ClickPosition::Cell(cell)) => cell,
            _ => return invalid_click("Missing position data"),
        };

        let Some(active) = self.core.active_time else {
            return ClickResult::new(ClickStatus::TooEarly, "Board not active yet");
        };

        // First answer sticks
        if let Some(existing) = self.core.results.get(&player_id) {
            let mut result = ClickResult::new(existing.status, "You already clicked");
            result.reaction_time = existing.reaction_time;
            return result;
        }

        if sync.server_now - active > SUCCESS_WINDOW {
            let result = ClickResult::new(ClickStatus::TooLate, "Too late!");
            self.core.record(player_id, result.clone());
            return result;
        }

        let reaction_time = sync.to_server(sync.client_now) - active;
        if cell == self.winning_move {
            self.core.record(
                player_id,
                ClickResult::new(ClickStatus::Success, "Correct move!")
                    .with_reaction_time(reaction_time)
                    .with_score(score_for(reaction_time)),
            );
            ClickResult::new(ClickStatus::Success, "Correct move!")
                .with_reaction_time(round_to(reaction_time, 3))
        } else {
            let result = ClickResult::new(ClickStatus::WrongTarget, "Incorrect move!");
            self.core.record(player_id, result.clone().with_score(0));
            result
        }
    }

    fn should_end(&self, now: f64) -> bool {
        if self.core.start_time.is_none() {
            return false;
        }
        self.core.all_clicked() || self.core.past_max_duration(now, MAX_DURATION)
    }

    fn results(&self) -> RoundResults {
        let entries = self
            .core
            .backfill(|| ClickResult::new(ClickStatus::NoClick, "No move made").with_score(0))
            .into_iter()
            .map(|mut entry| {
                if entry.result.score.is_none() {
                    entry.result.score = Some(0);
                }
                entry
            })
            .collect();

        RoundResults {
            round_type: RoundType::TicTacToe,
            entries,
            winning_move: Some(self.winning_move),
        }
    }
}
