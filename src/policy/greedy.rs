use tracing::warn;

use crate::engine::{Board, Move, Score};
use crate::network::{NTupleNetwork, NetworkError};

use super::{BranchEval, MovePolicy};

/// A legal move together with its afterstate and one-ply value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub dir: Move,
    pub afterstate: Board,
    pub reward: Score,
    /// `reward + V(afterstate)`.
    pub value: f32,
}

/// Legal move maximising `reward + V(afterstate)`; first in [`Move::ALL`] order wins ties.
pub fn best_afterstate(network: &NTupleNetwork, board: &Board) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for dir in Move::ALL {
        let shifted = board.shift(dir);
        if !shifted.moved {
            continue;
        }
        let value = shifted.reward as f32 + network.evaluate(&shifted.board);
        if best.map_or(true, |b| value > b.value) {
            best = Some(Candidate { dir, afterstate: shifted.board, reward: shifted.reward, value });
        }
    }
    best
}

/// `reward + V(afterstate)` per direction in [`Move::ALL`] order; `None` for no-op moves.
pub fn action_values(network: &NTupleNetwork, board: &Board) -> [Option<f32>; 4] {
    Move::ALL.map(|dir| {
        let shifted = board.shift(dir);
        shifted.moved.then(|| shifted.reward as f32 + network.evaluate(&shifted.board))
    })
}

/// One-ply policy over a borrowed network.
#[derive(Debug, Clone, Copy)]
pub struct Greedy<'n> {
    network: &'n NTupleNetwork,
}

impl<'n> Greedy<'n> {
    pub fn new(network: &'n NTupleNetwork) -> Self { Self { network } }

    /// Like [`MovePolicy::select_move`], but a board of another size is an error.
    pub fn try_select_move(&self, board: &Board) -> Result<Option<Move>, NetworkError> {
        self.network.check_board(board)?;
        Ok(best_afterstate(self.network, board).map(|c| c.dir))
    }

    /// Per-direction values at the root.
    pub fn branch_evals(&self, board: &Board) -> [BranchEval; 4] {
        let values = action_values(self.network, board);
        let mut out = [BranchEval { dir: Move::Up, value: None }; 4];
        for (slot, (dir, value)) in out.iter_mut().zip(Move::ALL.into_iter().zip(values)) {
            *slot = BranchEval { dir, value };
        }
        out
    }
}

impl MovePolicy for Greedy<'_> {
    fn select_move(&mut self, board: &Board) -> Option<Move> {
        self.try_select_move(board).unwrap_or_else(|err| {
            warn!(%err, "greedy: rejecting board");
            None
        })
    }

    fn name(&self) -> String { "greedy".to_string() }
}
