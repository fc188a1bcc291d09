//! Move selection over an n-tuple network.
//!
//! Two policies share the [`MovePolicy`] surface:
//! - [`Greedy`]: one ply, `reward + V(afterstate)`; the same rule the learner acts with.
//! - [`Expectimax`]: alternating decision and chance nodes to a fixed depth,
//!   sampling spawn cells when a board has many empties.
//!
//! Both break ties by the first direction in [`Move::ALL`] order and return
//! `None` when no move changes the board.
//!
//! Quick start
//! ```
//! use ntuple_2048::engine::{Board, BoardSize};
//! use ntuple_2048::network::NTupleNetwork;
//! use ntuple_2048::policy::{Expectimax, ExpectimaxConfig, Greedy, MovePolicy};
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let net = NTupleNetwork::light(BoardSize::Four);
//! let mut rng = StdRng::seed_from_u64(42);
//! let b = Board::new(BoardSize::Four, &mut rng);
//!
//! let mut greedy = Greedy::new(&net);
//! assert!(greedy.select_move(&b).is_some());
//!
//! let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, ..Default::default() }, 7);
//! assert!(ex.select_move(&b).is_some());
//! ```

use crate::engine::{Board, Move};

pub mod expectimax;
pub mod greedy;

pub use expectimax::{Expectimax, ExpectimaxConfig, SearchStats, DEFAULT_SAMPLE_CAP};
pub use greedy::{action_values, best_afterstate, Candidate, Greedy};

/// Anything that can pick a direction for a board.
pub trait MovePolicy {
    /// Chosen direction, or `None` if no move changes the board.
    fn select_move(&mut self, board: &Board) -> Option<Move>;

    /// Short label for logs and game records.
    fn name(&self) -> String;
}

impl<P: MovePolicy + ?Sized> MovePolicy for &mut P {
    fn select_move(&mut self, board: &Board) -> Option<Move> { (**self).select_move(board) }

    fn name(&self) -> String { (**self).name() }
}

impl<P: MovePolicy + ?Sized> MovePolicy for Box<P> {
    fn select_move(&mut self, board: &Board) -> Option<Move> { (**self).select_move(board) }

    fn name(&self) -> String { (**self).name() }
}

/// Value of one root direction as seen by a policy.
///
/// `value` is `None` when the move does not change the board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchEval {
    pub dir: Move,
    pub value: Option<f32>,
}

/// Index of the best legal branch, first wins on ties.
pub(crate) fn argmax(values: &[Option<f32>; 4]) -> Option<Move> {
    let mut best: Option<(Move, f32)> = None;
    for (dir, value) in Move::ALL.iter().zip(values) {
        if let Some(v) = *value {
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((*dir, v));
            }
        }
    }
    best.map(|(dir, _)| dir)
}
