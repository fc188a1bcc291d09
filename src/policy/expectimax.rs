//! Depth-limited expectimax over the learned value function.
//!
//! Decision nodes maximise `reward + chance(afterstate)`; chance nodes average
//! over spawn outcomes (code 1 with weight 0.9, code 2 with weight 0.1). When
//! a board has more empty cells than `sample_cap`, the chance node draws that
//! many cells uniformly without replacement and averages over the sample
//! only. Leaves are scored by the network.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::engine::{Board, Move};
use crate::network::{NTupleNetwork, NetworkError};

use super::{argmax, BranchEval, MovePolicy};

/// Spawn cells examined per chance node before sampling kicks in.
pub const DEFAULT_SAMPLE_CAP: usize = 8;

const SPAWN_TWO: f32 = 0.9;
const SPAWN_FOUR: f32 = 0.1;

/// Search knobs.
///
/// `depth` counts plies including the root move: depth 0 and 1 both score
/// afterstates directly and so agree with the greedy policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectimaxConfig {
    pub depth: u32,
    pub sample_cap: usize,
}

impl Default for ExpectimaxConfig {
    fn default() -> Self { Self { depth: 2, sample_cap: DEFAULT_SAMPLE_CAP } }
}

/// Node counts for the last root search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,
    pub peak_nodes: u64,
}

pub struct Expectimax<'n, R: Rng> {
    network: &'n NTupleNetwork,
    cfg: ExpectimaxConfig,
    rng: R,
    stats: SearchStats,
}

impl<'n> Expectimax<'n, StdRng> {
    /// Search with a `StdRng` seeded from `seed`, for reproducible sampling.
    pub fn seeded(network: &'n NTupleNetwork, cfg: ExpectimaxConfig, seed: u64) -> Self {
        Self::new(network, cfg, StdRng::seed_from_u64(seed))
    }
}

impl<'n, R: Rng> Expectimax<'n, R> {
    pub fn new(network: &'n NTupleNetwork, cfg: ExpectimaxConfig, rng: R) -> Self {
        Self { network, cfg, rng, stats: SearchStats::default() }
    }

    #[inline]
    pub fn config(&self) -> ExpectimaxConfig { self.cfg }

    /// Expected value of each root direction; `None` for no-op moves.
    ///
    /// Example
    /// ```
    /// use ntuple_2048::engine::{Board, BoardSize, Move};
    /// use ntuple_2048::network::NTupleNetwork;
    /// use ntuple_2048::policy::{Expectimax, ExpectimaxConfig};
    ///
    /// let net = NTupleNetwork::light(BoardSize::Four);
    /// let b = Board::from_values(BoardSize::Four, &[2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    /// let mut ex = Expectimax::seeded(&net, ExpectimaxConfig::default(), 1);
    /// let evals = ex.branch_evals(&b);
    /// assert_eq!(evals[Move::Up.index()].value, None);
    /// assert!(evals[Move::Left.index()].value.unwrap() >= 4.0);
    /// ```
    pub fn branch_evals(&mut self, board: &Board) -> [BranchEval; 4] {
        let values = self.branch_values(board);
        let mut out = [BranchEval { dir: Move::Up, value: None }; 4];
        for (slot, (dir, value)) in out.iter_mut().zip(Move::ALL.into_iter().zip(values)) {
            *slot = BranchEval { dir, value };
        }
        out
    }

    /// Root values in [`Move::ALL`] order.
    pub fn branch_values(&mut self, board: &Board) -> [Option<f32>; 4] {
        let mut nodes = 0u64;
        let depth = self.cfg.depth as i32;
        let values = Move::ALL.map(|dir| {
            let shifted = board.shift(dir);
            if !shifted.moved {
                return None;
            }
            nodes += 1;
            Some(shifted.reward as f32 + self.chance(&shifted.board, depth - 1, &mut nodes))
        });
        self.stats.nodes = nodes;
        self.stats.peak_nodes = self.stats.peak_nodes.max(nodes);
        values
    }

    /// Statistics from the last call to [`Self::branch_values`],
    /// [`Self::branch_evals`] or [`MovePolicy::select_move`].
    #[inline]
    pub fn last_stats(&self) -> SearchStats { self.stats }

    #[inline]
    pub fn reset_stats(&mut self) { self.stats = SearchStats::default(); }

    /// Like [`MovePolicy::select_move`], but a board of another size is an error.
    pub fn try_select_move(&mut self, board: &Board) -> Result<Option<Move>, NetworkError> {
        self.network.check_board(board)?;
        let values = self.branch_values(board);
        Ok(argmax(&values))
    }

    fn decision(&mut self, board: &Board, depth: i32, nodes: &mut u64) -> f32 {
        *nodes += 1;
        let mut best: Option<f32> = None;
        for dir in Move::ALL {
            let shifted = board.shift(dir);
            if !shifted.moved {
                continue;
            }
            let value = shifted.reward as f32 + self.chance(&shifted.board, depth - 1, nodes);
            if best.map_or(true, |b| value > b) {
                best = Some(value);
            }
        }
        // Dead end: score as a leaf.
        best.unwrap_or_else(|| self.network.evaluate(board))
    }

    fn chance(&mut self, board: &Board, depth: i32, nodes: &mut u64) -> f32 {
        *nodes += 1;
        if depth <= 0 {
            return self.network.evaluate(board);
        }
        let mut cells: Vec<usize> = board.empty_cells().collect();
        if cells.is_empty() {
            return self.network.evaluate(board);
        }
        if cells.len() > self.cfg.sample_cap {
            cells = cells.choose_multiple(&mut self.rng, self.cfg.sample_cap).copied().collect();
        }
        let mut total = 0.0f32;
        for &cell in &cells {
            total += SPAWN_TWO * self.decision(&board.with_code(cell, 1), depth, nodes);
            total += SPAWN_FOUR * self.decision(&board.with_code(cell, 2), depth, nodes);
        }
        total / cells.len() as f32
    }
}

impl<R: Rng> MovePolicy for Expectimax<'_, R> {
    fn select_move(&mut self, board: &Board) -> Option<Move> {
        self.try_select_move(board).unwrap_or_else(|err| {
            warn!(%err, "expectimax: rejecting board");
            None
        })
    }

    fn name(&self) -> String { format!("expectimax-d{}", self.cfg.depth) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BoardSize;
    use crate::patterns::Pattern;
    use crate::policy::{action_values, Greedy};

    fn trained_net(seed: u64) -> NTupleNetwork {
        let mut net = NTupleNetwork::light(BoardSize::Four);
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..200 {
            let b = Board::new(BoardSize::Four, &mut rng);
            net.update(&b, rng.gen_range(-1.0..1.0));
        }
        net
    }

    #[test]
    fn shallow_search_matches_greedy() {
        let net = trained_net(3);
        let mut rng = StdRng::seed_from_u64(11);
        for depth in [0, 1] {
            let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth, ..Default::default() }, 5);
            for _ in 0..50 {
                let mut b = Board::new(BoardSize::Four, &mut rng);
                for _ in 0..4 {
                    b = b.with_random_tile(&mut rng).unwrap_or(b);
                }
                assert_eq!(ex.branch_values(&b), action_values(&net, &b));
                assert_eq!(ex.select_move(&b), Greedy::new(&net).select_move(&b));
            }
        }
    }

    #[test]
    fn stuck_board_has_no_move() {
        let net = NTupleNetwork::light(BoardSize::Four);
        let stuck = Board::from_values(BoardSize::Four, &[2, 4, 2, 4, 4, 2, 4, 2, 2, 4, 2, 4, 4, 2, 4, 2]).unwrap();
        let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 3, ..Default::default() }, 0);
        assert_eq!(ex.select_move(&stuck), None);
        assert_eq!(ex.last_stats().nodes, 0);
    }

    #[test]
    fn zero_network_depth_two_counts_reward() {
        let net = NTupleNetwork::light(BoardSize::Four);
        // Left and right merge the pair for 4.
        let b = Board::from_values(BoardSize::Four, &[2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, sample_cap: 16 }, 9);
        let values = ex.branch_values(&b);
        assert_eq!(values[Move::Up.index()], None);
        let right = values[Move::Right.index()].unwrap();
        assert!(right >= 4.0, "{right}");
        // Mirror images, so only float rounding separates them.
        let left = values[Move::Left.index()].unwrap();
        assert!((left - right).abs() < 1e-3);
    }

    #[test]
    fn stats_track_nodes_and_peak() {
        let net = NTupleNetwork::light(BoardSize::Four);
        let mut rng = StdRng::seed_from_u64(2);
        let b = Board::new(BoardSize::Four, &mut rng);
        let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, sample_cap: 2 }, 4);
        ex.select_move(&b);
        let first = ex.last_stats();
        assert!(first.nodes > 4);
        assert_eq!(first.peak_nodes, first.nodes);

        let mut shallow = Expectimax::seeded(&net, ExpectimaxConfig { depth: 1, ..Default::default() }, 4);
        shallow.select_move(&b);
        assert!(shallow.last_stats().nodes < first.nodes);

        ex.reset_stats();
        assert_eq!(ex.last_stats(), SearchStats::default());
        assert_eq!(ex.name(), "expectimax-d2");
    }

    /// 3x3 network over the corner cell only, where a 2 in a corner is worth 1.0
    /// and every other corner code is worth nothing.
    fn corner_net() -> NTupleNetwork {
        let corner = Pattern::new(BoardSize::Three, vec![0]).unwrap();
        let mut net = NTupleNetwork::with_patterns(BoardSize::Three, vec![corner]).unwrap();
        let twos = Board::from_codes(BoardSize::Three, &[1, 0, 1, 0, 0, 0, 1, 0, 1]).unwrap();
        // Four corner variants, each adding its share to the same entry.
        net.update(&twos, 0.25);
        let one = Board::from_codes(BoardSize::Three, &[1, 0, 0, 0, 9, 0, 5, 0, 7]).unwrap();
        assert_eq!(net.evaluate(&one), 1.0);
        net
    }

    #[test]
    fn depth_two_weights_spawns() {
        let net = corner_net();
        let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, sample_cap: 8 }, 1);

        // Only right and down are legal. Right leaves one empty corner; both
        // spawns there give a stuck board scored as a leaf: 0.9 * 1.0 + 0.1 * 0.0.
        // Down leaves one empty corner; both spawns then merge the 5s for 64
        // and keep the spawned tile in its corner: 0.9 * (64 + 1) + 0.1 * 64.
        let b = Board::from_codes(BoardSize::Three, &[5, 6, 5, 6, 5, 6, 7, 8, 0]).unwrap();
        let values = ex.branch_values(&b);
        assert_eq!(values[Move::Up.index()], None);
        assert_eq!(values[Move::Left.index()], None);
        let right = values[Move::Right.index()].unwrap();
        let down = values[Move::Down.index()].unwrap();
        assert!((right - 0.9).abs() < 1e-5, "{right}");
        assert!((down - 64.9).abs() < 1e-3, "{down}");
        assert_eq!(ex.select_move(&b), Some(Move::Down));
    }

    #[test]
    fn chance_node_averages_over_cells() {
        let net = corner_net();
        let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, sample_cap: 8 }, 1);

        // Right leaves cells 6 and 7 empty. For either cell, a spawned 2 can
        // always be slid into the bottom-left corner (worth 1.0) and a
        // spawned 4 is worth nothing: (0.9 + 0.9) / 2.
        let b = Board::from_codes(BoardSize::Three, &[5, 6, 5, 6, 5, 6, 7, 0, 0]).unwrap();
        let right = ex.branch_values(&b)[Move::Right.index()].unwrap();
        assert!((right - 0.9).abs() < 1e-5, "{right}");
    }

    #[test]
    fn chance_node_expands_sample_cap_cells() {
        let net = NTupleNetwork::light(BoardSize::Four);
        // A horizontal pair in a full top row and a vertical pair in the left
        // column keep all four moves legal whatever spawns, so every decision
        // child costs itself plus four leaf chance nodes.
        let b = Board::from_codes(BoardSize::Four, &[3, 3, 4, 5, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(b.count_empty(), 11);

        for cap in [1, 3, 8] {
            let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, sample_cap: cap }, 13);
            let mut nodes = 0;
            ex.chance(&b, 1, &mut nodes);
            assert_eq!(nodes, 1 + 2 * cap as u64 * 5, "cap {cap}");
        }

        let mut ex = Expectimax::seeded(&net, ExpectimaxConfig { depth: 2, sample_cap: 16 }, 13);
        let mut nodes = 0;
        ex.chance(&b, 1, &mut nodes);
        assert_eq!(nodes, 1 + 2 * 11 * 5);
    }

    #[test]
    fn foreign_board_size_is_rejected() {
        let net = NTupleNetwork::light(BoardSize::Four);
        let mut ex = Expectimax::seeded(&net, ExpectimaxConfig::default(), 3);
        let mut rng = StdRng::seed_from_u64(14);
        for size in [BoardSize::Three, BoardSize::Five] {
            let b = Board::new(size, &mut rng);
            assert_eq!(
                ex.try_select_move(&b),
                Err(NetworkError::BoardSize { expected: BoardSize::Four, found: size })
            );
            assert_eq!(ex.select_move(&b), None);
            assert_eq!(ex.last_stats().nodes, 0);
        }
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let net = trained_net(8);
        let mut rng = StdRng::seed_from_u64(21);
        let b = Board::new(BoardSize::Four, &mut rng);
        let cfg = ExpectimaxConfig { depth: 2, sample_cap: 3 };
        let a = Expectimax::seeded(&net, cfg, 77).branch_values(&b);
        let c = Expectimax::seeded(&net, cfg, 77).branch_values(&b);
        assert_eq!(a, c);
    }
}
