//! Afterstate TD(0) training and policy evaluation.
//!
//! The learner acts greedily on `reward + V(afterstate)` and updates the
//! previous afterstate toward `reward_prev + V(afterstate_next)`. The final
//! afterstate of an episode is pulled toward zero.
//!
//! Example
//! ```
//! use ntuple_2048::engine::BoardSize;
//! use ntuple_2048::learning::{TdLearner, DEFAULT_ALPHA};
//! use ntuple_2048::network::NTupleNetwork;
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut learner = TdLearner::new(NTupleNetwork::light(BoardSize::Four), DEFAULT_ALPHA);
//! let mut rng = StdRng::seed_from_u64(1);
//! let result = learner.train_episode(&mut rng);
//! assert!(result.moves > 0);
//! assert!(result.max_code >= 1);
//! ```

use std::collections::VecDeque;
use std::fmt;

use rand::Rng;

use crate::engine::{code_to_value, Board, BoardSize, Code, Move, Score};
use crate::network::NTupleNetwork;
use crate::policy::{best_afterstate, Greedy, MovePolicy};

/// Step size used when none is configured.
pub const DEFAULT_ALPHA: f32 = 0.0025;

/// Episodes kept by [`TrainingStats::default`].
pub const DEFAULT_STATS_WINDOW: usize = 1000;

/// Outcome of one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeResult {
    /// Sum of merge rewards.
    pub score: Score,
    pub max_code: Code,
    pub moves: u32,
    /// Board after the last spawn.
    pub board: Board,
}

impl EpisodeResult {
    #[inline]
    pub fn max_tile(&self) -> u32 { code_to_value(self.max_code) }
}

/// Owns a network and trains it with TD(0) on afterstates.
#[derive(Debug, Clone)]
pub struct TdLearner {
    network: NTupleNetwork,
    alpha: f32,
}

impl TdLearner {
    pub fn new(network: NTupleNetwork, alpha: f32) -> Self { Self { network, alpha } }

    #[inline]
    pub fn network(&self) -> &NTupleNetwork { &self.network }

    #[inline]
    pub fn network_mut(&mut self) -> &mut NTupleNetwork { &mut self.network }

    pub fn into_network(self) -> NTupleNetwork { self.network }

    #[inline]
    pub fn alpha(&self) -> f32 { self.alpha }

    pub fn set_alpha(&mut self, alpha: f32) { self.alpha = alpha; }

    #[inline]
    pub fn size(&self) -> BoardSize { self.network.size() }

    /// One bootstrapped step: moves `V(prev_after)` toward
    /// `prev_reward + V(next_after)` and returns the TD error.
    pub fn td_update(&mut self, prev_after: &Board, prev_reward: Score, next_after: &Board) -> f32 {
        let target = prev_reward as f32 + self.network.evaluate(next_after);
        let delta = target - self.network.evaluate(prev_after);
        self.network.update(prev_after, self.alpha * delta);
        delta
    }

    /// Pulls a final afterstate toward zero and returns the TD error.
    pub fn terminal_update(&mut self, after: &Board) -> f32 {
        let delta = -self.network.evaluate(after);
        self.network.update(after, self.alpha * delta);
        delta
    }

    /// Play one game from a fresh board, learning after every move.
    pub fn train_episode<R: Rng + ?Sized>(&mut self, rng: &mut R) -> EpisodeResult {
        let mut board = Board::new(self.size(), rng);
        let mut prev: Option<(Board, Score)> = None;
        let mut score: Score = 0;
        let mut moves = 0u32;

        while let Some(chosen) = best_afterstate(&self.network, &board) {
            if let Some((prev_after, prev_reward)) = prev {
                self.td_update(&prev_after, prev_reward, &chosen.afterstate);
            }
            prev = Some((chosen.afterstate, chosen.reward));
            score += chosen.reward;
            moves += 1;
            board = chosen.afterstate.with_random_tile(rng).unwrap_or(chosen.afterstate);
        }
        if let Some((last_after, _)) = prev {
            self.terminal_update(&last_after);
        }

        tracing::trace!(score, moves, max_tile = board.highest_tile(), "training episode done");
        EpisodeResult { score, max_code: board.max_code(), moves, board }
    }

    /// Same loop as [`Self::train_episode`] with learning disabled.
    pub fn play_episode<R: Rng + ?Sized>(&self, rng: &mut R) -> EpisodeResult {
        play_game(&mut Greedy::new(&self.network), self.size(), rng)
    }
}

/// Play one game to the end with `policy`.
pub fn play_game<P, R>(policy: &mut P, size: BoardSize, rng: &mut R) -> EpisodeResult
where
    P: MovePolicy + ?Sized,
    R: Rng + ?Sized,
{
    play_game_with(policy, size, rng, |_, _, _| {})
}

/// Play one game, calling `on_step(before, dir, after)` for every applied
/// move. `after` already contains the spawned tile.
///
/// The game also ends if the policy picks a move that does not change the board.
pub fn play_game_with<P, R, F>(policy: &mut P, size: BoardSize, rng: &mut R, mut on_step: F) -> EpisodeResult
where
    P: MovePolicy + ?Sized,
    R: Rng + ?Sized,
    F: FnMut(&Board, Move, &Board),
{
    let mut board = Board::new(size, rng);
    let mut score: Score = 0;
    let mut moves = 0u32;
    while let Some(dir) = policy.select_move(&board) {
        let shifted = board.shift(dir);
        if !shifted.moved {
            tracing::debug!(policy = %policy.name(), %dir, "policy chose a no-op move; ending game");
            break;
        }
        score += shifted.reward;
        moves += 1;
        let next = shifted.board.with_random_tile(rng).unwrap_or(shifted.board);
        on_step(&board, dir, &next);
        board = next;
    }
    EpisodeResult { score, max_code: board.max_code(), moves, board }
}

/// Aggregate over a batch of evaluation games.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalSummary {
    pub games: usize,
    pub mean_score: f64,
    pub median_score: f64,
    pub max_score: Score,
    /// `(milestone code, fraction of games whose max code reached it)`.
    pub reach_rates: Vec<(Code, f64)>,
}

impl EvalSummary {
    /// Summarise finished games. An empty batch yields zeros.
    pub fn from_results(results: &[EpisodeResult], milestones: &[Code]) -> Self {
        let games = results.len();
        let mut scores: Vec<Score> = results.iter().map(|r| r.score).collect();
        scores.sort_unstable();
        let total: Score = scores.iter().sum();
        let mean_score = if games == 0 { 0.0 } else { total as f64 / games as f64 };
        let median_score = match games {
            0 => 0.0,
            n if n % 2 == 1 => scores[n / 2] as f64,
            n => (scores[n / 2 - 1] as f64 + scores[n / 2] as f64) / 2.0,
        };
        let reach_rates = milestones
            .iter()
            .map(|&m| {
                let hits = results.iter().filter(|r| r.max_code >= m).count();
                let rate = if games == 0 { 0.0 } else { hits as f64 / games as f64 };
                (m, rate)
            })
            .collect();
        EvalSummary { games, mean_score, median_score, max_score: scores.last().copied().unwrap_or(0), reach_rates }
    }

    /// Reach rate for a milestone code, if it was tracked.
    pub fn reach_rate(&self, code: Code) -> Option<f64> {
        self.reach_rates.iter().find(|(m, _)| *m == code).map(|(_, r)| *r)
    }
}

impl fmt::Display for EvalSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "games={} mean={:.1} median={:.1} max={}",
            self.games, self.mean_score, self.median_score, self.max_score
        )?;
        for (code, rate) in &self.reach_rates {
            writeln!(f, "  reach {:>6}: {:6.2}%", code_to_value(*code), rate * 100.0)?;
        }
        Ok(())
    }
}

/// Play `games` games with `policy` and summarise them.
pub fn evaluate_policy<P, R>(policy: &mut P, size: BoardSize, games: usize, milestones: &[Code], rng: &mut R) -> EvalSummary
where
    P: MovePolicy + ?Sized,
    R: Rng + ?Sized,
{
    let results: Vec<EpisodeResult> = (0..games).map(|_| play_game(policy, size, rng)).collect();
    let summary = EvalSummary::from_results(&results, milestones);
    tracing::info!(
        policy = %policy.name(),
        games,
        mean = summary.mean_score,
        median = summary.median_score,
        max = summary.max_score,
        "evaluation finished"
    );
    summary
}

/// Rolling window of recent training episodes.
#[derive(Debug, Clone)]
pub struct TrainingStats {
    window: usize,
    scores: VecDeque<Score>,
    total: Score,
    episodes: u64,
    best_score: Score,
    max_code: Code,
}

impl Default for TrainingStats {
    fn default() -> Self { Self::new(DEFAULT_STATS_WINDOW) }
}

impl TrainingStats {
    /// `window` is clamped to at least one episode.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self { window, scores: VecDeque::with_capacity(window), total: 0, episodes: 0, best_score: 0, max_code: 0 }
    }

    pub fn record(&mut self, result: &EpisodeResult) {
        if self.scores.len() == self.window {
            if let Some(old) = self.scores.pop_front() {
                self.total -= old;
            }
        }
        self.scores.push_back(result.score);
        self.total += result.score;
        self.episodes += 1;
        self.best_score = self.best_score.max(result.score);
        self.max_code = self.max_code.max(result.max_code);
    }

    /// Mean score over the window; 0 before the first episode.
    pub fn mean_score(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.total as f64 / self.scores.len() as f64
    }

    #[inline]
    pub fn episodes(&self) -> u64 { self.episodes }

    #[inline]
    pub fn window_len(&self) -> usize { self.scores.len() }

    #[inline]
    pub fn best_score(&self) -> Score { self.best_score }

    /// Largest tile value seen in any recorded episode.
    #[inline]
    pub fn max_tile(&self) -> u32 { if self.episodes == 0 { 0 } else { code_to_value(self.max_code) } }
}
