//! ntuple-2048: a 2048 engine, a symmetric n-tuple value network and an
//! afterstate TD(0) learner
//!
//! This crate provides:
//! - A `Board` for 3x3, 4x4 and 5x5 games (`shift`, `with_random_tile`, `can_move`, ...)
//! - Tuple patterns and the dihedral symmetry group (`patterns` module)
//! - A lookup-table value network with binary and JSON weight files (`network` module)
//! - TD(0) training and policy evaluation (`learning` module)
//! - Greedy and expectimax move selection (`policy` module)
//! - A binary game-record format for replaying games (`trace` module)
//!
//! Quick start:
//! ```
//! use ntuple_2048::engine::{Board, BoardSize, Move};
//! use ntuple_2048::learning::{TdLearner, DEFAULT_ALPHA};
//! use ntuple_2048::network::NTupleNetwork;
//! use ntuple_2048::policy::{Greedy, MovePolicy};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let b0 = Board::new(BoardSize::Four, &mut rng);
//! let step = b0.shift(Move::Left);
//! assert!(!step.moved || step.board != b0);
//!
//! let mut learner = TdLearner::new(NTupleNetwork::light(BoardSize::Four), DEFAULT_ALPHA);
//! for _ in 0..3 {
//!     learner.train_episode(&mut rng);
//! }
//! let mut greedy = Greedy::new(learner.network());
//! assert!(greedy.select_move(&b0).is_some());
//! ```
//!
//! Randomness is always injected: pass a seeded `StdRng` for reproducible
//! games, searches and training runs.

pub mod config;
pub mod engine;
pub mod learning;
pub mod network;
pub mod patterns;
pub mod policy;
pub mod trace;
