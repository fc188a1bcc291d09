//! N-tuple value network with symmetry-shared lookup tables.
//!
//! The value of a board is the sum, over every base pattern and every
//! symmetry variant of it, of one entry of that pattern's lookup table (LUT).
//! Variants of the same pattern read and write the same LUT, so a single
//! update trains all eight orientations of a position at once.
//!
//! ```
//! use ntuple_2048::engine::{Board, BoardSize};
//! use ntuple_2048::network::NTupleNetwork;
//! use rand::{SeedableRng, rngs::StdRng};
//!
//! let mut net = NTupleNetwork::light(BoardSize::Four);
//! let mut rng = StdRng::seed_from_u64(3);
//! let b = Board::new(BoardSize::Four, &mut rng);
//! assert_eq!(net.evaluate(&b), 0.0);
//! net.update(&b, 0.5);
//! assert!(net.evaluate(&b) > 0.0);
//! ```

use std::fmt;

use crate::engine::{Board, BoardSize};
use crate::patterns::{self, Pattern, PatternError};

pub mod weights;

pub use weights::{WeightsError, FORMAT_VERSION};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),
    #[error("board is {found}, network expects {expected}")]
    BoardSize { expected: BoardSize, found: BoardSize },
}

/// One base pattern, its variants and the LUT they share.
#[derive(Debug, Clone)]
struct Tuple {
    pattern: Pattern,
    variants: Vec<Vec<usize>>,
    lut: Box<[f32]>,
}

/// Aggregate shape of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStats {
    pub patterns: usize,
    pub variants: usize,
    pub entries: usize,
    pub bytes: usize,
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "patterns: {}, variants: {}, entries: {}, memory: {:.1} MiB",
            self.patterns,
            self.variants,
            self.entries,
            self.bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

/// Weight-shared n-tuple network for one board size.
#[derive(Debug, Clone)]
pub struct NTupleNetwork {
    size: BoardSize,
    radix: usize,
    tuples: Vec<Tuple>,
}

impl NTupleNetwork {
    /// Full-strength network from the built-in catalog for `size`.
    pub fn new(size: BoardSize) -> Self { Self::build(size, patterns::catalog(size)) }

    /// Small network of 4-tuples; cheap to allocate.
    pub fn light(size: BoardSize) -> Self { Self::build(size, patterns::light_catalog(size)) }

    /// Network over caller-chosen patterns.
    pub fn with_patterns(size: BoardSize, patterns: Vec<Pattern>) -> Result<Self, NetworkError> {
        for p in &patterns {
            p.validate(size)?;
        }
        Ok(Self::build(size, patterns))
    }

    fn build(size: BoardSize, patterns: Vec<Pattern>) -> Self {
        let radix = size.code_radix();
        let tuples = patterns
            .into_iter()
            .map(|pattern| {
                let variants = pattern.variants(size);
                let lut = vec![0.0f32; lut_len(radix, pattern.len())].into_boxed_slice();
                Tuple { pattern, variants, lut }
            })
            .collect();
        NTupleNetwork { size, radix, tuples }
    }

    #[inline]
    pub fn size(&self) -> BoardSize { self.size }

    /// Distinct tile codes per cell a LUT index covers.
    #[inline]
    pub fn radix(&self) -> usize { self.radix }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> + '_ { self.tuples.iter().map(|t| &t.pattern) }

    /// Variant lists, one per base pattern.
    pub fn variants(&self) -> impl Iterator<Item = &[Vec<usize>]> + '_ {
        self.tuples.iter().map(|t| t.variants.as_slice())
    }

    /// Read-only view of each pattern's LUT.
    pub fn luts(&self) -> impl Iterator<Item = &[f32]> + '_ { self.tuples.iter().map(|t| &t.lut[..]) }

    /// Reject boards of another size at an I/O boundary.
    pub fn check_board(&self, board: &Board) -> Result<(), NetworkError> {
        if board.size() != self.size {
            return Err(NetworkError::BoardSize { expected: self.size, found: board.size() });
        }
        Ok(())
    }

    /// Sum of the LUT entries addressed by every variant of every pattern.
    pub fn evaluate(&self, board: &Board) -> f32 {
        debug_assert_eq!(board.size(), self.size);
        let codes = board.codes();
        let mut value = 0.0f32;
        for tuple in &self.tuples {
            for variant in &tuple.variants {
                value += tuple.lut[self.index(codes, variant)];
            }
        }
        value
    }

    /// Add `delta` to the entry each variant addresses.
    ///
    /// Variants that happen to address the same entry each add their own `delta`.
    pub fn update(&mut self, board: &Board, delta: f32) {
        debug_assert_eq!(board.size(), self.size);
        let codes = board.codes();
        let radix = self.radix;
        for tuple in &mut self.tuples {
            for variant in &tuple.variants {
                tuple.lut[index_of(radix, codes, variant)] += delta;
            }
        }
    }

    pub fn stats(&self) -> NetworkStats {
        let variants = self.tuples.iter().map(|t| t.variants.len()).sum();
        let entries = self.tuples.iter().map(|t| t.lut.len()).sum::<usize>();
        NetworkStats {
            patterns: self.tuples.len(),
            variants,
            entries,
            bytes: entries * std::mem::size_of::<f32>(),
        }
    }

    /// LUT slot a variant reads on `board`.
    #[inline]
    fn index(&self, codes: &[u8], variant: &[usize]) -> usize { index_of(self.radix, codes, variant) }

    pub(crate) fn tuple_shapes(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.tuples.iter().map(|t| (t.pattern.len(), t.lut.len()))
    }

    /// Swap in LUTs that were already checked against `tuple_shapes`.
    pub(crate) fn replace_luts(&mut self, luts: Vec<Box<[f32]>>) {
        debug_assert_eq!(luts.len(), self.tuples.len());
        for (tuple, lut) in self.tuples.iter_mut().zip(luts) {
            debug_assert_eq!(tuple.lut.len(), lut.len());
            tuple.lut = lut;
        }
    }
}

#[inline]
fn lut_len(radix: usize, tuple_len: usize) -> usize { radix.pow(tuple_len as u32) }

/// Radix-`radix` number formed by the variant's codes, most significant first.
/// Codes at or above the radix saturate to its top digit.
#[inline]
fn index_of(radix: usize, codes: &[u8], variant: &[usize]) -> usize {
    variant.iter().fold(0, |acc, &cell| acc * radix + (codes[cell] as usize).min(radix - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Move;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn distinct_board() -> Board {
        // Every code differs, so no two variants share a LUT slot.
        let codes: Vec<u8> = vec![3, 7, 0, 12, 5, 1, 14, 9, 2, 11, 6, 15, 4, 13, 8, 10];
        Board::from_codes(BoardSize::Four, &codes).unwrap()
    }

    fn random_boards(size: BoardSize, n: usize, seed: u64) -> Vec<Board> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let codes: Vec<u8> = (0..size.cells()).map(|_| rng.gen_range(0..12)).collect();
                Board::from_codes(size, &codes).unwrap()
            })
            .collect()
    }

    fn lut_total(net: &NTupleNetwork) -> f64 { net.luts().flat_map(|l| l.iter()).map(|&w| w as f64).sum() }

    #[test]
    fn index_is_most_significant_first() {
        let codes = [1u8, 2, 3, 4];
        assert_eq!(index_of(16, &codes, &[0, 1, 2, 3]), 0x1234);
        assert_eq!(index_of(16, &codes, &[3, 2, 1, 0]), 0x4321);
        assert_eq!(index_of(10, &codes, &[0, 1]), 12);
        // Saturates codes beyond the radix.
        assert_eq!(index_of(12, &[13u8], &[0]), 11);
    }

    #[test]
    fn zero_network_evaluates_to_zero() {
        let net = NTupleNetwork::light(BoardSize::Four);
        for b in random_boards(BoardSize::Four, 20, 1) {
            assert_eq!(net.evaluate(&b), 0.0);
        }
    }

    #[test]
    fn zero_update_is_identity() {
        let mut net = NTupleNetwork::light(BoardSize::Four);
        let boards = random_boards(BoardSize::Four, 10, 2);
        net.update(&boards[0], 0.75);
        let before: Vec<f32> = boards.iter().map(|b| net.evaluate(b)).collect();
        for b in &boards {
            net.update(b, 0.0);
        }
        let after: Vec<f32> = boards.iter().map(|b| net.evaluate(b)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn repeated_update_is_linear() {
        let boards = random_boards(BoardSize::Four, 10, 3);
        for b in &boards {
            let mut twice = NTupleNetwork::light(BoardSize::Four);
            twice.update(b, 0.25);
            twice.update(b, 0.25);
            let mut once = NTupleNetwork::light(BoardSize::Four);
            once.update(b, 0.5);
            for board in &boards {
                assert_eq!(twice.evaluate(board), once.evaluate(board));
            }
        }
    }

    #[test]
    fn update_applies_delta_per_variant() {
        let mut net = NTupleNetwork::light(BoardSize::Four);
        let total_variants = net.stats().variants;
        for b in random_boards(BoardSize::Four, 5, 4) {
            let before = lut_total(&net);
            net.update(&b, 1.0);
            let after = lut_total(&net);
            assert_eq!(after - before, total_variants as f64);
        }
    }

    #[test]
    fn evaluate_moves_by_delta_times_variants_without_collisions() {
        let mut net = NTupleNetwork::light(BoardSize::Four);
        let b = distinct_board();
        net.update(&b, 0.5);
        assert_eq!(net.evaluate(&b), 0.5 * net.stats().variants as f32);
    }

    #[test]
    fn collisions_are_not_deduplicated() {
        // A uniform board makes every variant of a pattern hit the same slot.
        let mut net = NTupleNetwork::light(BoardSize::Four);
        let b = Board::from_codes(BoardSize::Four, &[1; 16]).unwrap();
        net.update(&b, 1.0);
        let expected: f32 = net.variants().map(|v| (v.len() * v.len()) as f32).sum();
        assert_eq!(net.evaluate(&b), expected);
    }

    #[test]
    fn symmetric_boards_share_value() {
        let mut net = NTupleNetwork::light(BoardSize::Four);
        let b = distinct_board();
        net.update(&b, 1.0);
        // Mirror the board left-right: all its variants are the original's variants.
        let codes = b.codes();
        let mirrored: Vec<u8> = (0..16).map(|i| codes[(i / 4) * 4 + (3 - i % 4)]).collect();
        let m = Board::from_codes(BoardSize::Four, &mirrored).unwrap();
        assert_eq!(net.evaluate(&m), net.evaluate(&b));
    }

    #[test]
    fn afterstates_are_scored_on_copies() {
        let mut net = NTupleNetwork::light(BoardSize::Four);
        let b = distinct_board();
        let s = b.shift(Move::Left);
        net.update(&s.board, 1.0);
        assert!(net.evaluate(&s.board) > 0.0);
        assert_eq!(b, distinct_board());
    }

    #[test]
    fn stats_report_shape() {
        let net = NTupleNetwork::light(BoardSize::Four);
        let stats = net.stats();
        assert_eq!(stats.patterns, 5);
        assert_eq!(stats.variants, 40);
        assert_eq!(stats.entries, 5 * 16usize.pow(4));
        assert_eq!(stats.bytes, stats.entries * 4);
        assert!(stats.to_string().contains("variants: 40"));
    }

    #[test]
    fn full_catalog_shape() {
        // 3x3 keeps the full tables small enough to allocate in tests.
        let net = NTupleNetwork::new(BoardSize::Three);
        let stats = net.stats();
        assert_eq!(stats.patterns, 3);
        assert_eq!(stats.entries, 2 * 12usize.pow(6) + 12usize.pow(4));
    }

    #[test]
    fn rejects_foreign_boards() {
        let net = NTupleNetwork::light(BoardSize::Four);
        let b = Board::empty(BoardSize::Five);
        assert_eq!(
            net.check_board(&b),
            Err(NetworkError::BoardSize { expected: BoardSize::Four, found: BoardSize::Five })
        );
        assert!(net.check_board(&Board::empty(BoardSize::Four)).is_ok());
    }

    #[test]
    fn with_patterns_validates() {
        let bad = vec![Pattern::new(BoardSize::Five, vec![0, 20]).unwrap()];
        let err = NTupleNetwork::with_patterns(BoardSize::Four, bad).unwrap_err();
        assert_eq!(err, NetworkError::InvalidPattern(PatternError::CellOutOfRange { cell: 20, cells: 16 }));
        let ok = vec![Pattern::new(BoardSize::Four, vec![0, 1, 2]).unwrap()];
        let net = NTupleNetwork::with_patterns(BoardSize::Four, ok).unwrap();
        assert_eq!(net.stats().entries, 16usize.pow(3));
    }
}
