//! Tuple shapes and the board's dihedral symmetry group.
//!
//! A [`Pattern`] is an ordered list of cell indices. Applying the eight
//! [`Symmetry`] transforms to it yields its variants; every variant of a
//! pattern addresses the same lookup table, so a pattern's value is shared
//! across rotated and reflected boards.
//!
//! ```
//! use ntuple_2048::engine::BoardSize;
//! use ntuple_2048::patterns::Pattern;
//! let p = Pattern::new(BoardSize::Four, vec![0, 1, 2, 3, 4, 5]).unwrap();
//! assert_eq!(p.variants(BoardSize::Four).len(), 8);
//! ```

use std::collections::HashSet;
use std::fmt;

use crate::engine::BoardSize;

/// Longest supported tuple.
pub const MAX_TUPLE_LEN: usize = 6;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern has no cells")]
    Empty,
    #[error("pattern length {0} exceeds {}", MAX_TUPLE_LEN)]
    TooLong(usize),
    #[error("cell {cell} out of range for a board of {cells} cells")]
    CellOutOfRange { cell: usize, cells: usize },
    #[error("cell {0} repeated in pattern")]
    DuplicateCell(usize),
}

/// One element of the order-8 dihedral group: optional horizontal
/// reflection followed by `quarter_turns` clockwise rotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symmetry {
    reflect: bool,
    quarter_turns: u8,
}

impl Symmetry {
    pub const IDENTITY: Symmetry = Symmetry { reflect: false, quarter_turns: 0 };

    /// All eight transforms; identity first.
    pub const ALL: [Symmetry; 8] = [
        Symmetry { reflect: false, quarter_turns: 0 },
        Symmetry { reflect: false, quarter_turns: 1 },
        Symmetry { reflect: false, quarter_turns: 2 },
        Symmetry { reflect: false, quarter_turns: 3 },
        Symmetry { reflect: true, quarter_turns: 0 },
        Symmetry { reflect: true, quarter_turns: 1 },
        Symmetry { reflect: true, quarter_turns: 2 },
        Symmetry { reflect: true, quarter_turns: 3 },
    ];

    #[inline]
    pub fn reflects(self) -> bool { self.reflect }

    #[inline]
    pub fn quarter_turns(self) -> u8 { self.quarter_turns }

    /// Image of `(row, col)` on a board of side `side`.
    pub fn map(self, side: usize, row: usize, col: usize) -> (usize, usize) {
        let (mut r, mut c) = if self.reflect { (row, side - 1 - col) } else { (row, col) };
        for _ in 0..self.quarter_turns {
            (r, c) = (c, side - 1 - r);
        }
        (r, c)
    }

    /// `perm[i]` is the cell that cell `i` is carried to.
    pub fn permutation(self, size: BoardSize) -> Vec<usize> {
        let side = size.side();
        (0..size.cells())
            .map(|idx| {
                let (r, c) = self.map(side, idx / side, idx % side);
                r * side + c
            })
            .collect()
    }

    /// Apply this transform to an ordered list of cells, keeping the order.
    pub fn apply(self, size: BoardSize, cells: &[usize]) -> Vec<usize> {
        let perm = self.permutation(size);
        cells.iter().map(|&c| perm[c]).collect()
    }
}

impl fmt::Display for Symmetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let refl = if self.reflect { "reflect+" } else { "" };
        write!(f, "{}rot{}", refl, self.quarter_turns as u32 * 90)
    }
}

/// An ordered tuple of board cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    cells: Vec<usize>,
}

impl Pattern {
    /// Validate and build a pattern for boards of `size`.
    pub fn new(size: BoardSize, cells: Vec<usize>) -> Result<Self, PatternError> {
        validate(size, &cells)?;
        Ok(Pattern { cells })
    }

    fn fixed(cells: &[usize]) -> Self { Pattern { cells: cells.to_vec() } }

    #[inline]
    pub fn cells(&self) -> &[usize] { &self.cells }

    #[inline]
    pub fn len(&self) -> usize { self.cells.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.cells.is_empty() }

    /// Re-check this pattern against a board size.
    pub fn validate(&self, size: BoardSize) -> Result<(), PatternError> { validate(size, &self.cells) }

    /// Distinct symmetry images of this pattern, in [`Symmetry::ALL`] order.
    ///
    /// A transform whose image repeats an earlier index list is dropped, so
    /// a pattern has fewer than 8 variants only if it is invariant under some
    /// non-identity transform.
    pub fn variants(&self, size: BoardSize) -> Vec<Vec<usize>> {
        let mut seen: HashSet<Vec<usize>> = HashSet::with_capacity(Symmetry::ALL.len());
        let mut out = Vec::with_capacity(Symmetry::ALL.len());
        for sym in Symmetry::ALL {
            let variant = sym.apply(size, &self.cells);
            if seen.insert(variant.clone()) {
                out.push(variant);
            }
        }
        out
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:?}", self.cells) }
}

fn validate(size: BoardSize, cells: &[usize]) -> Result<(), PatternError> {
    if cells.is_empty() {
        return Err(PatternError::Empty);
    }
    if cells.len() > MAX_TUPLE_LEN {
        return Err(PatternError::TooLong(cells.len()));
    }
    let mut seen = HashSet::with_capacity(cells.len());
    for &cell in cells {
        if cell >= size.cells() {
            return Err(PatternError::CellOutOfRange { cell, cells: size.cells() });
        }
        if !seen.insert(cell) {
            return Err(PatternError::DuplicateCell(cell));
        }
    }
    Ok(())
}

// Cell layout reference (4x4):
//  0  1  2  3
//  4  5  6  7
//  8  9 10 11
// 12 13 14 15
const CATALOG_3: &[&[usize]] = &[&[0, 1, 2, 3, 4, 5], &[0, 1, 2, 3, 4, 6], &[0, 1, 3, 4]];
const CATALOG_4: &[&[usize]] = &[
    &[0, 1, 2, 3, 4, 5],
    &[4, 5, 6, 7, 8, 9],
    &[0, 1, 2, 4, 5, 6],
    &[4, 5, 6, 8, 9, 10],
];
const CATALOG_5: &[&[usize]] = &[
    &[0, 1, 2, 3, 4],
    &[5, 6, 7, 8, 9],
    &[0, 1, 2, 5, 6, 7],
    &[6, 7, 8, 11, 12, 13],
];

const LIGHT_3: &[&[usize]] = &[&[0, 1, 2, 3], &[0, 1, 3, 4]];
const LIGHT_4: &[&[usize]] = &[&[0, 1, 2, 3], &[4, 5, 6, 7], &[0, 1, 4, 5], &[1, 2, 5, 6], &[5, 6, 9, 10]];
const LIGHT_5: &[&[usize]] = &[&[0, 1, 2, 3], &[5, 6, 7, 8], &[0, 1, 5, 6], &[6, 7, 11, 12]];

/// Base patterns used for full-strength networks.
pub fn catalog(size: BoardSize) -> Vec<Pattern> {
    let shapes = match size {
        BoardSize::Three => CATALOG_3,
        BoardSize::Four => CATALOG_4,
        BoardSize::Five => CATALOG_5,
    };
    shapes.iter().map(|cells| Pattern::fixed(cells)).collect()
}

/// 4-tuple patterns with small tables (radix^4 entries each).
pub fn light_catalog(size: BoardSize) -> Vec<Pattern> {
    let shapes = match size {
        BoardSize::Three => LIGHT_3,
        BoardSize::Four => LIGHT_4,
        BoardSize::Five => LIGHT_5,
    };
    shapes.iter().map(|cells| Pattern::fixed(cells)).collect()
}
