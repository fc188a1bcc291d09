use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest supported board side.
pub const MAX_SIDE: usize = 5;
/// Cell capacity of the fixed backing array.
pub const MAX_CELLS: usize = MAX_SIDE * MAX_SIDE;

/// Tile code: 0 for empty, `k` for tile `2^k`.
pub type Code = u8;
pub type Score = u64;

/// Highest tile code: `2^31` is the largest tile a `u32` value holds.
/// Two tiles at this code do not merge.
pub const MAX_CODE: Code = 31;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unsupported board side {0} (expected 3, 4 or 5)")]
    UnsupportedSize(usize),
    #[error("board needs {expected} cells, got {found}")]
    CellCount { expected: usize, found: usize },
    #[error("invalid tile value {0}")]
    TileValue(u32),
    #[error("tile code {0} is above the maximum {MAX_CODE}")]
    TileCode(Code),
}

/// Side length of a square board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum BoardSize {
    Three,
    Four,
    Five,
}

impl BoardSize {
    #[inline]
    pub const fn side(self) -> usize {
        match self {
            BoardSize::Three => 3,
            BoardSize::Four => 4,
            BoardSize::Five => 5,
        }
    }

    #[inline]
    pub const fn cells(self) -> usize { self.side() * self.side() }

    /// Number of distinct tile codes a lookup-table index distinguishes on this size.
    #[inline]
    pub const fn code_radix(self) -> usize {
        match self {
            BoardSize::Three => 12,
            BoardSize::Four => 16,
            BoardSize::Five => 18,
        }
    }
}

impl TryFrom<usize> for BoardSize {
    type Error = EngineError;

    fn try_from(side: usize) -> Result<Self, Self::Error> {
        match side {
            3 => Ok(BoardSize::Three),
            4 => Ok(BoardSize::Four),
            5 => Ok(BoardSize::Five),
            other => Err(EngineError::UnsupportedSize(other)),
        }
    }
}

impl From<BoardSize> for usize {
    fn from(size: BoardSize) -> Self { size.side() }
}

impl fmt::Display for BoardSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{0}x{0}", self.side())
    }
}

/// A direction to move/merge tiles.
///
/// The declaration order is the tie-break order used by every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Up,
    Right,
    Down,
    Left,
}

impl Move {
    pub const ALL: [Move; 4] = [Move::Up, Move::Right, Move::Down, Move::Left];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Move::Up => 0,
            Move::Right => 1,
            Move::Down => 2,
            Move::Left => 3,
        }
    }

    pub fn from_index(idx: u8) -> Option<Move> { Move::ALL.get(idx as usize).copied() }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Move::Up => "up",
            Move::Right => "right",
            Move::Down => "down",
            Move::Left => "left",
        };
        f.write_str(s)
    }
}

/// Result of sliding a board: the afterstate, the merge reward and whether anything changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub board: Board,
    pub reward: Score,
    pub moved: bool,
}

/// Square 2048 board of tile codes (0 = empty, `k` = tile `2^k`), row-major.
///
/// `Board` is `Copy`: exploring a move works on a copy and never touches the original.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    size: BoardSize,
    cells: [Code; MAX_CELLS],
}

impl Board {
    /// An all-empty board.
    #[inline]
    pub const fn empty(size: BoardSize) -> Self { Board { size, cells: [0; MAX_CELLS] } }

    /// A fresh game: empty board plus two random tiles.
    ///
    /// ```
    /// use ntuple_2048::engine::{Board, BoardSize};
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(123);
    /// let b = Board::new(BoardSize::Four, &mut rng);
    /// assert_eq!(b.count_empty(), 14);
    /// ```
    pub fn new<R: Rng + ?Sized>(size: BoardSize, rng: &mut R) -> Self {
        let mut board = Board::empty(size);
        for _ in 0..2 {
            if let Some(next) = board.with_random_tile(rng) {
                board = next;
            }
        }
        board
    }

    /// Build a board from tile codes, row-major.
    pub fn from_codes(size: BoardSize, codes: &[Code]) -> Result<Self, EngineError> {
        if codes.len() != size.cells() {
            return Err(EngineError::CellCount { expected: size.cells(), found: codes.len() });
        }
        if let Some(&code) = codes.iter().find(|&&c| c > MAX_CODE) {
            return Err(EngineError::TileCode(code));
        }
        let mut board = Board::empty(size);
        board.cells[..codes.len()].copy_from_slice(codes);
        Ok(board)
    }

    /// Build a board from actual tile values (0 = empty, otherwise a power of two >= 2).
    pub fn from_values(size: BoardSize, values: &[u32]) -> Result<Self, EngineError> {
        if values.len() != size.cells() {
            return Err(EngineError::CellCount { expected: size.cells(), found: values.len() });
        }
        let mut board = Board::empty(size);
        for (slot, &value) in board.cells.iter_mut().zip(values) {
            *slot = value_to_code(value)?;
        }
        Ok(board)
    }

    #[inline]
    pub fn size(&self) -> BoardSize { self.size }

    /// Tile codes of the live cells, row-major.
    #[inline]
    pub fn codes(&self) -> &[Code] { &self.cells[..self.size.cells()] }

    #[inline]
    pub fn code(&self, idx: usize) -> Code { self.codes()[idx] }

    /// Copy of this board with cell `idx` set to `code`.
    #[inline]
    pub fn with_code(mut self, idx: usize, code: Code) -> Self {
        self.cells[idx] = code;
        self
    }

    /// Actual tile values, row-major (0 for empty cells).
    pub fn values(&self) -> Vec<u32> { self.codes().iter().map(|&c| code_to_value(c)).collect() }

    /// Slide and merge toward `dir`. No randomness.
    ///
    /// ```
    /// use ntuple_2048::engine::{Board, BoardSize, Move};
    /// let b = Board::from_values(BoardSize::Four, &[
    ///     2, 2, 2, 2,
    ///     0, 0, 0, 0,
    ///     0, 0, 0, 0,
    ///     0, 0, 0, 0,
    /// ]).unwrap();
    /// let s = b.shift(Move::Left);
    /// assert_eq!(&s.board.values()[..4], &[4, 4, 0, 0]);
    /// assert_eq!(s.reward, 8);
    /// ```
    pub fn shift(self, dir: Move) -> Shift {
        let side = self.size.side();
        let mut out = self;
        let mut reward = 0;
        let mut line = [0 as Code; MAX_SIDE];
        for line_idx in 0..side {
            let cells = line_cells(side, dir, line_idx);
            for (slot, &cell) in line.iter_mut().zip(&cells[..side]) {
                *slot = self.cells[cell];
            }
            reward += slide_line(&mut line[..side]);
            for (&tile, &cell) in line.iter().zip(&cells[..side]) {
                out.cells[cell] = tile;
            }
        }
        let moved = out.cells != self.cells;
        Shift { board: out, reward, moved }
    }

    /// True if some move would change the board.
    pub fn can_move(&self) -> bool {
        let side = self.size.side();
        let codes = self.codes();
        for r in 0..side {
            for c in 0..side {
                let code = codes[r * side + c];
                if code == 0 {
                    return true;
                }
                if code >= MAX_CODE {
                    continue;
                }
                if c + 1 < side && codes[r * side + c + 1] == code {
                    return true;
                }
                if r + 1 < side && codes[(r + 1) * side + c] == code {
                    return true;
                }
            }
        }
        false
    }

    /// Insert a 2 (90%) or 4 (10%) into a uniformly chosen empty cell.
    ///
    /// Returns `None` when the board is full.
    pub fn with_random_tile<R: Rng + ?Sized>(self, rng: &mut R) -> Option<Self> {
        let empty = self.count_empty();
        if empty == 0 {
            return None;
        }
        let target = rng.gen_range(0..empty);
        let tile = generate_random_tile(rng);
        let cell = self.empty_cells().nth(target)?;
        Some(self.with_code(cell, tile))
    }

    /// Indices of the empty cells.
    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.codes().iter().enumerate().filter(|(_, &c)| c == 0).map(|(i, _)| i)
    }

    #[inline]
    pub fn count_empty(&self) -> usize { self.codes().iter().filter(|&&c| c == 0).count() }

    /// Highest tile code on the board (0 if empty).
    #[inline]
    pub fn max_code(&self) -> Code { self.codes().iter().copied().max().unwrap_or(0) }

    /// Highest tile value on the board (0 if empty).
    #[inline]
    pub fn highest_tile(&self) -> u32 { code_to_value(self.max_code()) }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({}, {:?})", self.size, self.codes())
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = self.size.side();
        let sep = "-".repeat(side * 8);
        writeln!(f)?;
        for (r, row) in self.codes().chunks(side).enumerate() {
            let cells: Vec<String> = row.iter().map(format_val).collect();
            writeln!(f, "{}", cells.join("|"))?;
            if r + 1 < side {
                writeln!(f, "{}", sep)?;
            }
        }
        Ok(())
    }
}

/// Tile value for a code (0 stays 0). Codes above [`MAX_CODE`] read as the top tile.
#[inline]
pub fn code_to_value(code: Code) -> u32 {
    if code == 0 { 0 } else { 1u32 << code.min(MAX_CODE) }
}

/// Code for a tile value; rejects anything that is not 0 or a power of two >= 2.
pub fn value_to_code(value: u32) -> Result<Code, EngineError> {
    match value {
        0 => Ok(0),
        v if v >= 2 && v.is_power_of_two() => Ok(v.trailing_zeros() as Code),
        v => Err(EngineError::TileValue(v)),
    }
}

/// Convert a grid of actual values into codes, checking the cell count.
pub fn values_to_codes(size: BoardSize, values: &[u32]) -> Result<Vec<Code>, EngineError> {
    Board::from_values(size, values).map(|b| b.codes().to_vec())
}

/// Convert codes into actual values.
pub fn codes_to_values(codes: &[Code]) -> Vec<u32> { codes.iter().map(|&c| code_to_value(c)).collect() }

fn generate_random_tile<R: Rng + ?Sized>(rng: &mut R) -> Code { if rng.gen_range(0..10) < 9 { 1 } else { 2 } }

/// Cell indices of one line, ordered from the edge tiles slide toward.
fn line_cells(side: usize, dir: Move, line: usize) -> [usize; MAX_SIDE] {
    let mut cells = [0usize; MAX_SIDE];
    for (k, cell) in cells.iter_mut().enumerate().take(side) {
        *cell = match dir {
            Move::Left => line * side + k,
            Move::Right => line * side + (side - 1 - k),
            Move::Up => k * side + line,
            Move::Down => (side - 1 - k) * side + line,
        };
    }
    cells
}

/// Compact, merge equal neighbours once from the front, compact again.
///
/// Returns the summed value of the merged tiles.
fn slide_line(line: &mut [Code]) -> Score {
    compact(line);
    let mut reward = 0;
    let mut i = 0;
    while i + 1 < line.len() {
        if line[i] != 0 && line[i] < MAX_CODE && line[i] == line[i + 1] {
            line[i] += 1;
            reward += 1 << line[i];
            line[i + 1] = 0;
            i += 2;
        } else {
            i += 1;
        }
    }
    compact(line);
    reward
}

fn compact(line: &mut [Code]) {
    let mut write = 0;
    for read in 0..line.len() {
        let tile = line[read];
        if tile != 0 {
            line[read] = 0;
            line[write] = tile;
            write += 1;
        }
    }
}

fn format_val(code: &Code) -> String {
    match code {
        0 => String::from("       "),
        &c => format!("{:^7}", code_to_value(c)),
    }
}
