//! Binary game records.
//!
//! A record stores every board of one game (initial board plus one per move,
//! spawned tile included) and the moves between them, so an external
//! renderer can replay it frame by frame.
//!
//! Layout (little-endian):
//! `magic "N2R1" | version u8 | side u8 | steps u32 | score u64 | max_code u8 |
//! start_unix_s u64 | elapsed_s f32 | policy_len u16 | policy utf8 |
//! boards (steps + 1) x side² code bytes | moves steps x u8 | crc32c u32`

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::engine::{Board, BoardSize, Code, Move, Score};
use crate::learning::play_game_with;
use crate::policy::MovePolicy;

const MAGIC: &[u8; 4] = b"N2R1";
const VERSION: u8 = 1;
// magic + version + side + steps + score + max_code + start + elapsed + policy_len
const HEADER_LEN: usize = 4 + 1 + 1 + 4 + 8 + 1 + 8 + 4 + 2;
const CRC_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordMeta {
    pub size: BoardSize,
    pub score: Score,
    pub max_code: Code,
    pub start_unix_s: u64,
    pub elapsed_s: f32,
    pub policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub meta: RecordMeta,
    /// Length is `moves.len() + 1`.
    pub boards: Vec<Board>,
    pub moves: Vec<Move>,
}

#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid magic or version")]
    MagicOrVersion,
    #[error("file too short or malformed")]
    Malformed,
    #[error("checksum mismatch")]
    Checksum,
    #[error("record has {boards} boards for {moves} moves")]
    Inconsistent { boards: usize, moves: usize },
    #[error("policy label of {0} bytes does not fit the header")]
    PolicyTooLong(usize),
}

#[inline]
fn read_u16_le(bytes: &[u8], off: &mut usize) -> Option<u16> {
    let b = bytes.get(*off..*off + 2)?;
    *off += 2;
    Some(u16::from_le_bytes([b[0], b[1]]))
}

#[inline]
fn read_u32_le(bytes: &[u8], off: &mut usize) -> Option<u32> {
    let b = bytes.get(*off..*off + 4)?;
    *off += 4;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline]
fn read_u64_le(bytes: &[u8], off: &mut usize) -> Option<u64> {
    let b = bytes.get(*off..*off + 8)?;
    *off += 8;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(b);
    Some(u64::from_le_bytes(arr))
}

#[inline]
fn read_u8(bytes: &[u8], off: &mut usize) -> Option<u8> {
    let b = *bytes.get(*off)?;
    *off += 1;
    Some(b)
}

impl GameRecord {
    #[inline]
    pub fn steps(&self) -> usize { self.moves.len() }

    pub fn encode(&self) -> Result<Vec<u8>, TraceError> {
        if self.boards.len() != self.moves.len() + 1 {
            return Err(TraceError::Inconsistent { boards: self.boards.len(), moves: self.moves.len() });
        }
        let steps = u32::try_from(self.moves.len()).map_err(|_| TraceError::Malformed)?;
        let policy = self.meta.policy.as_deref().unwrap_or("").as_bytes();
        let policy_len = u16::try_from(policy.len()).map_err(|_| TraceError::PolicyTooLong(policy.len()))?;

        let cells = self.meta.size.cells();
        let mut buf = Vec::with_capacity(HEADER_LEN + policy.len() + self.boards.len() * cells + self.moves.len() + CRC_LEN);
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.push(self.meta.size.side() as u8);
        buf.extend_from_slice(&steps.to_le_bytes());
        buf.extend_from_slice(&self.meta.score.to_le_bytes());
        buf.push(self.meta.max_code);
        buf.extend_from_slice(&self.meta.start_unix_s.to_le_bytes());
        buf.extend_from_slice(&self.meta.elapsed_s.to_bits().to_le_bytes());
        buf.extend_from_slice(&policy_len.to_le_bytes());
        buf.extend_from_slice(policy);

        for board in &self.boards {
            if board.size() != self.meta.size {
                return Err(TraceError::Malformed);
            }
            buf.extend_from_slice(board.codes());
        }
        buf.extend(self.moves.iter().map(|m| m.index() as u8));

        let checksum = crc32c::crc32c(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        Ok(buf)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, TraceError> {
        if bytes.len() < HEADER_LEN + CRC_LEN {
            return Err(TraceError::Malformed);
        }
        // Checksum first so field reads only ever see intact bytes.
        let (content, trailer) = bytes.split_at(bytes.len() - CRC_LEN);
        let mut t = 0;
        let file_crc = read_u32_le(trailer, &mut t).ok_or(TraceError::Malformed)?;
        if file_crc != crc32c::crc32c(content) {
            return Err(TraceError::Checksum);
        }
        if &content[..4] != MAGIC || content[4] != VERSION {
            return Err(TraceError::MagicOrVersion);
        }

        let mut off = 5;
        let side = read_u8(content, &mut off).ok_or(TraceError::Malformed)?;
        let size = BoardSize::try_from(side as usize).map_err(|_| TraceError::Malformed)?;
        let steps = read_u32_le(content, &mut off).ok_or(TraceError::Malformed)? as usize;
        let score = read_u64_le(content, &mut off).ok_or(TraceError::Malformed)?;
        let max_code = read_u8(content, &mut off).ok_or(TraceError::Malformed)?;
        let start_unix_s = read_u64_le(content, &mut off).ok_or(TraceError::Malformed)?;
        let elapsed_s = f32::from_bits(read_u32_le(content, &mut off).ok_or(TraceError::Malformed)?);
        let policy_len = read_u16_le(content, &mut off).ok_or(TraceError::Malformed)? as usize;

        let policy_bytes = content.get(off..off + policy_len).ok_or(TraceError::Malformed)?;
        off += policy_len;
        let policy = if policy_len == 0 {
            None
        } else {
            Some(std::str::from_utf8(policy_bytes).map_err(|_| TraceError::Malformed)?.to_string())
        };

        let cells = size.cells();
        let boards_len = (steps + 1).checked_mul(cells).ok_or(TraceError::Malformed)?;
        if content.len() != off + boards_len + steps {
            return Err(TraceError::Malformed);
        }
        let boards = content[off..off + boards_len]
            .chunks_exact(cells)
            .map(|codes| Board::from_codes(size, codes).map_err(|_| TraceError::Malformed))
            .collect::<Result<Vec<_>, _>>()?;
        off += boards_len;
        let moves = content[off..]
            .iter()
            .map(|&b| Move::from_index(b).ok_or(TraceError::Malformed))
            .collect::<Result<Vec<_>, _>>()?;

        let meta = RecordMeta { size, score, max_code, start_unix_s, elapsed_s, policy };
        Ok(GameRecord { meta, boards, moves })
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), TraceError> {
        let data = self.encode()?;
        let mut f = fs::File::create(path)?;
        f.write_all(&data)?;
        Ok(())
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        let data = fs::read(path)?;
        Self::parse(&data)
    }
}

/// Play one game with `policy` and keep every frame.
pub fn record_game<P, R>(policy: &mut P, size: BoardSize, rng: &mut R) -> GameRecord
where
    P: MovePolicy + ?Sized,
    R: Rng + ?Sized,
{
    let start_unix_s = now_unix_seconds();
    let started = Instant::now();
    let mut boards = Vec::new();
    let mut moves = Vec::new();
    let result = play_game_with(policy, size, rng, |before, dir, after| {
        if boards.is_empty() {
            boards.push(*before);
        }
        boards.push(*after);
        moves.push(dir);
    });
    if boards.is_empty() {
        boards.push(result.board);
    }
    let meta = RecordMeta {
        size,
        score: result.score,
        max_code: result.max_code,
        start_unix_s,
        elapsed_s: started.elapsed().as_secs_f32(),
        policy: Some(policy.name()),
    };
    GameRecord { meta, boards, moves }
}

pub fn now_unix_seconds() -> u64 { SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() }
