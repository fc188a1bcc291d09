//! Weight-file codecs for [`NTupleNetwork`].
//!
//! Binary layout, all integers little-endian `i32`:
//!
//! ```text
//! [format_version][pattern_count]
//! per pattern: [tuple_length][lut_length][lut_length x f32 LE]
//! ```
//!
//! The text form is a JSON document carrying the same fields. Loading
//! decodes and validates the whole file before touching the network, so a
//! mismatched or truncated file never leaves partially applied weights.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::NTupleNetwork;

pub const FORMAT_VERSION: i32 = 1;

#[derive(thiserror::Error, Debug)]
pub enum WeightsError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("file too short or malformed")]
    Truncated,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(i32),
    #[error("pattern count mismatch: network has {expected}, file has {found}")]
    PatternCount { expected: usize, found: i64 },
    #[error("pattern {pattern}: tuple length mismatch: network has {expected}, file has {found}")]
    TupleLength { pattern: usize, expected: usize, found: i64 },
    #[error("pattern {pattern}: lut length mismatch: network has {expected}, file has {found}")]
    LutLength { pattern: usize, expected: usize, found: i64 },
    #[error("unexpected bytes after the last table")]
    TrailingBytes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WeightFile {
    format_version: i32,
    pattern_count: i32,
    patterns: Vec<PatternWeights>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct PatternWeights {
    tuple_length: i32,
    lut_length: i32,
    weights: Vec<f32>,
}

#[inline]
fn read_i32_le(bytes: &[u8], off: &mut usize) -> Option<i32> {
    let raw: [u8; 4] = bytes.get(*off..*off + 4)?.try_into().ok()?;
    *off += 4;
    Some(i32::from_le_bytes(raw))
}

fn fits(found: i64, expected: usize) -> bool { usize::try_from(found).map_or(false, |f| f == expected) }

impl NTupleNetwork {
    fn check_header(&self, version: i32, pattern_count: i64) -> Result<(), WeightsError> {
        if version != FORMAT_VERSION {
            return Err(WeightsError::UnsupportedVersion(version));
        }
        if !fits(pattern_count, self.tuples.len()) {
            return Err(WeightsError::PatternCount { expected: self.tuples.len(), found: pattern_count });
        }
        Ok(())
    }

    fn check_shape(&self, pattern: usize, tuple_len: i64, lut_len: i64) -> Result<usize, WeightsError> {
        let expected_tuple = self.tuples[pattern].pattern.len();
        let expected_lut = self.tuples[pattern].lut.len();
        if !fits(tuple_len, expected_tuple) {
            return Err(WeightsError::TupleLength { pattern, expected: expected_tuple, found: tuple_len });
        }
        if !fits(lut_len, expected_lut) {
            return Err(WeightsError::LutLength { pattern, expected: expected_lut, found: lut_len });
        }
        Ok(expected_lut)
    }

    /// Encode all LUTs in the binary weight format.
    pub fn to_binary_bytes(&self) -> Vec<u8> {
        let payload: usize = self.tuple_shapes().map(|(_, lut)| 8 + lut * 4).sum();
        let mut buf = Vec::with_capacity(8 + payload);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.tuples.len() as i32).to_le_bytes());
        for tuple in &self.tuples {
            buf.extend_from_slice(&(tuple.pattern.len() as i32).to_le_bytes());
            buf.extend_from_slice(&(tuple.lut.len() as i32).to_le_bytes());
            for &w in tuple.lut.iter() {
                buf.extend_from_slice(&w.to_le_bytes());
            }
        }
        buf
    }

    /// Replace all LUTs from a binary weight image.
    ///
    /// On error the network is left unchanged.
    pub fn load_binary_bytes(&mut self, bytes: &[u8]) -> Result<(), WeightsError> {
        let mut off = 0;
        let version = read_i32_le(bytes, &mut off).ok_or(WeightsError::Truncated)?;
        let count = read_i32_le(bytes, &mut off).ok_or(WeightsError::Truncated)?;
        self.check_header(version, count as i64)?;

        let mut luts = Vec::with_capacity(self.tuples.len());
        for pattern in 0..self.tuples.len() {
            let tuple_len = read_i32_le(bytes, &mut off).ok_or(WeightsError::Truncated)?;
            let lut_len = read_i32_le(bytes, &mut off).ok_or(WeightsError::Truncated)?;
            let len = self.check_shape(pattern, tuple_len as i64, lut_len as i64)?;
            let raw = bytes.get(off..off + len * 4).ok_or(WeightsError::Truncated)?;
            off += len * 4;
            let lut: Box<[f32]> = raw
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            luts.push(lut);
        }
        if off != bytes.len() {
            return Err(WeightsError::TrailingBytes);
        }
        self.replace_luts(luts);
        Ok(())
    }

    /// Encode all LUTs as a JSON weight document.
    pub fn to_json(&self) -> Result<String, WeightsError> {
        let file = WeightFile {
            format_version: FORMAT_VERSION,
            pattern_count: self.tuples.len() as i32,
            patterns: self
                .tuples
                .iter()
                .map(|t| PatternWeights {
                    tuple_length: t.pattern.len() as i32,
                    lut_length: t.lut.len() as i32,
                    weights: t.lut.to_vec(),
                })
                .collect(),
        };
        Ok(serde_json::to_string(&file)?)
    }

    /// Replace all LUTs from a JSON weight document.
    ///
    /// On error the network is left unchanged.
    pub fn load_json(&mut self, text: &str) -> Result<(), WeightsError> {
        let file: WeightFile = serde_json::from_str(text)?;
        self.check_header(file.format_version, file.pattern_count as i64)?;
        if !fits(file.patterns.len() as i64, self.tuples.len()) {
            return Err(WeightsError::PatternCount { expected: self.tuples.len(), found: file.patterns.len() as i64 });
        }
        let mut luts = Vec::with_capacity(file.patterns.len());
        for (pattern, entry) in file.patterns.into_iter().enumerate() {
            let len = self.check_shape(pattern, entry.tuple_length as i64, entry.lut_length as i64)?;
            if entry.weights.len() != len {
                return Err(WeightsError::LutLength { pattern, expected: len, found: entry.weights.len() as i64 });
            }
            luts.push(entry.weights.into_boxed_slice());
        }
        self.replace_luts(luts);
        Ok(())
    }

    /// Write the binary weight file to `path`.
    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<(), WeightsError> {
        let bytes = self.to_binary_bytes();
        fs::write(path.as_ref(), &bytes)?;
        debug!(path = %path.as_ref().display(), bytes = bytes.len(), "saved binary weights");
        Ok(())
    }

    /// Load a binary weight file from `path`.
    pub fn load_binary<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WeightsError> {
        let bytes = fs::read(path.as_ref())?;
        self.load_binary_bytes(&bytes)?;
        debug!(path = %path.as_ref().display(), "loaded binary weights");
        Ok(())
    }

    /// Write the JSON weight file to `path`.
    pub fn save_text<P: AsRef<Path>>(&self, path: P) -> Result<(), WeightsError> {
        let text = self.to_json()?;
        fs::write(path.as_ref(), text)?;
        debug!(path = %path.as_ref().display(), "saved json weights");
        Ok(())
    }

    /// Load a JSON weight file from `path`.
    pub fn load_text<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WeightsError> {
        let text = fs::read_to_string(path.as_ref())?;
        self.load_json(&text)?;
        debug!(path = %path.as_ref().display(), "loaded json weights");
        Ok(())
    }

    /// Save in the format implied by the extension (`.json` is text, anything else binary).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WeightsError> {
        if is_json(path.as_ref()) { self.save_text(path) } else { self.save_binary(path) }
    }

    /// Load in the format implied by the extension (`.json` is text, anything else binary).
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WeightsError> {
        if is_json(path.as_ref()) { self.load_text(path) } else { self.load_binary(path) }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}
