//! Training and evaluation settings.
//!
//! Priority, highest first:
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables (`NTUPLE_<KEY>`)
//! 3. A TOML file: `--config`, else `NTUPLE_CONFIG`, else the first of
//!    [`CONFIG_SEARCH_PATHS`] that exists
//! 4. Built-in defaults
//!
//! ```text
//! NTUPLE_EPISODES=200000
//! NTUPLE_ALPHA=0.001
//! NTUPLE_WEIGHTS_DIR=/data/weights
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::engine::{value_to_code, BoardSize, Code};
use crate::learning::DEFAULT_ALPHA;
use crate::policy::{ExpectimaxConfig, DEFAULT_SAMPLE_CAP};

/// Names the config file when `--config` is not given.
pub const CONFIG_ENV: &str = "NTUPLE_CONFIG";

/// Checked in order when no file is named explicitly.
pub const CONFIG_SEARCH_PATHS: &[&str] = &["ntuple.toml", "config/ntuple.toml"];

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unsupported board size {0} (expected 3, 4 or 5)")]
    BoardSize(usize),
    #[error("alpha must be positive and finite, got {0}")]
    Alpha(f32),
    #[error("milestone {0} is not a tile value")]
    Milestone(u32),
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Board side length: 3, 4 or 5.
    pub board_size: usize,
    pub alpha: f32,
    pub episodes: u64,
    /// Write `weights-<episode>.bin` this often; 0 disables periodic checkpoints.
    pub checkpoint_every: u64,
    pub weights_dir: PathBuf,
    pub eval_games: usize,
    /// Tile values whose reach rate is reported.
    pub milestones: Vec<u32>,
    /// Fixed RNG seed; random when unset.
    pub seed: Option<u64>,
    pub expectimax_depth: u32,
    pub sample_cap: usize,
    pub log_every: u64,
    /// Use the small 4-tuple catalog.
    pub light_patterns: bool,
    pub log_level: String,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            board_size: 4,
            alpha: DEFAULT_ALPHA,
            episodes: 100_000,
            checkpoint_every: 10_000,
            weights_dir: PathBuf::from("weights"),
            eval_games: 1_000,
            milestones: vec![512, 1024, 2048, 4096, 8192],
            seed: None,
            expectimax_depth: 2,
            sample_cap: DEFAULT_SAMPLE_CAP,
            log_every: 1_000,
            light_patterns: false,
            log_level: "info".to_string(),
        }
    }
}

macro_rules! env_override {
    // String-like field
    ($config:expr, $field:ident, $lookup:expr, $key:expr) => {
        if let Some(v) = $lookup($key) {
            $config.$field = v.into();
        }
    };
    // Parseable field
    ($config:expr, $field:ident, $lookup:expr, $key:expr, parse) => {
        if let Some(raw) = $lookup($key) {
            match raw.parse() {
                Ok(v) => $config.$field = v,
                Err(_) => warn!("ignoring {}={:?}: not a valid value", $key, raw),
            }
        }
    };
    // Optional parseable field
    ($config:expr, $field:ident, $lookup:expr, $key:expr, optional_parse) => {
        if let Some(raw) = $lookup($key) {
            match raw.parse() {
                Ok(v) => $config.$field = Some(v),
                Err(_) => warn!("ignoring {}={:?}: not a valid value", $key, raw),
            }
        }
    };
}

impl TrainConfig {
    /// Resolve the file layer (explicit path, then [`CONFIG_ENV`], then the
    /// search paths) and apply environment overrides on top.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let named = explicit.map(Path::to_path_buf).or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let base = match named {
            Some(path) => {
                info!("loading config from {}", path.display());
                Self::from_path(&path)?
            }
            None => match CONFIG_SEARCH_PATHS.iter().map(Path::new).find(|p| p.exists()) {
                Some(path) => {
                    info!("loading config from {}", path.display());
                    Self::from_path(path)?
                }
                None => {
                    debug!("no config file found, using built-in defaults");
                    Self::default()
                }
            },
        };
        Ok(base.apply_env_overrides())
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Overrides from the process environment.
    pub fn apply_env_overrides(self) -> Self { self.apply_overrides_from(|key| std::env::var(key).ok()) }

    /// Overrides from an arbitrary `NTUPLE_<KEY>` lookup.
    pub fn apply_overrides_from<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        env_override!(self, board_size, lookup, "NTUPLE_BOARD_SIZE", parse);
        env_override!(self, alpha, lookup, "NTUPLE_ALPHA", parse);
        env_override!(self, episodes, lookup, "NTUPLE_EPISODES", parse);
        env_override!(self, checkpoint_every, lookup, "NTUPLE_CHECKPOINT_EVERY", parse);
        env_override!(self, weights_dir, lookup, "NTUPLE_WEIGHTS_DIR");
        env_override!(self, eval_games, lookup, "NTUPLE_EVAL_GAMES", parse);
        env_override!(self, seed, lookup, "NTUPLE_SEED", optional_parse);
        env_override!(self, expectimax_depth, lookup, "NTUPLE_EXPECTIMAX_DEPTH", parse);
        env_override!(self, sample_cap, lookup, "NTUPLE_SAMPLE_CAP", parse);
        env_override!(self, log_every, lookup, "NTUPLE_LOG_EVERY", parse);
        env_override!(self, light_patterns, lookup, "NTUPLE_LIGHT_PATTERNS", parse);
        env_override!(self, log_level, lookup, "NTUPLE_LOG_LEVEL");
        if let Some(raw) = lookup("NTUPLE_MILESTONES") {
            match raw.split(',').map(|s| s.trim().parse::<u32>()).collect::<Result<Vec<_>, _>>() {
                Ok(v) => self.milestones = v,
                Err(_) => warn!("ignoring NTUPLE_MILESTONES={:?}: expected comma-separated tile values", raw),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.board()?;
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(ConfigError::Alpha(self.alpha));
        }
        if self.log_every == 0 {
            return Err(ConfigError::Zero("log_every"));
        }
        if self.sample_cap == 0 {
            return Err(ConfigError::Zero("sample_cap"));
        }
        self.milestone_codes()?;
        Ok(())
    }

    pub fn board(&self) -> Result<BoardSize, ConfigError> {
        BoardSize::try_from(self.board_size).map_err(|_| ConfigError::BoardSize(self.board_size))
    }

    /// Milestones as tile codes, in the configured order.
    pub fn milestone_codes(&self) -> Result<Vec<Code>, ConfigError> {
        self.milestones
            .iter()
            .map(|&v| match value_to_code(v) {
                Ok(code) if code > 0 => Ok(code),
                _ => Err(ConfigError::Milestone(v)),
            })
            .collect()
    }

    pub fn expectimax(&self) -> ExpectimaxConfig {
        ExpectimaxConfig { depth: self.expectimax_depth, sample_cap: self.sample_cap }
    }

    /// Path of the periodic checkpoint after `episode` episodes.
    pub fn checkpoint_path(&self, episode: u64) -> PathBuf { self.weights_dir.join(format!("weights-{episode}.bin")) }

    pub fn final_weights_path(&self) -> PathBuf { self.weights_dir.join("weights-final.bin") }
}
