use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use ntuple_2048::config::TrainConfig;
use ntuple_2048::learning::{play_game, EpisodeResult, EvalSummary, TdLearner, TrainingStats};
use ntuple_2048::network::NTupleNetwork;
use ntuple_2048::policy::{Expectimax, Greedy, MovePolicy};
use ntuple_2048::trace::record_game;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "ntuple-2048", about = "Train and run n-tuple 2048 players")]
struct Args {
    /// TOML config file (falls back to NTUPLE_CONFIG, then ./ntuple.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Board side length (3, 4 or 5)
    #[arg(long, global = true)]
    size: Option<usize>,
    /// Use the small 4-tuple pattern catalog
    #[arg(long, global = true)]
    light: bool,
    /// Hide progress bars
    #[arg(long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Learn weights by self-play
    Train {
        #[arg(long)]
        episodes: Option<u64>,
        #[arg(long)]
        alpha: Option<f32>,
        #[arg(long)]
        checkpoint_every: Option<u64>,
        #[arg(long)]
        weights_dir: Option<PathBuf>,
        #[arg(long)]
        log_every: Option<u64>,
        /// Start from an existing weight file
        #[arg(long)]
        resume: Option<PathBuf>,
    },
    /// Score a weight file over many games
    Eval {
        weights: PathBuf,
        #[arg(long)]
        games: Option<usize>,
        #[arg(long, value_enum, default_value_t = PolicyKind::Greedy)]
        policy: PolicyKind,
        /// Expectimax depth
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Play one game and print the final board
    Play {
        weights: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = PolicyKind::Greedy)]
        policy: PolicyKind,
        #[arg(long)]
        depth: Option<u32>,
        /// Write a binary game record here
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// Print table sizes, and weight statistics if a file is given
    Stats { weights: Option<PathBuf> },
    /// Convert a weight file between binary and JSON (chosen by extension)
    Convert { input: PathBuf, output: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyKind {
    Greedy,
    Expectimax,
}

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = TrainConfig::load(args.config.as_deref()).context("loading configuration")?;

    if let Some(level) = &args.log_level {
        cfg.log_level = level.clone();
    }
    if let Some(seed) = args.seed {
        cfg.seed = Some(seed);
    }
    if let Some(size) = args.size {
        cfg.board_size = size;
    }
    if args.light {
        cfg.light_patterns = true;
    }

    init_tracing(&cfg.log_level)?;

    match args.cmd {
        Cmd::Train { episodes, alpha, checkpoint_every, weights_dir, log_every, resume } => {
            if let Some(v) = episodes {
                cfg.episodes = v;
            }
            if let Some(v) = alpha {
                cfg.alpha = v;
            }
            if let Some(v) = checkpoint_every {
                cfg.checkpoint_every = v;
            }
            if let Some(v) = weights_dir {
                cfg.weights_dir = v;
            }
            if let Some(v) = log_every {
                cfg.log_every = v;
            }
            cfg.validate()?;
            train(&cfg, resume.as_deref(), args.quiet)
        }
        Cmd::Eval { weights, games, policy, depth } => {
            if let Some(v) = games {
                cfg.eval_games = v;
            }
            if let Some(v) = depth {
                cfg.expectimax_depth = v;
            }
            cfg.validate()?;
            eval(&cfg, &weights, policy, args.quiet)
        }
        Cmd::Play { weights, policy, depth, record } => {
            if let Some(v) = depth {
                cfg.expectimax_depth = v;
            }
            cfg.validate()?;
            play(&cfg, weights.as_deref(), policy, record.as_deref())
        }
        Cmd::Stats { weights } => {
            cfg.validate()?;
            stats(&cfg, weights.as_deref())
        }
        Cmd::Convert { input, output } => {
            cfg.validate()?;
            convert(&cfg, &input, &output)
        }
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

fn empty_network(cfg: &TrainConfig) -> Result<NTupleNetwork> {
    let size = cfg.board()?;
    Ok(if cfg.light_patterns { NTupleNetwork::light(size) } else { NTupleNetwork::new(size) })
}

fn load_network(cfg: &TrainConfig, path: &Path) -> Result<NTupleNetwork> {
    let mut network = empty_network(cfg)?;
    network.load(path).with_context(|| format!("loading weights from {}", path.display()))?;
    Ok(network)
}

fn make_policy<'n>(kind: PolicyKind, network: &'n NTupleNetwork, cfg: &TrainConfig, rng: &mut StdRng) -> Box<dyn MovePolicy + 'n> {
    match kind {
        PolicyKind::Greedy => Box::new(Greedy::new(network)),
        PolicyKind::Expectimax => Box::new(Expectimax::seeded(network, cfg.expectimax(), rng.gen())),
    }
}

fn progress_bar(len: u64, quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::with_template("{elapsed_precise} [{bar:40}] {pos}/{len} | {msg}")?.progress_chars("=> "));
    Ok(pb)
}

fn train(cfg: &TrainConfig, resume: Option<&Path>, quiet: bool) -> Result<()> {
    let network = match resume {
        Some(path) => {
            let net = load_network(cfg, path)?;
            info!(path = %path.display(), "resuming from weights");
            net
        }
        None => empty_network(cfg)?,
    };
    info!(size = %network.size(), stats = %network.stats(), alpha = cfg.alpha, episodes = cfg.episodes, "training");
    fs::create_dir_all(&cfg.weights_dir)
        .with_context(|| format!("creating weights directory {}", cfg.weights_dir.display()))?;

    let mut learner = TdLearner::new(network, cfg.alpha);
    let mut rng = make_rng(cfg.seed);
    let mut stats = TrainingStats::default();
    let pb = progress_bar(cfg.episodes, quiet)?;
    let start = Instant::now();

    for episode in 1..=cfg.episodes {
        let result = learner.train_episode(&mut rng);
        stats.record(&result);
        pb.inc(1);
        if episode % cfg.log_every == 0 {
            pb.set_message(format!("mean {:.0} | best tile {}", stats.mean_score(), stats.max_tile()));
            info!(
                episode,
                mean_score = stats.mean_score(),
                window = stats.window_len(),
                best_score = stats.best_score(),
                max_tile = stats.max_tile(),
                "training progress"
            );
        }
        if cfg.checkpoint_every > 0 && episode % cfg.checkpoint_every == 0 {
            let path = cfg.checkpoint_path(episode);
            learner
                .network()
                .save_binary(&path)
                .with_context(|| format!("writing checkpoint {}", path.display()))?;
            info!(episode, path = %path.display(), "checkpoint written");
        }
    }
    pb.finish_and_clear();

    let path = cfg.final_weights_path();
    learner.network().save_binary(&path).with_context(|| format!("writing final weights {}", path.display()))?;
    println!(
        "Episodes: {} | mean score (last {}): {:.1} | best score: {} | max tile: {} | {:.1}s",
        stats.episodes(),
        stats.window_len(),
        stats.mean_score(),
        stats.best_score(),
        stats.max_tile(),
        start.elapsed().as_secs_f64()
    );
    println!("Weights written to {}", path.display());
    Ok(())
}

fn eval(cfg: &TrainConfig, weights: &Path, kind: PolicyKind, quiet: bool) -> Result<()> {
    let network = load_network(cfg, weights)?;
    let milestones = cfg.milestone_codes()?;
    let mut rng = make_rng(cfg.seed);
    let mut policy = make_policy(kind, &network, cfg, &mut rng);
    let pb = progress_bar(cfg.eval_games as u64, quiet)?;

    let mut results: Vec<EpisodeResult> = Vec::with_capacity(cfg.eval_games);
    let mut total = 0u64;
    for _ in 0..cfg.eval_games {
        let result = play_game(&mut policy, network.size(), &mut rng);
        total += result.score;
        results.push(result);
        pb.inc(1);
        pb.set_message(format!("mean {:.0}", total as f64 / results.len() as f64));
    }
    pb.finish_and_clear();

    let summary = EvalSummary::from_results(&results, &milestones);
    info!(policy = %policy.name(), games = summary.games, mean = summary.mean_score, "evaluation finished");
    println!("Policy: {}", policy.name());
    print!("{summary}");
    Ok(())
}

fn play(cfg: &TrainConfig, weights: Option<&Path>, kind: PolicyKind, record: Option<&Path>) -> Result<()> {
    let network = match weights {
        Some(path) => load_network(cfg, path)?,
        None => {
            warn!("no weights given; playing with an untrained network");
            empty_network(cfg)?
        }
    };
    let mut rng = make_rng(cfg.seed);
    let mut policy = make_policy(kind, &network, cfg, &mut rng);
    let game = record_game(&mut policy, network.size(), &mut rng);
    let Some(last) = game.boards.last() else {
        bail!("recorded game has no boards");
    };

    println!("{last}");
    println!(
        "Policy: {} | moves: {} | score: {} | max tile: {}",
        policy.name(),
        game.steps(),
        game.meta.score,
        last.highest_tile()
    );
    if let Some(path) = record {
        game.write_to_path(path).with_context(|| format!("writing game record {}", path.display()))?;
        println!("Record written to {}", path.display());
    }
    Ok(())
}

fn stats(cfg: &TrainConfig, weights: Option<&Path>) -> Result<()> {
    let network = match weights {
        Some(path) => load_network(cfg, path)?,
        None => empty_network(cfg)?,
    };
    println!("Board: {} | code radix: {}", network.size(), network.radix());
    println!("{}", network.stats());
    for ((pattern, variants), lut) in network.patterns().zip(network.variants()).zip(network.luts()) {
        let nonzero = lut.iter().filter(|&&w| w != 0.0).count();
        let (lo, hi) = lut.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &w| (lo.min(w), hi.max(w)));
        println!(
            "  {pattern}: {} variants, {} entries, {} non-zero, range [{lo:.3}, {hi:.3}]",
            variants.len(),
            lut.len(),
            nonzero
        );
    }
    Ok(())
}

fn convert(cfg: &TrainConfig, input: &Path, output: &Path) -> Result<()> {
    let network = load_network(cfg, input)?;
    network.save(output).with_context(|| format!("writing {}", output.display()))?;
    println!("Converted {} -> {}", input.display(), output.display());
    Ok(())
}
