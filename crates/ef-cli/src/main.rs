mod scene;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ef_core::{EdgePipeline, EvidenceStrategy, FrameSlot, PipelineConfig, ScaleLadder, Spacing};
use serde::Serialize;

use crate::scene::{Scene, SceneSource};

#[derive(Parser)]
#[command(name = "ef", about = "Multi-scale edge field estimator demo driver")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push synthetic frames through the estimator and report per-frame state
    Run {
        /// Synthetic scene to render
        #[arg(long, value_enum, default_value = "step")]
        scene: Scene,

        /// Frame side length in pixels
        #[arg(long, default_value_t = 64)]
        size: usize,

        /// Number of frames to process
        #[arg(long, default_value_t = 10)]
        frames: usize,

        /// Frames the source emits per processing tick; extras are dropped, not queued
        #[arg(long, default_value_t = 1)]
        burst: usize,

        /// Evidence strategy (overrides the config file)
        #[arg(long)]
        strategy: Option<String>,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Sensor noise amplitude
        #[arg(long, default_value_t = 0.02)]
        noise: f64,

        /// RNG seed for the synthetic source
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Emit one JSON object per frame instead of text
        #[arg(long)]
        json: bool,

        /// Write the final edge map as JSON
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Print a generated scale ladder
    Ladder {
        #[arg(long, default_value_t = 0.5)]
        min: f64,

        #[arg(long, default_value_t = 4.0)]
        max: f64,

        #[arg(long, default_value_t = 5)]
        count: usize,

        /// dyadic, feigenbaum or golden
        #[arg(long, default_value = "dyadic")]
        spacing: String,
    },

    /// Print the default configuration as TOML
    Config,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            scene,
            size,
            frames,
            burst,
            strategy,
            config,
            noise,
            seed,
            json,
            dump,
        } => {
            let config = load_config(config.as_deref(), strategy.as_deref())?;
            let opts = RunOptions {
                scene,
                size,
                frames,
                burst: burst.max(1),
                noise,
                seed,
                json,
            };
            cmd_run(config, &opts, dump.as_deref())
        }
        Commands::Ladder {
            min,
            max,
            count,
            spacing,
        } => cmd_ladder(min, max, count, &spacing),
        Commands::Config => cmd_config(),
    }
}

fn load_config(path: Option<&Path>, strategy: Option<&str>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<PipelineConfig>(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(s) = strategy {
        config.evidence.strategy = s
            .parse::<EvidenceStrategy>()
            .context("invalid --strategy")?;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

struct RunOptions {
    scene: Scene,
    size: usize,
    frames: usize,
    burst: usize,
    noise: f64,
    seed: u64,
    json: bool,
}

#[derive(Serialize)]
struct FrameLine {
    t: u64,
    region: String,
    motion: f64,
    coherence: f64,
    c: f64,
    alpha: f64,
    beta: f64,
    edge_pixels: usize,
    max_edge: f64,
    mean_change: f64,
}

fn cmd_run(config: PipelineConfig, opts: &RunOptions, dump: Option<&Path>) -> Result<()> {
    let mut pipeline =
        EdgePipeline::new(opts.size, config).context("failed to build pipeline")?;
    let mut source = SceneSource::new(opts.scene, opts.size, opts.noise, opts.seed);
    let mut slot = FrameSlot::new();
    tracing::info!(
        scene = ?opts.scene,
        size = opts.size,
        frames = opts.frames,
        "starting run"
    );

    let mut last = None;
    for _ in 0..opts.frames {
        for _ in 0..opts.burst {
            let frame = source.next_frame().context("failed to synthesise frame")?;
            if slot.offer(frame).is_some() {
                tracing::debug!("dropped stale frame");
            }
        }
        let Some(frame) = slot.take() else {
            continue;
        };
        let out = pipeline.process(&frame).context("frame processing failed")?;
        let line = FrameLine {
            t: out.t,
            region: out.schedule.region.to_string(),
            motion: out.schedule.motion,
            coherence: out.schedule.coherence,
            c: out.schedule.gains.c,
            alpha: out.schedule.gains.alpha,
            beta: out.schedule.gains.beta,
            edge_pixels: out.edges.edge_pixels(),
            max_edge: out.edges.max(),
            mean_change: out.update.mean_change,
        };
        if opts.json {
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!(
                "t={:<4} region={:<8} motion={:.4} coherence={:.3} c={:.3} alpha={:.3} beta={:.3} edges={}",
                line.t,
                line.region,
                line.motion,
                line.coherence,
                line.c,
                line.alpha,
                line.beta,
                line.edge_pixels
            );
        }
        last = Some(out);
    }

    if !opts.json {
        println!(
            "done. frames={}, dropped={}",
            pipeline.frames_processed(),
            slot.dropped()
        );
    }

    if let Some(path) = dump {
        let out = last.context("no frames processed, nothing to dump")?;
        let json = serde_json::to_string(&out.edges).context("failed to serialize edge map")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        if !opts.json {
            println!("edge map written to {}", path.display());
        }
    }
    Ok(())
}

fn cmd_ladder(min: f64, max: f64, count: usize, spacing: &str) -> Result<()> {
    let spacing: Spacing = spacing.parse().context("invalid --spacing")?;
    let ladder =
        ScaleLadder::generate(min, max, count, spacing).context("failed to build ladder")?;
    let weights = ladder.weights(0.0);
    for (i, sigma) in ladder.scales().iter().enumerate() {
        println!("{i:>2}  sigma={sigma:.6}  weight={:.6}", weights.get(i));
    }
    Ok(())
}

fn cmd_config() -> Result<()> {
    let text = toml::to_string_pretty(&PipelineConfig::default())
        .context("failed to serialize default config")?;
    print!("{text}");
    Ok(())
}
