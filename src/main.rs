use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facemind::{
    config, read_embedding, Embedding, Engine, Error, FileStore, FrameSource, JsonLinesSource,
};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facemind")]
#[command(version, about = "Face embedding gallery - enroll and recognize identities")]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gallery file, overriding `gallery_path` from the config
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll one embedding under a name
    Enroll {
        #[arg(short, long)]
        name: String,
        /// Embedding file (.json array or raw little-endian f32)
        embedding: PathBuf,
    },
    /// Enroll the first face that stays in view across a recorded frame stream
    Capture {
        #[arg(short, long)]
        name: String,
        /// Frames as JSON lines: `null` or an embedding array per frame
        frames: PathBuf,
        /// Consecutive face frames required (defaults to config)
        #[arg(long)]
        stable_frames: Option<u32>,
    },
    /// Match embeddings against the gallery
    Recognize {
        /// Override the configured threshold
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Also show the K closest identities
        #[arg(long)]
        top: Option<usize>,
        /// Recognize every face of every frame in a JSON lines frame stream
        #[arg(long)]
        frames: Option<PathBuf>,
        #[arg(required_unless_present = "frames")]
        embeddings: Vec<PathBuf>,
    },
    /// List enrolled identities
    List,
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(gallery) = cli.gallery {
        cfg.gallery_path = gallery;
    }

    match cli.command {
        Commands::Enroll { name, embedding } => enroll(&cfg, &name, &embedding),
        Commands::Capture {
            name,
            frames,
            stable_frames,
        } => capture(&cfg, &name, &frames, stable_frames.unwrap_or(cfg.stable_frames)),
        Commands::Recognize {
            threshold,
            top,
            frames,
            embeddings,
        } => {
            let threshold = threshold.unwrap_or(cfg.threshold);
            if !embeddings.is_empty() {
                recognize(&cfg, threshold, top, &embeddings)?;
            }
            match frames {
                Some(frames) => recognize_frames(&cfg, threshold, &frames),
                None => Ok(()),
            }
        }
        Commands::List => list(&cfg),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

fn open_engine(cfg: &config::Config) -> Result<Engine<FileStore>> {
    let store = FileStore::new(&cfg.gallery_path);
    Engine::open(store, cfg)
        .with_context(|| format!("Failed to open gallery {}", cfg.gallery_path.display()))
}

fn enroll(cfg: &config::Config, name: &str, path: &Path) -> Result<()> {
    let embedding = read_embedding(path)?;
    enroll_embedding(cfg, name, &embedding)
}

fn enroll_embedding(cfg: &config::Config, name: &str, embedding: &Embedding) -> Result<()> {
    let engine = open_engine(cfg)?;

    if engine.gallery().contains(name) {
        anyhow::bail!("Enrollment failed: {:?} is already enrolled", name);
    }

    match engine.enroll(name, embedding) {
        Ok(()) => {
            info!("✓ Enrolled {:?} ({} identities)", name, engine.gallery().len());
            Ok(())
        }
        Err(e @ Error::DimensionMismatch { .. }) => Err(e).context(
            "Embedding size does not match the gallery; check the feature extractor model",
        ),
        Err(e) => Err(e).context("Failed to enroll"),
    }
}

fn capture(cfg: &config::Config, name: &str, frames: &Path, stable_frames: u32) -> Result<()> {
    info!(
        "Waiting for a face stable across {} frames in {}",
        stable_frames,
        frames.display()
    );

    let mut source = JsonLinesSource::open(frames)?;
    match facemind::capture(&mut source, stable_frames)? {
        Some(embedding) => enroll_embedding(cfg, name, &embedding),
        None => anyhow::bail!(
            "Failed to capture a face. Please ensure your face is visible and well-lit."
        ),
    }
}

fn recognize(
    cfg: &config::Config,
    threshold: f32,
    top: Option<usize>,
    paths: &[PathBuf],
) -> Result<()> {
    let engine = open_engine(cfg)?;
    if engine.gallery().is_empty() {
        warn!("Gallery is empty; every face will be unknown. Run 'enroll' first.");
    }

    for path in paths {
        let embedding = read_embedding(path)?;
        let result = engine
            .recognize(&embedding, threshold)
            .with_context(|| format!("Failed to recognize {}", path.display()))?;

        info!(
            "{}: {} (similarity {:.6}, threshold {:.3})",
            path.display(),
            result.identity,
            result.similarity,
            threshold
        );

        if let Some(k) = top {
            for (rank, (name, score)) in engine.top_k(&embedding, k)?.into_iter().enumerate() {
                info!("  {}. {} {:.6}", rank + 1, name, score);
            }
        }
    }
    Ok(())
}

fn recognize_frames(cfg: &config::Config, threshold: f32, frames: &Path) -> Result<()> {
    let engine = open_engine(cfg)?;
    let mut source = JsonLinesSource::open(frames)?;
    let mut frame_no = 0usize;
    let mut known = 0usize;
    let mut seen = 0usize;

    while let Some(frame) = source.next_frame()? {
        frame_no += 1;
        let results = engine
            .recognize_frame(frame, threshold)
            .with_context(|| format!("Failed to recognize frame {}", frame_no))?;
        if results.is_empty() {
            info!("Frame {}: no face", frame_no);
        }
        for (i, result) in results.iter().enumerate() {
            info!(
                "Frame {} face {}: {} (similarity {:.6})",
                frame_no,
                i + 1,
                result.identity,
                result.similarity
            );
            if result.identity.is_known() {
                known += 1;
            }
        }
        seen += results.len();
    }

    info!(
        "{} frames, {} faces, {} recognized (threshold {:.3})",
        frame_no, seen, known, threshold
    );
    Ok(())
}

fn list(cfg: &config::Config) -> Result<()> {
    let engine = open_engine(cfg)?;
    let snapshot = engine.gallery().load();

    info!(
        "{} identities, dimension {}",
        snapshot.len(),
        snapshot
            .dimension()
            .map_or_else(|| "unset".to_string(), |d| d.to_string())
    );
    for name in snapshot.labels() {
        println!("{}", name);
    }
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))
            .context("Failed to write default config")?;
    }

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
