// blind command line interface
// Runs the frame analysis pipeline over image files and raw NV21 dumps

use anyhow::{bail, Context};
use blind_eye::{
    AnalysisExecutor, AnalyzerConfig, CameraFrame, ExecutorStats, FrameAnalyzer, ModelManager,
    RecordingGate,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blind")]
#[command(about = "Flags explicit content in camera frames", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON, TOML or YAML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// ONNX model file
    #[arg(long, global = true)]
    model: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse image files or NV21 dumps and print one JSON verdict per frame
    Analyze {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Width of raw .nv21 dumps
        #[arg(long)]
        width: Option<u32>,

        /// Height of raw .nv21 dumps
        #[arg(long)]
        height: Option<u32>,
    },

    /// Replay a directory of frames as a live feed
    Stream {
        /// Directory of frames, replayed in file name order
        dir: PathBuf,

        /// Frames per second
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Width of raw .nv21 dumps
        #[arg(long)]
        width: Option<u32>,

        /// Height of raw .nv21 dumps
        #[arg(long)]
        height: Option<u32>,
    },

    /// Download the detector model
    DownloadModel {
        /// Model URL (HTTPS only)
        #[arg(long)]
        url: Option<String>,

        /// Expected SHA-256 of the model file
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.log_level, cli.json_logs);

    match cli.command {
        Commands::Analyze {
            paths,
            width,
            height,
        } => {
            analyze(config, &paths, width.zip(height)).await?;
        }
        Commands::Stream {
            dir,
            fps,
            width,
            height,
        } => {
            stream(config, &dir, fps, width.zip(height)).await?;
        }
        Commands::DownloadModel { url, sha256 } => {
            download_model(config, url, sha256).await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Defaults, then the config file, then `BLIND_*` variables, then flags
fn load_config(cli: &Cli) -> anyhow::Result<AnalyzerConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalyzerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };
    config.apply_env();

    if let Some(model) = &cli.model {
        config.model_path = model.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {}", e);
    }
    Ok(config)
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn download_model(
    mut config: AnalyzerConfig,
    url: Option<String>,
    sha256: Option<String>,
) -> anyhow::Result<()> {
    if let Some(url) = url {
        config.model_url = url;
    }
    if sha256.is_some() {
        config.model_checksum = sha256;
    }

    let manager = ModelManager::new(Arc::new(config));
    let path = manager
        .ensure_default_model()
        .await
        .context("Model download failed")?;
    println!("{}", path.display());
    Ok(())
}

/// Download the model when the configured file is missing
async fn prepare_analyzer(config: AnalyzerConfig, gate: RecordingGate) -> anyhow::Result<FrameAnalyzer> {
    if !config.model_path.exists() {
        warn!("Model not found at {:?}, downloading", config.model_path);
        ModelManager::new(Arc::new(config.clone()))
            .ensure_default_model()
            .await
            .context("Model download failed")?;
    }

    FrameAnalyzer::from_config(config, gate).context("Failed to load the detector")
}

async fn analyze(
    config: AnalyzerConfig,
    paths: &[PathBuf],
    nv21_size: Option<(u32, u32)>,
) -> anyhow::Result<()> {
    let files = collect_frames(paths)?;
    if files.is_empty() {
        bail!("No frames found");
    }

    let mut analyzer = prepare_analyzer(config, RecordingGate::new()).await?;
    let mut failures = 0usize;

    for file in &files {
        let verdict = load_frame(file, nv21_size)
            .and_then(|frame| analyzer.inspect(&frame).map_err(anyhow::Error::from));
        match verdict {
            Ok(verdict) => {
                let mut line = serde_json::to_value(&verdict)?;
                line["path"] = serde_json::Value::String(file.display().to_string());
                println!("{}", line);
            }
            Err(e) => {
                failures += 1;
                error!("Failed to analyse {}: {:#}", file.display(), e);
            }
        }
    }

    if failures == files.len() {
        bail!("Every frame failed");
    }
    Ok(())
}

async fn stream(
    config: AnalyzerConfig,
    dir: &Path,
    fps: u32,
    nv21_size: Option<(u32, u32)>,
) -> anyhow::Result<()> {
    if fps == 0 {
        bail!("--fps must be at least 1");
    }
    let files = collect_frames(&[dir.to_path_buf()])?;
    if files.is_empty() {
        bail!("No frames found in {}", dir.display());
    }

    let gate = RecordingGate::new();
    let analyzer = prepare_analyzer(config, gate.clone()).await?;
    let executor = AnalysisExecutor::spawn(analyzer).context("Failed to start executor")?;
    gate.start();

    info!("Streaming {} frames at {} fps", files.len(), fps);
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));
    for file in &files {
        ticker.tick().await;
        // A broken source frame is logged and the feed carries on
        match load_frame(file, nv21_size) {
            Ok(frame) => {
                executor.submit(frame);
            }
            Err(e) => error!("Failed to read frame {}: {:#}", file.display(), e),
        }
    }

    let stats = finish_replay(executor, &gate);
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

/// Join the in-flight frame while still recording, then close the gate.
/// A frame left pending at the end of the replay is dropped.
fn finish_replay(mut executor: AnalysisExecutor, gate: &RecordingGate) -> ExecutorStats {
    let stats = executor.shutdown();
    gate.stop();
    stats
}

fn is_nv21(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("nv21"))
        .unwrap_or(false)
}

fn is_frame_file(path: &Path) -> bool {
    const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "gif", "webp"];
    is_nv21(path)
        || path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
            .unwrap_or(false)
}

/// Expand directories into their frame files, sorted by name
fn collect_frames(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_frame_file(p))
                .collect::<Vec<_>>();
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn load_frame(path: &Path, nv21_size: Option<(u32, u32)>) -> anyhow::Result<CameraFrame> {
    if is_nv21(path) {
        let (width, height) = nv21_size
            .with_context(|| format!("{} is a raw NV21 dump, pass --width and --height", path.display()))?;
        Ok(CameraFrame::from_nv21_file(path, width, height)?)
    } else {
        Ok(CameraFrame::from_image_file(path)?)
    }
}
