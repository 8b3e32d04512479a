//! VFP Engine - demo entry point
//!
//! Plays a synthetic session (sine tone + moving test pattern) through the
//! full pipeline, optionally seeks, then prints a diagnostics snapshot as
//! JSON. Video goes to a headless renderer; audio goes to a timer-driven
//! output unless `--device` selects the system output device.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vfp_common::config::{resolve_config_path, CONFIG_ENV_VAR};
use vfp_common::human_time::format_position;
use vfp_engine::audio::{AudioManager, ManualAudioManager, OutputFormat};
use vfp_engine::source::{SineToneDecoder, TestPatternDecoder};
use vfp_engine::{HeadlessRenderer, PlaybackEngine, PlayerConfig, PlayerEvent};

/// Callback period of the timer-driven output
const DRIVER_PERIOD: Duration = Duration::from_millis(10);

/// Command-line arguments for vfp-engine
#[derive(Parser, Debug)]
#[command(name = "vfp-engine")]
#[command(about = "Audio-mastered video playback engine demo")]
#[command(version)]
struct Args {
    /// Configuration file (overrides VFP_CONFIG and platform locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to play before stopping
    #[arg(short, long, default_value = "3.0")]
    duration: f64,

    /// Seek to this position (seconds) halfway through
    #[arg(short, long)]
    seek: Option<f64>,

    /// Length of the synthetic media (seconds)
    #[arg(long, default_value = "60.0")]
    media_length: f64,

    /// Output sample rate for the timer-driven output
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Play through the default system output device
    #[cfg(feature = "cpal-output")]
    #[arg(long)]
    device: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vfp_engine=info,vfp_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR) {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            PlayerConfig::from_file(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => {
            info!("No configuration file, using defaults");
            PlayerConfig::default()
        }
    };

    let audio_manager = build_audio_manager(&args)?;
    let format = audio_manager.output_format();
    let renderer = Arc::new(HeadlessRenderer::new());

    let engine = PlaybackEngine::builder(config)
        .audio(Box::new(
            SineToneDecoder::new(format.sample_rate, format.channels)
                .with_duration(args.media_length),
        ))
        .video(Box::new(
            TestPatternDecoder::new(320, 240, 30.0).with_duration(args.media_length),
        ))
        .audio_manager(audio_manager)
        .renderer(Arc::clone(&renderer) as Arc<dyn vfp_engine::VideoRenderer>)
        .open()
        .await
        .context("Failed to open playback session")?;

    let events = spawn_event_logger(&engine);

    engine.play().await.context("Failed to start playback")?;

    let half = Duration::from_secs_f64(args.duration.max(0.0) / 2.0);
    let outcome = tokio::select! {
        result = run_session(&engine, half, args.seek) => result,
        _ = signal::ctrl_c() => {
            warn!("Session interrupted at {}", format_position(engine.position()));
            Ok(())
        }
    };

    engine.stop().await.context("Failed to stop playback")?;
    events.abort();
    outcome?;

    info!(
        "Rendered {} video frames (last at {})",
        renderer.frames_rendered(),
        renderer
            .last_pts()
            .map(format_position)
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&engine.diagnostics())
            .context("Failed to serialize diagnostics")?
    );
    Ok(())
}

/// Play for two halves with an optional seek in between
async fn run_session(engine: &PlaybackEngine, half: Duration, seek: Option<f64>) -> Result<()> {
    tokio::time::sleep(half).await;
    if let Some(target) = seek {
        engine.seek(target).await.context("Seek failed")?;
    }
    tokio::time::sleep(half).await;
    Ok(())
}

fn spawn_event_logger(engine: &PlaybackEngine) -> tokio::task::JoinHandle<()> {
    let mut rx = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match &event {
                PlayerEvent::StreamFatal { stream, reason, .. } => {
                    warn!("{} stream failed: {}", stream, reason)
                }
                other => info!("Event: {}", other.event_type()),
            }
        }
    })
}

#[cfg(feature = "cpal-output")]
fn build_audio_manager(args: &Args) -> Result<Arc<dyn AudioManager>> {
    if args.device {
        let manager = vfp_engine::audio::CpalAudioManager::new()
            .context("Failed to open audio output device")?;
        return Ok(Arc::new(manager));
    }
    Ok(timer_driven_output(args.sample_rate))
}

#[cfg(not(feature = "cpal-output"))]
fn build_audio_manager(args: &Args) -> Result<Arc<dyn AudioManager>> {
    Ok(timer_driven_output(args.sample_rate))
}

fn timer_driven_output(sample_rate: u32) -> Arc<dyn AudioManager> {
    let manager = Arc::new(ManualAudioManager::new(OutputFormat {
        sample_rate,
        channels: 2,
    }));
    // Driver lives for the whole process
    Arc::clone(&manager).spawn_driver(DRIVER_PERIOD);
    manager
}
