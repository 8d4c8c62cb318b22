use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voxlink::capture::CapturePipeline;
use voxlink::playback::PlaybackScheduler;
use voxlink::{Capabilities, EngineConfig, MediaContent, SessionController, SharedState};

/// Voxlink - Real-time voice session engine
#[derive(Parser)]
#[command(name = "voxlink", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a live voice session (default)
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,voxlink=info",
        1 => "info,voxlink=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::Run) | None => run_session().await,
    }
}

/// Host the engine from the terminal with logging capability stubs
async fn run_session() -> anyhow::Result<()> {
    let config = EngineConfig::load()?;
    tracing::info!(model = %config.model, voice = %config.voice, "starting voice session");

    let controller = SessionController::new(config, Arc::new(LoggingCapabilities));
    controller.connect().await?;

    println!("Session live. Speak into your microphone; press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    println!("\nShutting down...");
    controller.disconnect().await;
    tracing::info!(status = %controller.status(), "session ended");

    Ok(())
}

/// Capability stubs that log what a real host would persist
struct LoggingCapabilities;

#[async_trait]
impl Capabilities for LoggingCapabilities {
    async fn task_action(
        &self,
        action: &str,
        title: Option<&str>,
        search_term: Option<&str>,
    ) -> voxlink::Result<String> {
        tracing::info!(action, ?title, ?search_term, "task action");
        Ok(match title {
            Some(title) => format!("Task \"{title}\" {action}d."),
            None => format!("Task {action}d."),
        })
    }

    async fn reminder_action(
        &self,
        action: &str,
        title: Option<&str>,
        search_term: Option<&str>,
    ) -> voxlink::Result<String> {
        tracing::info!(action, ?title, ?search_term, "reminder action");
        Ok(format!("Reminder {action}d."))
    }

    async fn note_action(&self, action: &str, content: Option<&str>) -> voxlink::Result<String> {
        tracing::info!(action, ?content, "note action");
        Ok(format!("Note {action}d."))
    }

    async fn log_mood(&self, score: u8, notes: Option<&str>) -> voxlink::Result<String> {
        tracing::info!(score, ?notes, "mood logged");
        Ok(format!("Mood logged at {score}/5."))
    }

    fn display_updated(&self, content: &MediaContent) {
        tracing::info!(?content, "display updated");
    }

    async fn music_action(&self, args: &Value) -> voxlink::Result<Value> {
        tracing::info!(%args, "music action (no backend wired)");
        Ok(json!({"message": "No music service is connected."}))
    }
}

/// Test microphone input with a terminal level meter
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n---");

    let shared = Arc::new(SharedState::default());
    let (frames_tx, mut frames_rx) = mpsc::channel(16);
    let mut capture = CapturePipeline::start(frames_tx, Arc::clone(&shared))?;

    // Keep the frame channel drained so the meter reflects live audio
    let drain = tokio::spawn(async move { while frames_rx.recv().await.is_some() {} });

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let loudness = shared.input_loudness();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (loudness * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {:.4} | [{}]", i + 1, loudness, meter);
    }

    capture.stop();
    drain.abort();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = PlaybackScheduler::start(1.0)?;
    let handle = playback.handle();

    let sample_rate = f64::from(voxlink::codec::PLAYBACK_SAMPLE_RATE);
    let frequency = 440.0_f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate * 2.0) as usize;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            ((2.0 * std::f64::consts::PI * frequency * t).sin() * 0.3) as f32
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    handle.enqueue(samples);

    while handle.is_speaking() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    playback.stop();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
