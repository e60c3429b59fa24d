use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use aura_sync::audio::{
    AudioBuffer, CpalMicrophone, CpalOutput, Microphone, OUTPUT_SAMPLE_RATE, PlaybackNotifier,
    PlaybackScheduler, SAMPLE_RATE, samples_to_wav,
};
use aura_sync::tools::APPS;
use aura_sync::{
    Command, Config, LiveSession, SessionSettings, SessionSnapshot, StartRequest, SystemDevices,
    ToolDispatcher, WebSocketConnector,
};

/// Aura - real-time voice and video companion
#[derive(Parser)]
#[command(name = "aura", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Talk with your companion (the default)
    Live {
        /// Prebuilt voice name
        #[arg(long, env = "AURA_VOICE")]
        voice: Option<String>,
        /// Start with the camera on
        #[arg(long)]
        camera: bool,
        /// How the companion addresses you
        #[arg(long, env = "AURA_USER_NAME")]
        user: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Also save the recording as WAV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// List the apps the companion can open
    Apps,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,aura_sync=info",
        1 => "info,aura_sync=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Cmd::Live {
        voice: None,
        camera: false,
        user: None,
    }) {
        Cmd::Live {
            voice,
            camera,
            user,
        } => live(voice, camera, user).await,
        Cmd::TestMic { duration, output } => test_mic(duration, output).await,
        Cmd::TestSpeaker => test_speaker().await,
        Cmd::Apps => {
            for (name, url) in APPS {
                println!("{name:<10} {url}");
            }
            Ok(())
        }
    }
}

/// Run a live session on the default devices, driven by stdin
#[allow(clippy::future_not_send)]
async fn live(voice: Option<String>, camera: bool, user: Option<String>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(user) = user {
        config.persona.user_name = user;
    }

    let request = StartRequest {
        voice: voice.unwrap_or_else(|| config.live.voice.clone()),
        system_instruction: config.persona.system_instruction(),
        camera_requested: camera,
    };

    let mut session = LiveSession::new(
        SessionSettings::from_config(&config),
        Box::new(WebSocketConnector),
        Box::new(SystemDevices::new(config.camera.clone())),
        ToolDispatcher::default(),
    )
    .on_interaction(|| tracing::debug!("interaction recorded"));

    let (commands, rx) = mpsc::unbounded_channel();
    commands.send(Command::Start(request))?;

    tokio::spawn(print_snapshots(session.subscribe(), config.persona.name.clone()));
    tokio::spawn(read_commands(commands));

    println!("Commands: c = toggle camera, m = toggle mute, q = quit");

    tokio::select! {
        () = session.run(rx) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    session.stop_session();
    Ok(())
}

async fn read_commands(commands: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let command = match line.trim() {
            "c" => Command::ToggleCamera,
            "m" => Command::ToggleMute,
            "q" => break,
            "" => continue,
            other => {
                println!("Unknown command: {other}");
                continue;
            }
        };
        if commands.send(command).is_err() {
            break;
        }
    }
    // Dropping the sender ends the session loop
}

async fn print_snapshots(mut snapshots: watch::Receiver<SessionSnapshot>, name: String) {
    let mut status = String::new();
    let mut printed = 0;
    let mut muted = false;

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();

        if snapshot.status != status {
            println!("[{}]", snapshot.status);
            status.clone_from(&snapshot.status);
        }
        if snapshot.muted != muted {
            println!("{}", if snapshot.muted { "(muted)" } else { "(unmuted)" });
            muted = snapshot.muted;
        }

        // Transcript resets with every new session
        printed = printed.min(snapshot.finalized_turns);
        for turn in &snapshot.transcript[printed..snapshot.finalized_turns] {
            if !turn.user.is_empty() {
                println!("You: {}", turn.user.trim());
            }
            if !turn.ai.is_empty() {
                println!("{name}: {}", turn.ai.trim());
            }
        }
        printed = snapshot.finalized_turns;
    }
}

/// Test microphone input with a level meter
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let window = Arc::new(Mutex::new(Vec::new()));
    let recording = Arc::new(Mutex::new(Vec::new()));

    let mut capture = CpalMicrophone::new()?;
    capture.start(Box::new({
        let window = Arc::clone(&window);
        let recording = Arc::clone(&recording);
        let keep = output.is_some();
        move |block: &[f32]| {
            if let Ok(mut window) = window.lock() {
                window.extend_from_slice(block);
            }
            if keep && let Ok(mut recording) = recording.lock() {
                recording.extend_from_slice(block);
            }
        }
    }))?;

    println!("Sample rate: {SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = window
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default();
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    if let Some(path) = output {
        let samples = recording
            .lock()
            .map(|mut r| std::mem::take(&mut *r))
            .unwrap_or_default();
        std::fs::write(&path, samples_to_wav(&samples, SAMPLE_RATE)?)?;
        println!("\nSaved {} samples to {}", samples.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave played as back-to-back chunks
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a steady 440Hz tone for 2 seconds\n");

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let output = CpalOutput::new(PlaybackNotifier::new(move |id| {
        let _ = done_tx.send(id);
    }))?;
    let mut scheduler = PlaybackScheduler::new(Box::new(output));

    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let rate = OUTPUT_SAMPLE_RATE as f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..OUTPUT_SAMPLE_RATE * 2)
        .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / rate).sin() * 0.3)
        .collect();

    // 100ms chunks, like streamed model audio; any gap would be audible
    for chunk in samples.chunks(2400) {
        scheduler.enqueue(AudioBuffer::new(OUTPUT_SAMPLE_RATE, vec![chunk.to_vec()]))?;
    }

    println!("Playing {} samples at {OUTPUT_SAMPLE_RATE} Hz...", samples.len());

    while scheduler.is_playing() {
        match tokio::time::timeout(Duration::from_secs(5), done_rx.recv()).await {
            Ok(Some(id)) => {
                scheduler.on_ended(id);
            }
            _ => break,
        }
    }

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
