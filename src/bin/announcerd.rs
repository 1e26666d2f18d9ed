//! announcerd - polling detection client
//!
//! This daemon:
//! 1. Probes the detection server's `/test/` endpoint
//! 2. Captures a frame every poll interval while the server is online
//! 3. Uploads it to `/detect/` and reads the detected objects out loud

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use object_announcer::{
    CaptureSource, ClientConfig, CommandSpeech, DetectionSession, FileCamera, HttpClient,
    LogSpeech, SessionCollaborators, SessionRunner, SharedConfig, SnapshotCamera, SpeechSink,
    UreqClient,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Capture, detect and announce objects through a remote detection server"
)]
struct Args {
    /// Detection server base URL (overrides ANNOUNCER_SERVER_URL / config file).
    #[arg(long)]
    server_url: Option<String>,

    /// Poll interval in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Disable spoken announcements (results are still logged and stored).
    #[arg(long)]
    no_speech: bool,

    /// Only detect when asked (disables the poll timer).
    #[arg(long)]
    no_auto_detect: bool,

    /// Capture by reading a JPEG file kept current by another process.
    #[arg(
        long,
        env = "ANNOUNCER_CAMERA_FILE",
        conflicts_with_all = ["snapshot_url", "placeholder"]
    )]
    camera_file: Option<PathBuf>,

    /// Capture from an HTTP snapshot endpoint (IP camera, ESP32-CAM).
    #[arg(long, env = "ANNOUNCER_SNAPSHOT_URL", conflicts_with = "placeholder")]
    snapshot_url: Option<String>,

    /// No camera: announce the placeholder detection without uploading.
    #[arg(long)]
    placeholder: bool,

    /// Speak through espeak instead of the log.
    #[arg(long, conflicts_with = "speech_command")]
    espeak: bool,

    /// Speak through an arbitrary program, called as `<program> <text>`.
    #[arg(long, env = "ANNOUNCER_SPEECH_COMMAND")]
    speech_command: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = ClientConfig::load()?;
    if let Some(url) = &args.server_url {
        cfg.server_url = url.clone();
    }
    if let Some(ms) = args.interval_ms {
        cfg.poll_interval = Duration::from_millis(ms);
    }
    if args.no_speech {
        cfg.speech_enabled = false;
    }
    if args.no_auto_detect {
        cfg.auto_detect_enabled = false;
    }
    cfg.validate()?;

    let http: Arc<dyn HttpClient> = Arc::new(UreqClient::new());
    let capture = capture_source(&args, http.clone())?;
    let speech = speech_sink(&args);

    log::info!("announcerd starting");
    log::info!("  server: {}", cfg.server_url);
    log::info!("  poll interval: {} ms", cfg.poll_interval.as_millis());
    log::info!("  speech: {}", if cfg.speech_enabled { "on" } else { "off" });
    log::info!("  capture: {}", capture.describe());

    let config = SharedConfig::new(cfg);
    let collaborators = SessionCollaborators::new(http, speech).with_capture(capture);
    let session = DetectionSession::new(config, collaborators);
    let handle = SessionRunner::new(session).spawn()?;
    let store = handle.store();

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("announcerd waiting for shutdown signal (Ctrl-C)...");
    let mut last_seen = store.updated_at();
    loop {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
        if !handle.is_running() {
            log::warn!("detection session ended unexpectedly");
            break;
        }
        let updated = store.updated_at();
        if updated != last_seen {
            last_seen = updated;
            println!("{}", serde_json::to_string(&store.get())?);
        }
    }

    log::info!("shutdown signal received, stopping detection session...");
    let stats = handle.status().stats;
    handle.stop()?;
    log::info!(
        "attempts={} uploads={} failures={} dropped_ticks={} probes={}",
        stats.attempts,
        stats.uploads,
        stats.failures,
        stats.ticks_dropped,
        stats.probes
    );
    Ok(())
}

fn capture_source(args: &Args, http: Arc<dyn HttpClient>) -> Result<CaptureSource> {
    if let Some(path) = &args.camera_file {
        return Ok(CaptureSource::device(FileCamera::new(path)));
    }
    if let Some(url) = &args.snapshot_url {
        url::Url::parse(url).map_err(|e| anyhow!("invalid snapshot url '{}': {}", url, e))?;
        return Ok(CaptureSource::device(SnapshotCamera::new(url.clone(), http)));
    }
    if !args.placeholder {
        log::warn!("no camera configured; using placeholder detection");
    }
    Ok(CaptureSource::Placeholder)
}

fn speech_sink(args: &Args) -> Box<dyn SpeechSink> {
    if args.espeak {
        return Box::new(CommandSpeech::espeak());
    }
    if let Some(command) = &args.speech_command {
        let mut parts = command.split_whitespace().map(str::to_string);
        if let Some(program) = parts.next() {
            return Box::new(CommandSpeech::new(program, parts.collect()));
        }
    }
    Box::new(LogSpeech)
}
