//! click: take one picture per trigger signal.
//!
//! ```text
//! click-trigger ──SIGINT──► listener task ──Control──► capture loop
//!                                                        │ idle: spawn cycle
//!                                                        │ busy: ignore
//!                                                        ▼
//!                                   arm → wait 3 s → saida.pgm → re-queue
//! ```
//!
//! The camera is the simulated transport layer from `click::sim`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::task;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use click::sim::SimTransport;
use click::{trigger, CaptureConfig, CaptureLoop, CaptureSession, DeviceClass, OutputFormat, TriggerSignal};

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture one greyscale frame per trigger signal")]
struct Args {
    /// JSON configuration file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output file, rewritten on every capture.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Grab timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Signal that triggers a capture.
    #[arg(short, long, value_enum)]
    signal: Option<TriggerSignal>,

    /// Program to run, detached, after each saved picture.
    #[arg(long)]
    hook: Option<PathBuf>,

    /// Raw exposure time.
    #[arg(long)]
    exposure: Option<u32>,

    #[arg(long, value_enum, default_value = "gige")]
    transport: DeviceClass,

    /// Sensor size of the simulated camera, e.g. 640x480.
    #[arg(long, default_value = "640x480", value_parser = parse_sensor)]
    sensor: (u32, u32),
}

impl Args {
    fn capture_config(&self) -> Result<CaptureConfig> {
        let mut config = match &self.config {
            Some(path) => CaptureConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => CaptureConfig::default(),
        };
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.grab_timeout_ms = timeout_ms;
        }
        if let Some(signal) = self.signal {
            config.trigger_signal = signal;
        }
        if let Some(hook) = &self.hook {
            config.post_capture_hook = Some(hook.clone());
        }
        if let Some(exposure) = self.exposure {
            config.camera.exposure_time_raw = exposure;
        }
        Ok(config)
    }
}

fn parse_sensor(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let width = w.trim().parse().map_err(|e| format!("width: {e}"))?;
    let height = h.trim().parse().map_err(|e| format!("height: {e}"))?;
    Ok((width, height))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("click v{}", env!("CARGO_PKG_VERSION"));

    match run(Args::parse()).await {
        Ok(()) => {
            info!("click exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.capture_config()?;
    if config.grab_timeout_ms == 0 {
        bail!("grab timeout must be positive");
    }

    // Listen before setup so early triggers get the awaking notice.
    let mut controls = trigger::listen(config.trigger_signal).context("installing signal listeners")?;
    info!(trigger = %config.trigger_signal, output = %config.output.display(), "Waiting for camera");

    let (width, height) = args.sensor;
    let transport = SimTransport::create(args.transport, width, height).context("creating transport layer")?;
    let settings = config.camera.clone();
    let session = task::spawn_blocking(move || CaptureSession::open(&transport, &settings))
        .await?
        .context("setting up camera")?;

    if trigger::discard_pending(&mut controls) {
        task::spawn_blocking(move || session.close()).await?.context("closing camera")?;
        return Ok(());
    }

    let (session, _stats) = CaptureLoop::new(session, config).run(controls).await?;
    task::spawn_blocking(move || session.close()).await?.context("closing camera")?;
    Ok(())
}
