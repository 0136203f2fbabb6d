/*
 * Copyright (c) 2026. click authors - All Rights Reserved
 */
//! The capture loop: one acquisition cycle per trigger, never two at once.

use std::mem;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{error, info, warn};

use crate::camera::Camera;
use crate::config::{CaptureConfig, OutputFormat};
use crate::error::Result;
use crate::frame::{Frame, GrabFailure};
use crate::pgm;
use crate::session::{CaptureOutcome, CaptureSession};
use crate::trigger::Control;

/// How one acquisition cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    Saved { width: u32, height: u32, path: PathBuf },
    SaveFailed { width: u32, height: u32, reason: String },
    GrabFailed(GrabFailure),
    TimedOut,
    SdkFailed(String),
}

/// Observable steps of the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    Started,
    /// A trigger arrived while a capture was in flight.
    Ignored,
    Finished(CycleReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: usize,
    pub saved: usize,
    pub ignored: usize,
}

enum State<C: Camera> {
    Idle(CaptureSession<C>),
    Busy,
}

pub struct CaptureLoop<C: Camera> {
    session: CaptureSession<C>,
    config: CaptureConfig,
    observer: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl<C> CaptureLoop<C>
where
    C: Camera + 'static,
{
    pub fn new(session: CaptureSession<C>, config: CaptureConfig) -> Self {
        Self { session, config, observer: None }
    }

    /// Mirror every [LoopEvent] into `observer`.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<LoopEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Serve controls until shutdown is requested or every sender is gone.
    ///
    /// A capture in flight at shutdown is allowed to finish. The session is
    /// handed back for teardown.
    pub async fn run(self, mut controls: mpsc::Receiver<Control>) -> Result<(CaptureSession<C>, LoopStats)> {
        let CaptureLoop { session, config, observer } = self;
        let notify = |event: LoopEvent| {
            if let Some(observer) = &observer {
                let _ = observer.send(event);
            }
        };

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut state = State::Idle(session);
        let mut stats = LoopStats::default();
        let mut shutting_down = false;

        info!("click: Ready to shoot...");
        let session = loop {
            tokio::select! {
                control = controls.recv(), if !shutting_down => match control {
                    Some(Control::Trigger) => match mem::replace(&mut state, State::Busy) {
                        State::Busy => {
                            warn!("click: I am taking a picture already. Please wait...");
                            stats.ignored += 1;
                            notify(LoopEvent::Ignored);
                        }
                        State::Idle(session) => {
                            notify(LoopEvent::Started);
                            let config = config.clone();
                            let done = done_tx.clone();
                            tokio::spawn(async move {
                                let joined = task::spawn_blocking(move || run_cycle(session, &config)).await;
                                let _ = done.send(joined);
                            });
                        }
                    },
                    Some(Control::Shutdown) | None => {
                        info!("Shutdown requested");
                        shutting_down = true;
                        if let State::Idle(session) = mem::replace(&mut state, State::Busy) {
                            break session;
                        }
                    }
                },
                Some(joined) = done_rx.recv() => {
                    let (session, report) = joined?;
                    stats.cycles += 1;
                    if let CycleReport::Saved { .. } = report {
                        stats.saved += 1;
                        if let Some(hook) = &config.post_capture_hook {
                            spawn_hook(hook);
                        }
                    }
                    notify(LoopEvent::Finished(report));
                    if shutting_down {
                        break session;
                    }
                    state = State::Idle(session);
                    info!("click: Ready to shoot...");
                }
            }
        };

        info!(cycles = stats.cycles, saved = stats.saved, ignored = stats.ignored, "Capture loop stopped");
        Ok((session, stats))
    }
}

fn run_cycle<C: Camera>(mut session: CaptureSession<C>, config: &CaptureConfig) -> (CaptureSession<C>, CycleReport) {
    info!("Taking picture...");
    let outcome = session.capture(config.grab_timeout(), |frame| save_frame(frame, &config.output, config.format));

    let report = match outcome {
        Ok(CaptureOutcome::Captured { width, height, value: Ok(()) }) => {
            info!(width, height, path = %config.output.display(), "Image acquired!");
            CycleReport::Saved { width, height, path: config.output.clone() }
        }
        Ok(CaptureOutcome::Captured { width, height, value: Err(e) }) => {
            error!(width, height, path = %config.output.display(), error = %e, "Image acquired but not saved");
            CycleReport::SaveFailed { width, height, reason: e.to_string() }
        }
        Ok(CaptureOutcome::Failed(failure)) => {
            error!(code = format_args!("0x{:x}", failure.code), description = %failure.description, "No image acquired!");
            CycleReport::GrabFailed(failure)
        }
        Ok(CaptureOutcome::TimedOut) => {
            error!(timeout_ms = config.grab_timeout_ms, "Timeout occurred!");
            CycleReport::TimedOut
        }
        Err(e) => {
            error!(error = %e, "Acquisition cycle failed");
            CycleReport::SdkFailed(e.to_string())
        }
    };
    info!("Picture taken.");
    (session, report)
}

/// Write a successful frame to `path`, replacing any previous file.
pub fn save_frame(frame: &Frame, path: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Pgm => {
            pgm::save_p2(path, frame.width(), frame.height(), frame.data())?;
            Ok(())
        }
        #[cfg(feature = "image")]
        OutputFormat::Png => {
            let gray = image::GrayImage::try_from(frame)?;
            gray.save_with_format(path, image::ImageFormat::Png)?;
            Ok(())
        }
        #[cfg(not(feature = "image"))]
        OutputFormat::Png => Err(crate::Error::UnsupportedFormat { format: "png", feature: "image" }),
    }
}

/// Start the post-capture program detached; it is never waited on.
fn spawn_hook(program: &Path) {
    info!(hook = %program.display(), "Calling post-capture script");
    let spawned = Command::new(program)
        .stdin(Stdio::null())
        .kill_on_drop(false)
        .spawn();
    if let Err(e) = spawned {
        warn!(hook = %program.display(), error = %e, "Post-capture script did not start");
    }
}
