//! Trigger signals.
//!
//! Signals never run capture code directly: a listener task turns each
//! delivery into a [Control] message for the capture loop.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// OS signal used as the capture trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSignal {
    /// `SIGINT`, i.e. Ctrl-C on the capture terminal.
    Interrupt,
    /// `SIGUSR1`.
    User1,
}

impl TriggerSignal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            TriggerSignal::Interrupt => libc::SIGINT,
            TriggerSignal::User1 => libc::SIGUSR1,
        }
    }

    /// Name as understood by `kill -s` and `killall -s`.
    pub fn name(self) -> &'static str {
        match self {
            TriggerSignal::Interrupt => "SIGINT",
            TriggerSignal::User1 => "SIGUSR1",
        }
    }

    fn kind(self) -> SignalKind {
        SignalKind::from_raw(self.as_raw())
    }
}

impl fmt::Display for TriggerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the capture loop is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Trigger,
    Shutdown,
}

/// Install signal listeners and return the stream of controls.
///
/// `trigger` maps to [Control::Trigger]. `SIGTERM`, and `SIGINT` when it is
/// not the trigger, map to [Control::Shutdown]. Deliveries that arrive
/// before the previous one was observed collapse into one.
///
/// Must be called from within a tokio runtime.
pub fn listen(trigger: TriggerSignal) -> io::Result<mpsc::Receiver<Control>> {
    let mut triggers = signal(trigger.kind())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = match trigger {
        TriggerSignal::Interrupt => None,
        _ => Some(signal(SignalKind::interrupt())?),
    };

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        loop {
            let control = tokio::select! {
                Some(()) = triggers.recv() => Control::Trigger,
                Some(()) = terminate.recv() => Control::Shutdown,
                Some(()) = recv_optional(&mut interrupt) => Control::Shutdown,
                else => break,
            };
            debug!(?control, "signal received");
            if tx.send(control).await.is_err() || control == Control::Shutdown {
                break;
            }
        }
    });
    Ok(rx)
}

async fn recv_optional(signal: &mut Option<Signal>) -> Option<()> {
    match signal {
        Some(signal) => signal.recv().await,
        None => std::future::pending().await,
    }
}

/// Drop controls that queued up while the camera was being set up.
///
/// Returns `true` when one of them asked for shutdown.
pub fn discard_pending(controls: &mut mpsc::Receiver<Control>) -> bool {
    let mut shutdown = false;
    while let Ok(control) = controls.try_recv() {
        match control {
            Control::Trigger => warn!("click: I am awaking already. Please wait..."),
            Control::Shutdown => shutdown = true,
        }
    }
    shutdown
}
