/*
 * Copyright (c) 2026. click authors - All Rights Reserved
 */
use std::path::PathBuf;

use thiserror::Error;

use crate::frame::BufferHandle;

/// Errors reported by a camera SDK implementation.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Failed to create transport layer: {reason}")]
    TransportUnavailable { reason: String },

    #[error("No camera present")]
    NoCameraPresent,

    #[error("Device error 0x{code:x}: {description}")]
    Device { code: u32, description: String },

    #[error("{component} is not open")]
    NotOpen { component: &'static str },

    #[error("Buffer {handle} is not registered")]
    UnknownBuffer { handle: BufferHandle },

    #[error("Buffer {handle} is still queued")]
    BufferBusy { handle: BufferHandle },

    #[error("Grab buffer was not recovered from the stream grabber")]
    BufferLost,
}

#[derive(Error, Debug)]
pub enum PgmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {width}x{height} needs {expected} bytes, buffer holds {actual}")]
    ShortBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("No process named {name:?} is running")]
    NotRunning { name: String },

    #[error("Failed to signal pid {pid}: {source}")]
    Kill {
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run killall: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("killall exited with {0}")]
    Killall(std::process::ExitStatus),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Camera SDK error: {0}")]
    Sdk(#[from] SdkError),

    #[error("PGM error: {0}")]
    Pgm(#[from] PgmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration invalid in {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Output format {format} needs the `{feature}` cargo feature")]
    UnsupportedFormat {
        format: &'static str,
        feature: &'static str,
    },

    #[error("Capture worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[cfg(feature = "image")]
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
