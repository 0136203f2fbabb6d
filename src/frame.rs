/*
 * Copyright (c) 2026. click authors - All Rights Reserved
 */

use std::fmt;

#[cfg(feature = "image")]
use image::GrayImage;

/// Handle under which a buffer is registered at a stream grabber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Grab buffer memory together with its registration handle.
///
/// Whoever holds the `Buffer` owns the memory: while it is queued at a
/// stream grabber the session has no way to reach it.
#[derive(Debug)]
pub struct Buffer {
    handle: BufferHandle,
    memory: Vec<u8>,
}

impl Buffer {
    pub fn new(handle: BufferHandle, memory: Vec<u8>) -> Self {
        Self { handle, memory }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.memory
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Give the memory back, ending the registration on the caller's side.
    pub fn into_memory(self) -> Vec<u8> {
        self.memory
    }
}

/// Why the SDK could not fill a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabFailure {
    pub code: u32,
    pub description: String,
}

impl fmt::Display for GrabFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}: {}", self.code, self.description)
    }
}

/// A grab result as it is retrieved from the stream grabber.
///
/// Owns the grab buffer until [Frame::into_buffer] hands it back for
/// re-queueing.
#[derive(Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    buffer: Buffer,
    failure: Option<GrabFailure>,
}

impl Frame {
    pub fn succeeded(width: u32, height: u32, buffer: Buffer) -> Self {
        Self { width, height, buffer, failure: None }
    }

    pub fn failed(buffer: Buffer, failure: GrabFailure) -> Self {
        Self { width: 0, height: 0, buffer, failure: Some(failure) }
    }

    /// Whether the buffer was filled with image data.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&GrabFailure> {
        self.failure.as_ref()
    }

    /// Get the width of this image in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the height of this image
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn buffer_handle(&self) -> BufferHandle {
        self.buffer.handle()
    }

    /// Get a Pixel from the image.
    ///
    /// # Arguments
    ///
    /// * `x`: Horizontal coordinate of the requested pixel.
    /// * `y`: Vertical coordinate of the requested pixel.
    ///
    /// returns: Option<u8> the 8-bit intensity, or `None` outside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.width as usize + x as usize;
        self.buffer.as_slice().get(offset).copied()
    }

    /// Get the image data, one byte per pixel in row-major order.
    ///
    /// The grab buffer is sized to the payload and may be longer than the
    /// image; only the `width * height` leading bytes are returned. Failed
    /// grabs have no image data.
    pub fn data(&self) -> &[u8] {
        let len = (self.width as usize * self.height as usize).min(self.buffer.capacity());
        &self.buffer.as_slice()[..len]
    }

    /// Hand the grab buffer back, e.g. to queue it again.
    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }
}

/// Outcome of waiting on the stream grabber.
#[derive(Debug)]
pub enum FrameOrTimeout {
    Frame(Frame),
    Timeout,
}

#[cfg(feature = "image")]
impl TryFrom<&Frame> for GrayImage {
    type Error = crate::Error;

    /// Converts a successful frame to a [GrayImage]
    fn try_from(frame: &Frame) -> Result<Self, Self::Error> {
        if let Some(failure) = frame.failure() {
            return Err(crate::SdkError::Device {
                code: failure.code,
                description: failure.description.clone(),
            }
            .into());
        }
        let data = frame.data().to_vec();
        let actual = data.len();
        GrayImage::from_raw(frame.width(), frame.height(), data).ok_or(
            crate::PgmError::ShortBuffer {
                width: frame.width(),
                height: frame.height(),
                expected: frame.width() as usize * frame.height() as usize,
                actual,
            }
            .into(),
        )
    }
}
