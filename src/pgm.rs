//! Plain (`P2`) greyscale PGM.
//!
//! The writer emits one image row per line with every sample followed by a
//! single space, the layout downstream scripts expect.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::PgmError;

pub const MAGIC: &str = "P2";
pub const MAX_GREY: u16 = 255;

/// Write `pixels` (row-major, one byte per sample) as a plain PGM.
pub fn write_p2<W: Write>(mut out: W, width: u32, height: u32, pixels: &[u8]) -> Result<(), PgmError> {
    let expected = width as usize * height as usize;
    if pixels.len() < expected {
        return Err(PgmError::ShortBuffer { width, height, expected, actual: pixels.len() });
    }

    write!(out, "{MAGIC}\n{width} {height}\n{MAX_GREY}\n")?;
    if width > 0 {
        for row in pixels[..expected].chunks(width as usize) {
            for value in row {
                write!(out, "{value} ")?;
            }
            out.write_all(b"\n")?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Create or truncate `path` and write the image into it.
pub fn save_p2<P: AsRef<Path>>(path: P, width: u32, height: u32, pixels: &[u8]) -> Result<(), PgmError> {
    let file = File::create(path)?;
    write_p2(BufWriter::new(file), width, height, pixels)
}
