/*
 *  display/drivers/headless.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Headless panel: accepts frames, counts them and optionally keeps the
 *  last one as a PPM snapshot on disk
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use log::{debug, info};

use crate::display::error::DisplayError;
use crate::display::framebuffer::Screen;
use crate::display::traits::{DisplayCapabilities, DisplayDriver};

/// Counters shared with whoever created the driver
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessStats {
    pub flushes: u64,
    pub lit_pixels: usize,
}

pub struct HeadlessDriver {
    capabilities: DisplayCapabilities,
    rotation: u16,
    snapshot: Option<PathBuf>,
    stats: Arc<Mutex<HeadlessStats>>,
}

impl HeadlessDriver {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            capabilities: DisplayCapabilities { width, height, supports_rotation: true },
            rotation: 0,
            snapshot: None,
            stats: Arc::new(Mutex::new(HeadlessStats::default())),
        }
    }

    /// Write every flushed frame to `path` as binary PPM
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    pub fn stats(&self) -> Arc<Mutex<HeadlessStats>> {
        Arc::clone(&self.stats)
    }

    fn write_snapshot(&self, frame: &Screen) -> Result<(), DisplayError> {
        let Some(path) = &self.snapshot else { return Ok(()) };
        let io = |e: std::io::Error| DisplayError::FlushFailed(format!("{}: {}", path.display(), e));

        let mut out = BufWriter::new(File::create(path).map_err(io)?);
        write!(out, "P6\n{} {}\n255\n", frame.width(), frame.height()).map_err(io)?;
        for &px in frame.as_slice() {
            let c: Rgb888 = px.into();
            out.write_all(&[c.r(), c.g(), c.b()]).map_err(io)?;
        }
        out.flush().map_err(io)
    }
}

impl DisplayDriver for HeadlessDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        info!(
            "headless panel {}x{}{}",
            self.capabilities.width,
            self.capabilities.height,
            self.snapshot.as_ref().map(|p| format!(", snapshots to {}", p.display())).unwrap_or_default()
        );
        Ok(())
    }

    fn flush(&mut self, frame: &Screen) -> Result<(), DisplayError> {
        let expected = (self.capabilities.width * self.capabilities.height) as usize;
        if frame.as_slice().len() != expected {
            return Err(DisplayError::BufferSizeMismatch { expected, actual: frame.as_slice().len() });
        }
        self.write_snapshot(frame)?;

        let lit = frame.count_not(Rgb565::BLACK);
        let mut stats = self.stats.lock().map_err(|_| DisplayError::FlushFailed("stats poisoned".to_string()))?;
        stats.flushes += 1;
        stats.lit_pixels = lit;
        debug!("headless flush #{} ({} lit, rotation {})", stats.flushes, lit, self.rotation);
        Ok(())
    }

    fn set_rotation(&mut self, degrees: u16) -> Result<(), DisplayError> {
        if !matches!(degrees, 0 | 90 | 180 | 270) {
            return Err(DisplayError::InvalidRotation(degrees));
        }
        self.rotation = degrees;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_counts_flushes() {
        let mut driver = HeadlessDriver::new(8, 4);
        let stats = driver.stats();
        let mut frame = Screen::new(8, 4, Rgb565::BLACK);
        driver.flush(&frame).unwrap();
        frame.clear(Rgb565::WHITE).unwrap();
        driver.flush(&frame).unwrap();

        let stats = *stats.lock().unwrap();
        assert_eq!(stats, HeadlessStats { flushes: 2, lit_pixels: 32 });
    }

    #[test]
    fn test_headless_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.ppm");
        let mut driver = HeadlessDriver::new(2, 2).with_snapshot(&path);
        driver.flush(&Screen::new(2, 2, Rgb565::WHITE)).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"P6\n2 2\n255\n"));
        assert_eq!(bytes.len(), 11 + 2 * 2 * 3);
        assert_eq!(&bytes[11..14], &[255, 255, 255]);
    }

    #[test]
    fn test_headless_rotation() {
        let mut driver = HeadlessDriver::new(320, 240);
        assert!(driver.set_rotation(180).is_ok());
        assert!(matches!(driver.set_rotation(33), Err(DisplayError::InvalidRotation(33))));
    }
}
