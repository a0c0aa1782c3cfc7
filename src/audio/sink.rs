/*
 *  audio/sink.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  PCM sinks: raw s16le to any writer, or nowhere
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

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use super::{AudioSink, StreamError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SinkStats {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: u64,
    pub peak: u16,
    pub finished: bool,
}

/// Discards samples, keeping counts. Used when no output device is set.
#[derive(Debug, Default, Clone)]
pub struct NullSink {
    stats: Arc<Mutex<SinkStats>>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<Mutex<SinkStats>> {
        Arc::clone(&self.stats)
    }
}

impl AudioSink for NullSink {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<(), StreamError> {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        *stats = SinkStats { sample_rate, channels, ..SinkStats::default() };
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), StreamError> {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.samples += samples.len() as u64;
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        stats.peak = stats.peak.max(peak);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StreamError> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).finished = true;
        Ok(())
    }
}

/// Headerless little-endian 16-bit PCM, e.g. into a FIFO read by `aplay`
pub struct PcmSink<W: Write + Send> {
    out: W,
    scratch: Vec<u8>,
}

impl<W: Write + Send> PcmSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, scratch: Vec::new() }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> AudioSink for PcmSink<W> {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<(), StreamError> {
        debug!("pcm out: {} Hz, {} channel(s), s16le", sample_rate, channels);
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), StreamError> {
        self.scratch.clear();
        self.scratch.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
        self.out.write_all(&self.scratch)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StreamError> {
        self.out.flush()?;
        Ok(())
    }
}
