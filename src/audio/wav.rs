/*
 *  audio/wav.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  WAV streamer: decodes the card's audio asset chunk by chunk, mixes to
 *  mono, applies gain and feeds a sink at the sample clock
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

use std::io::Read;
use std::time::Instant;

use hound::{SampleFormat, WavReader, WavSpec};
use log::{debug, info, warn};

use super::pacer::Pacer;
use super::{AudioSink, AudioStreamer, StreamError, StreamHandle};

/// Frames decoded per `advance`
pub const DEFAULT_CHUNK_FRAMES: usize = 1024;

struct ActiveStream {
    handle: StreamHandle,
    reader: WavReader<Box<dyn Read + Send>>,
    spec: WavSpec,
    pacer: Pacer,
}

pub struct WavStreamer<S: AudioSink> {
    sink: S,
    gain: f32,
    mono: bool,
    chunk_frames: usize,
    realtime: bool,
    next_id: u64,
    active: Option<ActiveStream>,
}

impl<S: AudioSink> WavStreamer<S> {
    pub fn new(sink: S, gain: f32, mono: bool) -> Self {
        Self {
            sink,
            gain: gain.clamp(0.0, 1.0),
            mono,
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            realtime: true,
            next_id: 0,
            active: None,
        }
    }

    /// Decode as fast as the card allows instead of at the sample clock
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn with_chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames.max(1);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

fn check_format(spec: &WavSpec) -> Result<(), StreamError> {
    match (spec.sample_format, spec.bits_per_sample) {
        _ if spec.channels == 0 => Err(StreamError::Unsupported("zero channels".to_string())),
        (SampleFormat::Int, 8..=32) | (SampleFormat::Float, 32) => Ok(()),
        (format, bits) => Err(StreamError::Unsupported(format!("{:?} {}-bit", format, bits))),
    }
}

/// Any integer width to 16 bits
#[inline]
fn int_to_i16(sample: i32, bits: u16) -> i16 {
    if bits >= 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}

#[inline]
fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

#[inline]
fn apply_gain(sample: i32, gain: f32) -> i16 {
    (sample as f32 * gain).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

impl<S: AudioSink> AudioStreamer for WavStreamer<S> {
    fn begin(&mut self, stream: Box<dyn Read + Send>) -> Result<StreamHandle, StreamError> {
        if let Some(old) = self.active.take() {
            warn!("{} replaced before it finished", old.handle);
        }
        let reader = WavReader::new(stream)?;
        let spec = reader.spec();
        check_format(&spec)?;

        let out_channels = if self.mono { 1 } else { spec.channels };
        self.sink.start(spec.sample_rate, out_channels)?;

        self.next_id += 1;
        let handle = StreamHandle(self.next_id);
        info!(
            "{}: {} Hz, {} ch, {}-bit, {:.1}s, gain {:.2}{}",
            handle,
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            reader.duration() as f32 / spec.sample_rate.max(1) as f32,
            self.gain,
            if self.mono && spec.channels > 1 { ", mixed to mono" } else { "" }
        );
        self.active = Some(ActiveStream {
            handle,
            reader,
            spec,
            pacer: Pacer::new(spec.sample_rate, Instant::now()),
        });
        Ok(handle)
    }

    fn is_running(&self, handle: StreamHandle) -> bool {
        self.active.as_ref().is_some_and(|a| a.handle == handle)
    }

    fn advance(&mut self, handle: StreamHandle) -> Result<bool, StreamError> {
        let Self { sink, gain, mono, chunk_frames, realtime, active, .. } = self;
        let active = match active {
            Some(a) if a.handle == handle => a,
            _ => return Err(StreamError::UnknownHandle(handle)),
        };

        let channels = active.spec.channels as usize;
        let want = *chunk_frames * channels;
        let bits = active.spec.bits_per_sample;
        let mut decoded: Vec<i16> = Vec::with_capacity(want);
        match active.spec.sample_format {
            SampleFormat::Int => {
                for s in active.reader.samples::<i32>().take(want) {
                    decoded.push(int_to_i16(s?, bits));
                }
            }
            SampleFormat::Float => {
                for s in active.reader.samples::<f32>().take(want) {
                    decoded.push(float_to_i16(s?));
                }
            }
        }
        if decoded.is_empty() {
            debug!("{}: end of stream", handle);
            return Ok(false);
        }

        let out: Vec<i16> = if *mono && channels > 1 {
            decoded
                .chunks(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    apply_gain(sum / frame.len() as i32, *gain)
                })
                .collect()
        } else {
            decoded.iter().map(|&s| apply_gain(s as i32, *gain)).collect()
        };
        sink.write(&out)?;

        active.pacer.add_frames(decoded.len().div_ceil(channels));
        if *realtime {
            active.pacer.wait();
        }
        Ok(true)
    }

    fn stop(&mut self, handle: StreamHandle) {
        if self.is_running(handle) {
            self.active = None;
            if let Err(e) = self.sink.finish() {
                warn!("{}: sink finish failed: {}", handle, e);
            }
            debug!("{} stopped", handle);
        }
    }
}
