/*
 *  audio/pacer.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Keeps output in step with the sample clock so a chunked decode does not
 *  run ahead of the speaker
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
use std::thread;
use std::time::{Duration, Instant};

pub struct Pacer {
    started: Instant,
    sample_rate: u32,
    frames: u64,
}

impl Pacer {
    pub fn new(sample_rate: u32, now: Instant) -> Self {
        Self { started: now, sample_rate: sample_rate.max(1), frames: 0 }
    }

    #[inline]
    pub fn add_frames(&mut self, frames: usize) {
        self.frames += frames as u64;
    }

    /// When everything handed over so far will have been played
    #[inline]
    pub fn deadline(&self) -> Instant {
        let micros = self.frames * 1_000_000 / self.sample_rate as u64;
        self.started + Duration::from_micros(micros)
    }

    /// How far output is ahead of the clock at `now`
    #[inline]
    pub fn ahead_by(&self, now: Instant) -> Duration {
        self.deadline().saturating_duration_since(now)
    }

    /// Sleep until the clock catches up
    pub fn wait(&self) {
        let ahead = self.ahead_by(Instant::now());
        if !ahead.is_zero() {
            thread::sleep(ahead);
        }
    }
}
