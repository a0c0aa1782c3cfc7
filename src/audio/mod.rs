/*
 *  audio/mod.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Audio playback: the streaming collaborator and the session that swaps
 *  the card into raw mode around it
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

use std::fmt;
use std::io::{self, Read};

use thiserror::Error;

pub mod pacer;
pub mod session;
pub mod sink;
pub mod wav;

#[cfg(test)]
pub mod mock;

pub use session::{AudioPhase, AudioSession, AudioSessionManager};
pub use sink::{NullSink, PcmSink};
pub use wav::WavStreamer;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),

    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("no active stream for {0}")]
    UnknownHandle(StreamHandle),

    #[error("i/o: {0}")]
    Io(#[from] io::Error),

    #[error("audio worker panicked")]
    WorkerPanicked,
}

/// Identifies one begun stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle(pub u64);

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Sample decode and output. The session hands it an open byte stream and
/// drives it with `advance` until it reports completion.
pub trait AudioStreamer: Send {
    fn begin(&mut self, stream: Box<dyn Read + Send>) -> Result<StreamHandle, StreamError>;

    fn is_running(&self, handle: StreamHandle) -> bool;

    /// Decode and output the next chunk. `Ok(false)` once the stream is done.
    fn advance(&mut self, handle: StreamHandle) -> Result<bool, StreamError>;

    fn stop(&mut self, handle: StreamHandle);
}

/// Where decoded 16-bit PCM ends up
pub trait AudioSink: Send {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<(), StreamError>;

    /// Interleaved samples
    fn write(&mut self, samples: &[i16]) -> Result<(), StreamError>;

    fn finish(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}
