/*
 *  audio/mock.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Scripted streamer for session tests
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
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use super::{AudioStreamer, StreamError, StreamHandle};

#[derive(Debug, Default)]
pub struct ScriptedState {
    pub begun: usize,
    pub advances: usize,
    pub stopped: usize,
    /// Everything read from the card so far
    pub bytes: Vec<u8>,
    pub fail_begin: bool,
    /// Error out on this advance (1-based)
    pub fail_on_advance: Option<usize>,
    /// Panic on this advance (1-based)
    pub panic_on_advance: Option<usize>,
}

/// Reads the stream a few bytes per advance. With a gate, each advance first
/// waits for the test to send a unit, so tests can look around mid-stream.
pub struct ScriptedStreamer {
    state: Arc<Mutex<ScriptedState>>,
    gate: Option<mpsc::Receiver<()>>,
    stream: Option<Box<dyn Read + Send>>,
    chunk: usize,
}

impl ScriptedStreamer {
    pub fn new() -> Self {
        Self { state: Arc::default(), gate: None, stream: None, chunk: 4 }
    }

    /// Returns the sender that lets each advance proceed
    pub fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(rx);
        (self, tx)
    }

    pub fn state(&self) -> Arc<Mutex<ScriptedState>> {
        Arc::clone(&self.state)
    }
}

impl AudioStreamer for ScriptedStreamer {
    fn begin(&mut self, stream: Box<dyn Read + Send>) -> Result<StreamHandle, StreamError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_begin {
            return Err(StreamError::Unsupported("scripted".to_string()));
        }
        state.begun += 1;
        self.stream = Some(stream);
        Ok(StreamHandle(state.begun as u64))
    }

    fn is_running(&self, _handle: StreamHandle) -> bool {
        self.stream.is_some()
    }

    fn advance(&mut self, handle: StreamHandle) -> Result<bool, StreamError> {
        if let Some(gate) = &self.gate {
            // a dropped sender just lets everything through
            let _ = gate.recv();
        }
        let stream = self.stream.as_mut().ok_or(StreamError::UnknownHandle(handle))?;
        let advances = {
            let mut state = self.state.lock().unwrap();
            state.advances += 1;
            state.advances
        };
        let panic_now = self.state.lock().unwrap().panic_on_advance == Some(advances);
        if panic_now {
            panic!("scripted streamer panic on advance {}", advances);
        }
        if self.state.lock().unwrap().fail_on_advance == Some(advances) {
            return Err(StreamError::Unsupported("scripted failure".to_string()));
        }
        let mut buf = vec![0u8; self.chunk];
        let n = stream.read(&mut buf)?;
        self.state.lock().unwrap().bytes.extend_from_slice(&buf[..n]);
        Ok(n > 0)
    }

    fn stop(&mut self, _handle: StreamHandle) {
        self.stream = None;
        self.state.lock().unwrap().stopped += 1;
    }
}
