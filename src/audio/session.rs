/*
 *  audio/session.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Audio session: stop the slideshow, swap the card into raw mode, stream,
 *  swap back, resume. One session at a time.
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
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use super::{AudioStreamer, StreamError};
use crate::bus::{ArbitratedReader, Bus, BusArbiter};
use crate::error::FrameError;
use crate::slideshow::SlideshowController;
use crate::storage::MountMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPhase {
    Idle,
    StoppingSlideshow,
    SwitchingToRaw,
    Streaming,
    SwitchingBack,
    Error,
}

impl AudioPhase {
    /// A session owns the card in every phase but these two
    pub fn is_active(self) -> bool {
        !matches!(self, AudioPhase::Idle | AudioPhase::Error)
    }
}

impl fmt::Display for AudioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioPhase::Idle => write!(f, "idle"),
            AudioPhase::StoppingSlideshow => write!(f, "stopping slideshow"),
            AudioPhase::SwitchingToRaw => write!(f, "switching to raw"),
            AudioPhase::Streaming => write!(f, "streaming"),
            AudioPhase::SwitchingBack => write!(f, "switching back"),
            AudioPhase::Error => write!(f, "error"),
        }
    }
}

/// A running playback episode. Dropping it detaches the worker.
pub struct AudioSession {
    worker: JoinHandle<Result<(), FrameError>>,
}

impl AudioSession {
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Block until the card is back in filesystem mode
    pub fn wait(self) -> Result<(), FrameError> {
        self.worker
            .join()
            .unwrap_or(Err(FrameError::Stream(StreamError::WorkerPanicked)))
    }
}

pub struct AudioSessionManager {
    arbiter: Arc<BusArbiter>,
    slideshow: Arc<SlideshowController>,
    streamer: Mutex<Box<dyn AudioStreamer>>,
    asset: String,
    phase_tx: watch::Sender<AudioPhase>,
    last_error: Mutex<Option<String>>,
}

impl AudioSessionManager {
    pub fn new(
        arbiter: Arc<BusArbiter>,
        slideshow: Arc<SlideshowController>,
        streamer: Box<dyn AudioStreamer>,
        asset: impl Into<String>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(AudioPhase::Idle);
        Self {
            arbiter,
            slideshow,
            streamer: Mutex::new(streamer),
            asset: asset.into(),
            phase_tx,
            last_error: Mutex::new(None),
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn phase(&self) -> AudioPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<AudioPhase> {
        self.phase_tx.subscribe()
    }

    /// Why the last session ended in `Error`, if it did
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_phase(&self, phase: AudioPhase) {
        let previous = self.phase_tx.send_replace(phase);
        if previous != phase {
            info!("audio: {} -> {}", previous, phase);
        }
    }

    fn fail(&self, err: &FrameError) {
        error!("audio session failed: {}", err);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
        self.set_phase(AudioPhase::Error);
    }

    fn streamer(&self) -> MutexGuard<'_, Box<dyn AudioStreamer>> {
        self.streamer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start playback. The slideshow stop and the switch to raw mode happen in
    /// one bus hold; streaming continues on a worker thread.
    pub fn request_play(self: &Arc<Self>) -> Result<AudioSession, FrameError> {
        let stream = self.arbiter.with_exclusive_bus(|bus| self.switch_to_raw_locked(bus))?;

        let reader = ArbitratedReader::new(Arc::clone(&self.arbiter), stream);
        let manager = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("audio".to_string())
            .spawn(move || manager.run(reader));
        match spawned {
            Ok(worker) => Ok(AudioSession { worker }),
            Err(e) => {
                let err = FrameError::Stream(StreamError::Io(e));
                self.switch_back(None)?;
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn switch_to_raw_locked(&self, bus: &mut Bus) -> Result<Box<dyn Read + Send>, FrameError> {
        let phase = self.phase();
        if phase.is_active() {
            warn!("play request refused, session is {}", phase);
            return Err(FrameError::SessionBusy(phase));
        }
        if phase == AudioPhase::Error {
            info!("retrying audio after: {}", self.last_error().unwrap_or_default());
        }

        self.set_phase(AudioPhase::StoppingSlideshow);
        self.slideshow.stop_locked();

        self.set_phase(AudioPhase::SwitchingToRaw);
        let opened = bus
            .storage
            .switch_to(MountMode::Raw)
            .and_then(|_| bus.storage.open_sequential(&self.asset));
        match opened {
            Ok(stream) => {
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
                Ok(stream)
            }
            Err(e) => {
                let err = FrameError::from(e);
                // put the card back the way the slideshow needs it
                if let Err(back) = self.restore_locked(bus) {
                    warn!("could not restore filesystem mode: {}", back);
                }
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn run(&self, reader: ArbitratedReader) -> Result<(), FrameError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.stream_to_end(reader))) {
            Ok(streamed) => {
                if let Err(e) = &streamed {
                    warn!("audio stream ended early: {}", e);
                }
                self.switch_back(Some(streamed))
            }
            Err(_) => {
                // the card is still in raw mode; take it back before reporting
                let err = FrameError::Stream(StreamError::WorkerPanicked);
                self.switch_back(None)?;
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn stream_to_end(&self, reader: ArbitratedReader) -> Result<u64, StreamError> {
        let mut streamer = self.streamer();
        let handle = streamer.begin(Box::new(reader))?;
        self.set_phase(AudioPhase::Streaming);

        let mut chunks = 0u64;
        let outcome = loop {
            if !streamer.is_running(handle) {
                break Ok(chunks);
            }
            match streamer.advance(handle) {
                Ok(true) => chunks += 1,
                Ok(false) => break Ok(chunks),
                Err(e) => break Err(e),
            }
        };
        streamer.stop(handle);
        outcome
    }

    /// Raw mode back to filesystem mode, then resume. A failed remount leaves
    /// the slideshow stopped and the session in `Error`.
    fn switch_back(&self, streamed: Option<Result<u64, StreamError>>) -> Result<(), FrameError> {
        self.set_phase(AudioPhase::SwitchingBack);
        let restored = self.arbiter.with_exclusive_bus(|bus| self.restore_locked(bus));
        if let Err(e) = restored {
            self.fail(&e);
            return Err(e);
        }
        self.set_phase(AudioPhase::Idle);
        match streamed {
            Some(Ok(chunks)) => {
                info!("audio finished after {} chunk(s)", chunks);
                Ok(())
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn restore_locked(&self, bus: &mut Bus) -> Result<(), FrameError> {
        bus.storage.switch_to(MountMode::Filesystem)?;
        if let Err(e) = self.slideshow.resume_locked(bus) {
            // the slideshow is running again; a bad image is its own problem
            warn!("slideshow resume: {}", e);
        }
        Ok(())
    }
}
