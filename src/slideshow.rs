/*
 *  slideshow.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Slideshow controller: cursor, phase and timing. Every load happens under
 *  the bus arbiter; slideshow state is only changed from inside it.
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
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::bus::{Bus, BusArbiter};
use crate::catalog::{CatalogEntry, ImageCatalog};
use crate::error::FrameError;
use crate::notify::ViewerRegistry;

pub const NO_IMAGES_MESSAGE: &str = "No .JPG images found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideshowPhase {
    Stopped,
    RunningIdle,
    RunningLoading,
}

impl fmt::Display for SlideshowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlideshowPhase::Stopped => write!(f, "stopped"),
            SlideshowPhase::RunningIdle => write!(f, "running"),
            SlideshowPhase::RunningLoading => write!(f, "loading"),
        }
    }
}

/// What an advance request came to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Image decoded and on the panel
    Shown(CatalogEntry),
    /// Slideshow stopped, request dropped
    Dropped,
    /// Empty catalog, "no images" on the panel
    NoImages,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Next,
    To(usize),
}

struct SlideState {
    phase: SlideshowPhase,
    current: usize,
    interval: Duration,
    showing_no_images: bool,
    last_advance: Option<DateTime<Local>>,
}

pub struct SlideshowController {
    arbiter: Arc<BusArbiter>,
    catalog: Arc<ImageCatalog>,
    viewers: Arc<ViewerRegistry>,
    // lock order is always bus then state
    state: Mutex<SlideState>,
    displayed_tx: watch::Sender<Option<Arc<str>>>,
    phase_tx: watch::Sender<SlideshowPhase>,
}

impl SlideshowController {
    pub fn new(
        arbiter: Arc<BusArbiter>,
        catalog: Arc<ImageCatalog>,
        viewers: Arc<ViewerRegistry>,
        interval: Duration,
    ) -> Self {
        let (displayed_tx, _) = watch::channel(None);
        let (phase_tx, _) = watch::channel(SlideshowPhase::Stopped);
        Self {
            arbiter,
            catalog,
            viewers,
            state: Mutex::new(SlideState {
                phase: SlideshowPhase::Stopped,
                current: 0,
                interval,
                showing_no_images: false,
                last_advance: None,
            }),
            displayed_tx,
            phase_tx,
        }
    }

    fn state(&self) -> MutexGuard<'_, SlideState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SlideshowPhase) {
        let previous = std::mem::replace(&mut self.state().phase, phase);
        if previous != phase {
            debug!("slideshow {} -> {}", previous, phase);
            self.phase_tx.send_replace(phase);
        }
    }

    pub fn phase(&self) -> SlideshowPhase {
        *self.phase_tx.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SlideshowPhase> {
        self.phase_tx.subscribe()
    }

    pub fn current(&self) -> usize {
        self.state().current
    }

    /// Name of the image on the panel, readable without the arbiter
    pub fn displayed(&self) -> Option<Arc<str>> {
        self.displayed_tx.borrow().clone()
    }

    pub fn subscribe_displayed(&self) -> watch::Receiver<Option<Arc<str>>> {
        self.displayed_tx.subscribe()
    }

    pub fn interval(&self) -> Duration {
        self.state().interval
    }

    pub fn set_interval(&self, secs: u64) -> Result<(), FrameError> {
        if secs < 1 {
            return Err(FrameError::InvalidInterval(secs));
        }
        self.state().interval = Duration::from_secs(secs);
        info!("slideshow interval set to {}s", secs);
        Ok(())
    }

    pub fn last_advance(&self) -> Option<DateTime<Local>> {
        self.state().last_advance
    }

    /// Running but parked on the "no images" screen; the timer has nothing
    /// to do until a rebuild finds something
    pub fn timer_suspended(&self) -> bool {
        let st = self.state();
        st.phase != SlideshowPhase::Stopped && st.showing_no_images
    }

    pub fn advance(&self) -> Result<Advance, FrameError> {
        self.arbiter.with_exclusive_bus(|bus| self.load_locked(bus, Step::Next))
    }

    /// Forced jump to an explicit ordinal
    pub fn jump_to(&self, ordinal: usize) -> Result<Advance, FrameError> {
        self.arbiter.with_exclusive_bus(|bus| self.load_locked(bus, Step::To(ordinal)))
    }

    /// Stopped -> running. Repaints the current image (or the "no images"
    /// message) so the panel reflects the slideshow again.
    pub fn resume(&self) -> Result<Advance, FrameError> {
        self.arbiter.with_exclusive_bus(|bus| self.resume_locked(bus))
    }

    pub fn resume_locked(&self, bus: &mut Bus) -> Result<Advance, FrameError> {
        let current = {
            let mut st = self.state();
            if st.phase == SlideshowPhase::Stopped {
                info!("slideshow resumed at {}", st.current);
            }
            st.phase = SlideshowPhase::RunningIdle;
            // force the repaint
            st.showing_no_images = false;
            st.current
        };
        self.phase_tx.send_replace(SlideshowPhase::RunningIdle);

        let count = self.catalog.count();
        if count == 0 {
            return self.show_no_images(bus);
        }
        self.load_locked(bus, Step::To(current % count))
    }

    /// Waits for any in-flight load, since that load holds the bus
    pub fn stop(&self) -> Result<(), FrameError> {
        self.arbiter.with_exclusive_bus(|_bus| {
            self.stop_locked();
            Ok(())
        })
    }

    pub fn stop_locked(&self) {
        if self.phase() != SlideshowPhase::Stopped {
            info!("slideshow stopped at {}", self.current());
        }
        self.set_phase(SlideshowPhase::Stopped);
    }

    /// After a rebuild ordinals may have shifted; start over from the top
    pub fn rewind_locked(&self, _bus: &mut Bus) {
        self.state().current = 0;
    }

    /// Nothing from the catalog is on the panel any more
    pub fn blank_locked(&self, _bus: &mut Bus) {
        if self.displayed_tx.send_replace(None).is_some() {
            debug!("displayed image cleared");
        }
    }

    fn show_no_images(&self, bus: &mut Bus) -> Result<Advance, FrameError> {
        self.blank_locked(bus);
        let already = std::mem::replace(&mut self.state().showing_no_images, true);
        if !already {
            warn!("{}", NO_IMAGES_MESSAGE);
            if let Err(e) = bus.painter.show_message(NO_IMAGES_MESSAGE) {
                self.state().showing_no_images = false;
                return Err(e.into());
            }
        }
        Ok(Advance::NoImages)
    }

    fn load_locked(&self, bus: &mut Bus, step: Step) -> Result<Advance, FrameError> {
        let current = {
            let st = self.state();
            if st.phase == SlideshowPhase::Stopped {
                debug!("slideshow stopped, dropping {:?}", step);
                return Ok(Advance::Dropped);
            }
            st.current
        };

        let count = self.catalog.count();
        if count == 0 {
            return self.show_no_images(bus);
        }
        let next = match step {
            Step::Next => (current + 1) % count,
            Step::To(ordinal) => ordinal,
        };
        let entry = self.catalog.entry_at(next)?;

        self.set_phase(SlideshowPhase::RunningLoading);
        let started = Instant::now();
        let painted = bus
            .storage
            .open_for_read(&entry.name)
            .map_err(FrameError::from)
            .and_then(|mut stream| bus.painter.decode_and_paint(&mut *stream).map_err(FrameError::from));

        {
            let mut st = self.state();
            // the cursor moves even on failure so the next tick skips ahead
            st.current = next;
            st.showing_no_images = false;
            if painted.is_ok() {
                st.last_advance = Some(Local::now());
            }
        }
        self.set_phase(SlideshowPhase::RunningIdle);

        match painted {
            Ok(()) => {
                debug!("showing {} [{}/{}] in {:?}", entry.name, next + 1, count, started.elapsed());
                self.displayed_tx.send_replace(Some(Arc::clone(&entry.name)));
                // still under the bus, so tokens go out in completion order
                self.viewers.notify_change();
                Ok(Advance::Shown(entry))
            }
            Err(e) => {
                warn!("skipping {}: {}", entry.name, e);
                Err(e)
            }
        }
    }
}

/// Interval timer for the slideshow loop. Checked on a short poll; however
/// many intervals went by, one check yields at most one advance.
#[derive(Debug, Clone)]
pub struct Ticker {
    last: Instant,
}

impl Ticker {
    pub fn new(now: Instant) -> Self {
        Self { last: now }
    }

    /// True once `interval` has passed since the last reset; resets itself
    pub fn due(&mut self, now: Instant, interval: Duration) -> bool {
        if now.saturating_duration_since(self.last) >= interval {
            self.last = now;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }
}
