/*
 *  bus.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  The bus arbiter: card and panel share one SPI bus, so every touch of
 *  either goes through a single blocking, non-reentrant gate
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

use std::cell::Cell;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;
use thiserror::Error;

use crate::display::painter::Painter;
use crate::storage::{MountMode, StorageAdapter};

/// Everything that sits on the shared bus. Only reachable through
/// [`BusArbiter::with_exclusive_bus`].
pub struct Bus {
    pub storage: StorageAdapter,
    pub painter: Box<dyn Painter>,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus arbiter re-entered while already held on this thread")]
    Reentrant,
}

impl From<BusError> for io::Error {
    fn from(err: BusError) -> Self {
        io::Error::new(io::ErrorKind::WouldBlock, err)
    }
}

thread_local! {
    // address of the arbiter this thread holds, 0 when none
    static HELD: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as holder for the lifetime of the lock guard.
struct HoldMarker;

impl HoldMarker {
    fn enter(owner: usize) -> Result<Self, BusError> {
        HELD.with(|held| {
            if held.get() != 0 {
                return Err(BusError::Reentrant);
            }
            held.set(owner);
            Ok(HoldMarker)
        })
    }
}

impl Drop for HoldMarker {
    fn drop(&mut self) {
        HELD.with(|held| held.set(0));
    }
}

pub struct BusArbiter {
    bus: Mutex<Bus>,
}

impl BusArbiter {
    pub fn new(bus: Bus) -> Self {
        Self { bus: Mutex::new(bus) }
    }

    /// True if the calling thread is inside `with_exclusive_bus`
    pub fn held_by_current_thread() -> bool {
        HELD.with(|held| held.get() != 0)
    }

    fn lock(&self) -> MutexGuard<'_, Bus> {
        // a panic inside an operation must not brick the card for everyone else
        self.bus.lock().unwrap_or_else(|poisoned| {
            warn!("bus arbiter recovered from a panicked holder");
            poisoned.into_inner()
        })
    }

    /// Run `op` with sole access to the bus. Blocks until the bus is free and
    /// releases it on every exit path. Holding any arbiter while asking again
    /// is refused rather than deadlocking.
    pub fn with_exclusive_bus<R, E, F>(&self, op: F) -> Result<R, E>
    where
        F: FnOnce(&mut Bus) -> Result<R, E>,
        E: From<BusError>,
    {
        let _marker = HoldMarker::enter(self as *const Self as usize)?;
        let mut bus = self.lock();
        op(&mut bus)
    }
}

/// Raw-mode byte stream whose every read takes the bus, so playback
/// interleaves with nothing else mid-transfer and never holds the gate
/// between chunks.
pub struct ArbitratedReader {
    arbiter: Arc<BusArbiter>,
    inner: Box<dyn Read + Send>,
}

impl ArbitratedReader {
    pub fn new(arbiter: Arc<BusArbiter>, inner: Box<dyn Read + Send>) -> Self {
        Self { arbiter, inner }
    }
}

impl Read for ArbitratedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.arbiter.with_exclusive_bus(|bus| {
            if bus.storage.mode() != MountMode::Raw {
                return Err(io::Error::other(format!("card left raw mode ({})", bus.storage.mode())));
            }
            inner.read(buf)
        })
    }
}
