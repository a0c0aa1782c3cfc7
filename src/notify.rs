/*
 *  notify.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Viewer fan-out: everybody watching gets told when the picture changes
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

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ViewerId(u64);

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewer#{}", self.0)
    }
}

/// The change token. Carries a sequence number so a viewer can tell it
/// missed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameChanged {
    pub sequence: u64,
}

pub type ViewerHandle = mpsc::UnboundedSender<FrameChanged>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    sequence: u64,
    viewers: BTreeMap<ViewerId, ViewerHandle>,
}

#[derive(Default)]
pub struct ViewerRegistry {
    inner: Mutex<Registry>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, handle: ViewerHandle) -> ViewerId {
        let mut reg = self.lock();
        reg.next_id += 1;
        let id = ViewerId(reg.next_id);
        reg.viewers.insert(id, handle);
        info!("{} connected ({} watching)", id, reg.viewers.len());
        id
    }

    /// Register a fresh channel and hand back its receiving end
    pub fn subscribe(&self) -> (ViewerId, mpsc::UnboundedReceiver<FrameChanged>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(tx), rx)
    }

    /// Returns false if `id` was already gone
    pub fn unregister(&self, id: ViewerId) -> bool {
        let mut reg = self.lock();
        let removed = reg.viewers.remove(&id).is_some();
        if removed {
            info!("{} disconnected ({} watching)", id, reg.viewers.len());
        }
        removed
    }

    /// Push one change token to every live viewer. Handles that fail are
    /// dropped; the rest still get theirs. Returns how many were delivered.
    pub fn notify_change(&self) -> usize {
        let mut reg = self.lock();
        reg.sequence += 1;
        let token = FrameChanged { sequence: reg.sequence };

        let mut dead = Vec::new();
        for (id, handle) in &reg.viewers {
            if handle.send(token).is_err() {
                dead.push(*id);
            }
        }
        for id in &dead {
            reg.viewers.remove(id);
            debug!("{} dropped after failed send", id);
        }
        reg.viewers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of change tokens issued so far
    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }
}
