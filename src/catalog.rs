/*
 *  catalog.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Image catalog: the ordered list of pictures on the card
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

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use log::info;
use serde::Serialize;

use crate::bus::{Bus, BusArbiter};
use crate::error::FrameError;
use crate::storage::MountMode;

/// One displayable image. Immutable; a rebuild produces new entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub ordinal: usize,
    pub name: Arc<str>,
}

/// Case-insensitive extension match against `extensions` (no dots)
pub fn is_eligible(name: &str, extensions: &[String]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

pub struct ImageCatalog {
    arbiter: Arc<BusArbiter>,
    extensions: Vec<String>,
    entries: RwLock<Arc<[CatalogEntry]>>,
}

impl ImageCatalog {
    pub fn new(arbiter: Arc<BusArbiter>, extensions: &[String]) -> Self {
        Self {
            arbiter,
            extensions: extensions.iter().map(|e| e.trim_start_matches('.').to_string()).collect(),
            entries: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Re-enumerate the card. Returns the new count.
    pub fn rebuild(&self) -> Result<usize, FrameError> {
        self.arbiter.with_exclusive_bus(|bus| self.rebuild_locked(bus))
    }

    /// Rebuild as part of a larger batch already holding the bus
    pub fn rebuild_locked(&self, bus: &mut Bus) -> Result<usize, FrameError> {
        if bus.storage.mode() == MountMode::Raw {
            return Err(FrameError::AudioActive);
        }
        bus.storage.mount_filesystem()?;
        let names = bus.storage.list_entries(|name| is_eligible(name, &self.extensions))?;

        let entries: Arc<[CatalogEntry]> = names
            .into_iter()
            .enumerate()
            .map(|(ordinal, name)| CatalogEntry { ordinal, name: Arc::from(name) })
            .collect();
        let count = entries.len();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;

        info!("catalog rebuilt: {} image(s)", count);
        Ok(count)
    }

    pub fn entry_at(&self, ordinal: usize) -> Result<CatalogEntry, FrameError> {
        let entries = self.snapshot();
        entries
            .get(ordinal)
            .cloned()
            .ok_or(FrameError::OutOfRange { ordinal, count: entries.len() })
    }

    pub fn count(&self) -> usize {
        self.snapshot().len()
    }

    /// The catalog as of the last rebuild
    pub fn snapshot(&self) -> Arc<[CatalogEntry]> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
