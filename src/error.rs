/*
 *  error.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Crate level error: what a control request or the slideshow loop can
 *  run into
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

use thiserror::Error;

use crate::audio::session::AudioPhase;
use crate::audio::StreamError;
use crate::bus::BusError;
use crate::display::error::{DecodeError, DisplayError};
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Display(#[from] DisplayError),

    #[error("audio stream: {0}")]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// Escaped the wrap-around guard
    #[error("ordinal {ordinal} out of range, catalog holds {count}")]
    OutOfRange { ordinal: usize, count: usize },

    #[error("audio session already active ({0})")]
    SessionBusy(AudioPhase),

    /// The card is switched over to audio playback
    #[error("card is busy with audio playback")]
    AudioActive,

    #[error("slideshow interval must be at least 1 second, got {0}")]
    InvalidInterval(u64),
}

impl FrameError {
    /// Card absent or failed to initialize
    pub fn is_mount_failure(&self) -> bool {
        matches!(self, FrameError::Storage(StorageError::Mount(_)))
    }
}
