/*
 *  lib.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Photo frame core: one storage card and one panel on a shared bus, a
 *  slideshow over the card's images and an audio session that borrows the
 *  card in raw mode
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

pub mod audio;
pub mod bus;
pub mod catalog;
pub mod config;
pub mod display;
pub mod error;
pub mod frame;
pub mod notify;
pub mod runner;
pub mod slideshow;
pub mod storage;

pub use bus::{Bus, BusArbiter};
pub use error::FrameError;
pub use frame::{DeleteReport, FrameSettings, FrameStatus, PhotoFrame, UploadOutcome};
pub use runner::{run_slideshow_loop, LoopEvent};
pub use slideshow::{Advance, SlideshowPhase};
pub use storage::{MountMode, StorageError};
