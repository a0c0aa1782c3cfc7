/*
 *  display/traits.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for the panel driver
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

use crate::display::error::DisplayError;
use crate::display::framebuffer::Screen;

/// Display capabilities and metadata
#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    /// Native panel width in pixels
    pub width: u32,

    /// Native panel height in pixels
    pub height: u32,

    /// Whether the panel controller can rotate in hardware
    pub supports_rotation: bool,
}

/// Minimal hardware abstraction for the panel that shares the card's bus.
///
/// Pixel pushing belongs to the concrete driver; everything above it draws
/// into a [`Screen`] and hands the finished frame over with `flush`.
pub trait DisplayDriver: Send {
    /// Returns the capabilities of this display
    fn capabilities(&self) -> &DisplayCapabilities;

    /// Returns the drawable dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Initialize the display hardware
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Transfer a full frame to the panel
    fn flush(&mut self, frame: &Screen) -> Result<(), DisplayError>;

    /// Set display rotation (if supported)
    ///
    /// Rotation angle should be 0, 90, 180, or 270 degrees.
    fn set_rotation(&mut self, degrees: u16) -> Result<(), DisplayError> {
        if !matches!(degrees, 0 | 90 | 180 | 270) {
            return Err(DisplayError::InvalidRotation(degrees));
        }
        if degrees != 0 && !self.capabilities().supports_rotation {
            return Err(DisplayError::InitializationFailed(
                "panel does not support rotation".to_string(),
            ));
        }
        Ok(())
    }
}
