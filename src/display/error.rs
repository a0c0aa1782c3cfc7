/*
 *  display/error.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error types for the panel and the image painter
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

use std::error::Error;
use std::fmt;
use std::io;

/// Panel level failures
#[derive(Debug)]
pub enum DisplayError {
    /// Hardware initialization failed
    InitializationFailed(String),

    /// Panel transfer failed
    FlushFailed(String),

    /// Invalid rotation angle
    InvalidRotation(u16),

    /// Framebuffer size mismatch
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Drawing operation failed
    DrawingError(String),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::InitializationFailed(msg) =>
                write!(f, "Display initialization failed: {}", msg),
            DisplayError::FlushFailed(msg) =>
                write!(f, "Display flush failed: {}", msg),
            DisplayError::InvalidRotation(degrees) =>
                write!(f, "Invalid rotation angle: {} (must be 0, 90, 180, or 270)", degrees),
            DisplayError::BufferSizeMismatch { expected, actual } =>
                write!(f, "Buffer size mismatch: expected {} pixels, got {}", expected, actual),
            DisplayError::DrawingError(msg) =>
                write!(f, "Drawing error: {}", msg),
        }
    }
}

impl Error for DisplayError {}

/// Why an image could not be put on the panel
#[derive(Debug)]
pub enum DecodeError {
    /// Stream does not start with a JPEG SOI marker
    NotJpeg,

    /// Stream ended inside a marker segment
    Truncated,

    /// Scan data reached before any frame header
    MissingFrameHeader,

    /// Frame header declares a zero dimension
    InvalidDimensions { width: u16, height: u16 },

    /// Larger than the painter will buffer
    TooLarge(usize),

    /// Reading the stream failed
    Io(io::Error),

    /// Panel refused the frame
    Display(DisplayError),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotJpeg => write!(f, "not a JPEG stream"),
            DecodeError::Truncated => write!(f, "JPEG stream truncated"),
            DecodeError::MissingFrameHeader => write!(f, "JPEG stream has no frame header"),
            DecodeError::InvalidDimensions { width, height } =>
                write!(f, "JPEG frame header declares {}x{}", width, height),
            DecodeError::TooLarge(limit) =>
                write!(f, "image exceeds the {} byte decode buffer", limit),
            DecodeError::Io(err) => write!(f, "image read failed: {}", err),
            DecodeError::Display(err) => write!(f, "{}", err),
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DecodeError::Io(err) => Some(err),
            DecodeError::Display(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        DecodeError::Io(err)
    }
}

impl From<DisplayError> for DecodeError {
    fn from(err: DisplayError) -> Self {
        DecodeError::Display(err)
    }
}
