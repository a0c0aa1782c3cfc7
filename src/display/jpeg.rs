/*
 *  display/jpeg.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  JPEG marker walk: find the frame header and the image size
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

use crate::display::error::DecodeError;

const SOI: u8 = 0xD8;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegInfo {
    pub width: u16,
    pub height: u16,
    pub progressive: bool,
}

/// SOF0..SOF15 minus DHT (C4), JPG (C8) and DAC (CC)
fn is_frame_header(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Markers with no length field
fn is_standalone(marker: u8) -> bool {
    marker == 0x01 || (0xD0..=0xD7).contains(&marker)
}

fn be16(data: &[u8], at: usize) -> Result<u16, DecodeError> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DecodeError::Truncated)
}

/// Walk the marker segments up to the first frame header.
pub fn read_header(data: &[u8]) -> Result<JpegInfo, DecodeError> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
        return Err(DecodeError::NotJpeg);
    }

    let mut pos = 2;
    loop {
        // skip to the next marker, tolerating fill bytes
        while pos < data.len() && data[pos] != 0xFF {
            pos += 1;
        }
        while pos < data.len() && data[pos] == 0xFF {
            pos += 1;
        }
        let marker = *data.get(pos).ok_or(DecodeError::Truncated)?;
        pos += 1;

        if is_standalone(marker) {
            continue;
        }
        if marker == SOS || marker == EOI {
            return Err(DecodeError::MissingFrameHeader);
        }

        let len = be16(data, pos)? as usize;
        if len < 2 {
            return Err(DecodeError::Truncated);
        }

        if is_frame_header(marker) {
            // length(2) precision(1) height(2) width(2)
            let height = be16(data, pos + 3)?;
            let width = be16(data, pos + 5)?;
            if width == 0 || height == 0 {
                return Err(DecodeError::InvalidDimensions { width, height });
            }
            return Ok(JpegInfo { width, height, progressive: marker == 0xC2 });
        }

        pos += len;
        if pos > data.len() {
            return Err(DecodeError::Truncated);
        }
    }
}

/// Minimal baseline JPEG header used by tests across the crate
#[cfg(test)]
pub fn test_jpeg(width: u16, height: u16) -> Vec<u8> {
    let mut v = vec![0xFF, SOI];
    // APP0 JFIF
    v.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0]);
    // SOF0, one component
    v.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
    v.extend_from_slice(&height.to_be_bytes());
    v.extend_from_slice(&width.to_be_bytes());
    v.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);
    v.extend_from_slice(&[0xFF, EOI]);
    v
}
