/*
 *  display/drivers/mock.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock panel driver for testing without hardware
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

use embedded_graphics::pixelcolor::Rgb565;

use crate::display::error::DisplayError;
use crate::display::framebuffer::Screen;
use crate::display::traits::{DisplayCapabilities, DisplayDriver};

use std::sync::{Arc, Mutex};

/// Mock panel driver
///
/// Records every operation and keeps a copy of the last flushed frame so
/// tests can check what actually reached the glass.
#[derive(Debug, Clone)]
pub struct MockDriver {
    capabilities: DisplayCapabilities,
    state: Arc<Mutex<MockDriverState>>,
}

/// Shared state for inspection in tests
#[derive(Debug, Default)]
pub struct MockDriverState {
    /// Number of times init() was called
    pub init_count: usize,

    /// Number of successful flushes
    pub flush_count: usize,

    /// Last rotation set
    pub last_rotation: Option<u16>,

    /// Whether the driver is initialized
    pub is_initialized: bool,

    /// Frame as of the last successful flush
    pub last_frame: Option<Vec<Rgb565>>,

    /// Simulate failures (for error testing)
    pub simulate_flush_failure: bool,
    pub simulate_init_failure: bool,
}

impl MockDriver {
    pub fn new_with_size(width: u32, height: u32) -> Self {
        Self {
            capabilities: DisplayCapabilities { width, height, supports_rotation: true },
            state: Arc::new(Mutex::new(MockDriverState::default())),
        }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }
}

impl DisplayDriver for MockDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.state.lock().unwrap();
        if state.simulate_init_failure {
            return Err(DisplayError::InitializationFailed("Simulated init failure".to_string()));
        }
        state.init_count += 1;
        state.is_initialized = true;
        Ok(())
    }

    fn flush(&mut self, frame: &Screen) -> Result<(), DisplayError> {
        let expected = (self.capabilities.width * self.capabilities.height) as usize;
        if frame.as_slice().len() != expected {
            return Err(DisplayError::BufferSizeMismatch { expected, actual: frame.as_slice().len() });
        }
        let mut state = self.state.lock().unwrap();
        if state.simulate_flush_failure {
            return Err(DisplayError::FlushFailed("Simulated flush failure".to_string()));
        }
        state.flush_count += 1;
        state.last_frame = Some(frame.as_slice().to_vec());
        Ok(())
    }

    fn set_rotation(&mut self, degrees: u16) -> Result<(), DisplayError> {
        if !matches!(degrees, 0 | 90 | 180 | 270) {
            return Err(DisplayError::InvalidRotation(degrees));
        }
        self.state.lock().unwrap().last_rotation = Some(degrees);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::RgbColor;

    #[test]
    fn test_mock_driver_init() {
        let mut driver = MockDriver::new_with_size(320, 240);
        let state = driver.state();
        assert!(!state.lock().unwrap().is_initialized);

        driver.init().unwrap();

        assert_eq!(state.lock().unwrap().init_count, 1);
        assert!(state.lock().unwrap().is_initialized);
    }

    #[test]
    fn test_mock_driver_flush_records_frame() {
        let mut driver = MockDriver::new_with_size(4, 2);
        driver.flush(&Screen::new(4, 2, Rgb565::RED)).unwrap();
        let state = driver.state();
        let state = state.lock().unwrap();
        assert_eq!(state.flush_count, 1);
        assert_eq!(state.last_frame.as_deref(), Some(&[Rgb565::RED; 8][..]));
    }

    #[test]
    fn test_mock_driver_size_mismatch() {
        let mut driver = MockDriver::new_with_size(4, 2);
        let err = driver.flush(&Screen::new(2, 2, Rgb565::BLACK)).unwrap_err();
        assert!(matches!(err, DisplayError::BufferSizeMismatch { expected: 8, actual: 4 }));
    }

    #[test]
    fn test_mock_driver_rotation() {
        let mut driver = MockDriver::new_with_size(320, 240);
        driver.set_rotation(90).unwrap();
        assert_eq!(driver.state().lock().unwrap().last_rotation, Some(90));
        assert!(driver.set_rotation(45).is_err());
    }
}
