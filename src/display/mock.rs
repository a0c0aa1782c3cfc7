/*
 *  display/mock.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Recording painter for tests above the display layer
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

use std::collections::HashSet;
use std::io::Read;
use std::sync::{Arc, Mutex};

use crate::display::error::{DecodeError, DisplayError};
use crate::display::painter::Painter;

/// One thing that reached the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Painted {
    /// Stream contents, lossily as text (mock card files hold their own name)
    Image(String),
    Message(String),
}

#[derive(Debug, Default)]
pub struct MockDisplayState {
    pub painted: Vec<Painted>,
    /// Streams whose contents match one of these fail to decode
    pub reject: HashSet<String>,
    pub fail_messages: bool,
}

/// Painter that records instead of drawing.
#[derive(Debug, Clone, Default)]
pub struct MockDisplay {
    state: Arc<Mutex<MockDisplayState>>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<Mutex<MockDisplayState>> {
        Arc::clone(&self.state)
    }

    pub fn reject(&self, contents: &str) {
        self.state.lock().unwrap().reject.insert(contents.to_string());
    }

    pub fn painted(&self) -> Vec<Painted> {
        self.state.lock().unwrap().painted.clone()
    }

    /// Only the images, in paint order
    pub fn images(&self) -> Vec<String> {
        self.painted()
            .into_iter()
            .filter_map(|p| match p {
                Painted::Image(s) => Some(s),
                Painted::Message(_) => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.painted()
            .into_iter()
            .filter_map(|p| match p {
                Painted::Message(s) => Some(s),
                Painted::Image(_) => None,
            })
            .collect()
    }
}

impl Painter for MockDisplay {
    fn decode_and_paint(&mut self, stream: &mut dyn Read) -> Result<(), DecodeError> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        let contents = String::from_utf8_lossy(&bytes).into_owned();
        let mut state = self.state.lock().unwrap();
        if state.reject.contains(&contents) {
            return Err(DecodeError::NotJpeg);
        }
        state.painted.push(Painted::Image(contents));
        Ok(())
    }

    fn show_message(&mut self, text: &str) -> Result<(), DisplayError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_messages {
            return Err(DisplayError::FlushFailed("Simulated flush failure".to_string()));
        }
        state.painted.push(Painted::Message(text.to_string()));
        Ok(())
    }
}
