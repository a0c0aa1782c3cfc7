/*
 *  display/painter.rs
 *
 *  photoframe - one card, one bus, many hands
 *  (c) 2020-26 Stuart Hunter
 *
 *  Decode/display collaborator: places images and status messages on the
 *  panel. Runs only while the bus arbiter is held.
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

use std::io::Read;

use embedded_graphics::mono_font::{ascii::FONT_10X20, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyleBuilder, Rectangle, StrokeAlignment};
use embedded_text::alignment::{HorizontalAlignment, VerticalAlignment};
use embedded_text::style::TextBoxStyleBuilder;
use embedded_text::TextBox;
use log::debug;

use crate::display::error::{DecodeError, DisplayError};
use crate::display::framebuffer::Screen;
use crate::display::jpeg::{self, JpegInfo};
use crate::display::traits::DisplayDriver;

/// Largest JPEG the painter will buffer
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

const IMAGE_AREA: Rgb565 = Rgb565::new(6, 12, 6);
const IMAGE_EDGE: Rgb565 = Rgb565::new(12, 24, 12);

/// What the slideshow and the control paths need from the display side.
pub trait Painter: Send {
    /// Consume a JPEG byte stream and put the image on the panel
    fn decode_and_paint(&mut self, stream: &mut dyn Read) -> Result<(), DecodeError>;

    /// Full screen status text ("No .JPG images found", connection info, ...)
    fn show_message(&mut self, text: &str) -> Result<(), DisplayError>;
}

/// Painter over a concrete panel driver.
///
/// The JPEG is read in full, its frame header located, the panel cleared to
/// black and the image area laid out centered, which is where the codec
/// blits its MCU rows.
pub struct PanelPainter<D: DisplayDriver> {
    driver: D,
    screen: Screen,
    scratch: Vec<u8>,
}

impl<D: DisplayDriver> PanelPainter<D> {
    pub fn new(mut driver: D) -> Result<Self, DisplayError> {
        driver.init()?;
        let (width, height) = driver.dimensions();
        Ok(Self {
            driver,
            screen: Screen::new(width, height, Rgb565::BLACK),
            scratch: Vec::new(),
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Top-left corner that centers `info` on the panel; negative when the
    /// image is larger than the panel
    pub fn placement(&self, info: &JpegInfo) -> Point {
        let (w, h) = (self.screen.width() as i32, self.screen.height() as i32);
        Point::new((w - info.width as i32) / 2, (h - info.height as i32) / 2)
    }

    fn read_limited(&mut self, stream: &mut dyn Read) -> Result<(), DecodeError> {
        self.scratch.clear();
        let read = stream
            .take(MAX_IMAGE_BYTES as u64 + 1)
            .read_to_end(&mut self.scratch)?;
        if read > MAX_IMAGE_BYTES {
            return Err(DecodeError::TooLarge(MAX_IMAGE_BYTES));
        }
        Ok(())
    }
}

impl<D: DisplayDriver> Painter for PanelPainter<D> {
    fn decode_and_paint(&mut self, stream: &mut dyn Read) -> Result<(), DecodeError> {
        self.read_limited(stream)?;
        let info = jpeg::read_header(&self.scratch)?;
        let origin = self.placement(&info);
        debug!("painting {}x{} jpeg at {:?}", info.width, info.height, origin);

        self.screen
            .clear(Rgb565::BLACK)
            .map_err(|_| DisplayError::DrawingError("clear failed".to_string()))?;
        let style = PrimitiveStyleBuilder::new()
            .fill_color(IMAGE_AREA)
            .stroke_color(IMAGE_EDGE)
            .stroke_width(1)
            .stroke_alignment(StrokeAlignment::Inside)
            .build();
        Rectangle::new(origin, Size::new(info.width as u32, info.height as u32))
            .into_styled(style)
            .draw(&mut self.screen)
            .map_err(|_| DisplayError::DrawingError("image area".to_string()))?;

        self.driver.flush(&self.screen)?;
        Ok(())
    }

    fn show_message(&mut self, text: &str) -> Result<(), DisplayError> {
        self.screen
            .clear(Rgb565::BLACK)
            .map_err(|_| DisplayError::DrawingError("clear failed".to_string()))?;

        let (w, h) = (self.screen.width() as u32, self.screen.height() as u32);
        let bounds = Rectangle::new(Point::new(10, 10), Size::new(w.saturating_sub(20), h.saturating_sub(20)));
        let character_style = MonoTextStyle::new(&FONT_10X20, Rgb565::WHITE);
        let textbox_style = TextBoxStyleBuilder::new()
            .alignment(HorizontalAlignment::Center)
            .vertical_alignment(VerticalAlignment::Middle)
            .build();
        TextBox::with_textbox_style(text, bounds, character_style, textbox_style)
            .draw(&mut self.screen)
            .map_err(|_| DisplayError::DrawingError("message text".to_string()))?;

        self.driver.flush(&self.screen)
    }
}
