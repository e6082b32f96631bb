/*
 *  render.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  Maps a scalar value to a full-strip pattern: a fixed status prefix
 *  plus either a graduated bar fill or an explicit per-step color
 *  table. Band colors are baked once at construction; render() is a
 *  cheap per-tick pass over the buffer.
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

use rgb::RGB8;

use crate::color::{Palette, ThresholdTable};
use crate::strip::PixelBuffer;

const FULL_PCT: u8 = 100;
/// Unlit bar pixels keep their band color at a faint afterimage level,
/// never exactly zero.
const FAINT_PCT: u8 = 1;

const BLACK: RGB8 = RGB8::new(0, 0, 0);

/// One stepped-override entry: explicit pixel colors that take over
/// once the value exceeds `min`.
#[derive(Debug, Clone)]
pub struct Step {
    pub min: f64,
    pub pixels: Vec<RGB8>,
}

#[derive(Debug, Clone)]
enum Strategy {
    /// Pre-baked color per bar pixel; lit count follows the value.
    Graduated { band_colors: Vec<RGB8> },
    /// Explicit color lists selected by threshold, last satisfied wins.
    Stepped { steps: Vec<Step> },
}

/// Value -> frame mapping. Constructed once from configuration; only
/// the lit/unlit state and the status color vary per call.
#[derive(Debug, Clone)]
pub struct BarRenderer {
    palette: Palette,
    thresholds: ThresholdTable,
    fixed: usize,
    max_value: f64,
    strategy: Strategy,
}

impl BarRenderer {
    pub fn graduated(
        palette: Palette,
        thresholds: ThresholdTable,
        leds: usize,
        fixed: usize,
        max_value: f64,
    ) -> Self {
        let bar_len = leds.saturating_sub(fixed);
        let mut band_colors = Vec::with_capacity(bar_len);
        for i in 0..bar_len {
            // each bar pixel represents one even slice of the value
            // domain; its color is resolved at the slice's upper edge
            let band_value = (i + 1) as f64 * max_value / bar_len as f64;
            let rgb = thresholds
                .resolve(band_value)
                .and_then(|name| palette.get(name))
                .unwrap_or(BLACK);
            band_colors.push(rgb);
        }
        BarRenderer {
            palette,
            thresholds,
            fixed,
            max_value,
            strategy: Strategy::Graduated { band_colors },
        }
    }

    pub fn stepped(
        palette: Palette,
        thresholds: ThresholdTable,
        fixed: usize,
        max_value: f64,
        raw_steps: Vec<(f64, Vec<String>)>,
    ) -> Self {
        let steps = raw_steps
            .into_iter()
            .map(|(min, names)| Step {
                min,
                pixels: names
                    .iter()
                    .map(|name| palette.get(name).unwrap_or(BLACK))
                    .collect(),
            })
            .collect();
        BarRenderer {
            palette,
            thresholds,
            fixed,
            max_value,
            strategy: Strategy::Stepped { steps },
        }
    }

    /// Write the pattern for `value` into the buffer. Idempotent for a
    /// fixed value: the same inputs produce the same frame.
    pub fn render(&self, value: f64, buf: &mut PixelBuffer) {
        self.paint_status_prefix(value, buf);
        match &self.strategy {
            Strategy::Graduated { band_colors } => self.render_graduated(value, band_colors, buf),
            Strategy::Stepped { steps } => self.render_stepped(value, steps, buf),
        }
    }

    /// Whole strip in one color, used for the stale error rotation and
    /// the awaiting-first-sample blink.
    pub fn paint_all(&self, color: RGB8, percent: u8, buf: &mut PixelBuffer) {
        for i in 0..buf.len() {
            buf.set_pixel(i, color, percent);
        }
    }

    /// The fixed prefix always carries the overall status color for
    /// the unclamped value, independent of position.
    fn paint_status_prefix(&self, value: f64, buf: &mut PixelBuffer) {
        let status = self
            .thresholds
            .resolve(value)
            .and_then(|name| self.palette.get(name));
        for i in 0..self.fixed {
            match status {
                Some(rgb) => buf.set_pixel(i, rgb, FULL_PCT),
                None => buf.set_pixel(i, BLACK, 0),
            }
        }
    }

    fn render_graduated(&self, value: f64, band_colors: &[RGB8], buf: &mut PixelBuffer) {
        let bar_len = band_colors.len();
        if bar_len == 0 {
            return;
        }
        let clamped = value.clamp(0.0, self.max_value);
        let lit = ((clamped / self.max_value) * bar_len as f64).ceil() as usize;
        let lit = lit.min(bar_len);
        for (i, rgb) in band_colors.iter().enumerate() {
            let pct = if i < lit { FULL_PCT } else { FAINT_PCT };
            buf.set_pixel(self.fixed + i, *rgb, pct);
        }
    }

    fn render_stepped(&self, value: f64, steps: &[Step], buf: &mut PixelBuffer) {
        // last step whose threshold is strictly below the value wins
        let mut selected = None;
        for step in steps {
            if step.min < value {
                selected = Some(step);
            }
        }
        let pixels: &[RGB8] = selected.map(|s| s.pixels.as_slice()).unwrap_or(&[]);
        for i in self.fixed..buf.len() {
            match pixels.get(i - self.fixed) {
                Some(rgb) => buf.set_pixel(i, *rgb, FULL_PCT),
                None => buf.set_pixel(i, BLACK, 0),
            }
        }
    }
}
