/*
 *  strip.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  APA102 pixel frame buffer and wire encoding. Holds one quad of
 *  bytes per LED and produces the complete framed byte sequence for
 *  a flush.
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
use serde::{Deserialize, Serialize};

/// High framing bits of every APA102 LED quad; the low 5 bits carry
/// the brightness field.
const LED_START: u8 = 0b1110_0000;

/// Per-call brightness below this percentage gets the additional RGB
/// compensation scale, since the 5-bit field has no usable resolution
/// down there.
const LOW_BRIGHTNESS_PCT: u8 = 10;

/// How a requested brightness percentage reaches the wire. Different
/// strip generations want different framing, so this is fixed at
/// configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrightnessMode {
    /// 5-bit brightness field packed with the framing bits. Below
    /// `LOW_BRIGHTNESS_PCT` the RGB channels are scaled by percent/10
    /// (ceil) on top of the field.
    #[default]
    Field,
    /// Brightness pre-multiplied into the RGB channels, field pinned
    /// to full. For strips whose brightness field misbehaves.
    Scaled,
}

/// End-of-frame marker variant, again a per-hardware-generation choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndFrame {
    /// ceil(N/16) zero bytes: one extra clock pulse per two LEDs so
    /// the tail of a long chain latches.
    #[default]
    Clocked,
    /// Fixed four 0xFF bytes, as the older strips expect.
    Fixed,
}

#[derive(Debug, Clone, Copy)]
pub struct StripSettings {
    pub leds: usize,
    /// Global brightness 0-100, multiplied with each set_pixel percent.
    pub global_brightness: u8,
    pub brightness_mode: BrightnessMode,
    pub end_frame: EndFrame,
}

/// Owns the per-LED wire quads. Mutated in place by the renderer,
/// read atomically by `encode()`. Never shared across writers.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    settings: StripSettings,
    quads: Vec<[u8; 4]>,
}

fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

impl PixelBuffer {
    pub fn new(settings: StripSettings) -> Self {
        let quads = vec![[LED_START, 0, 0, 0]; settings.leds];
        PixelBuffer { settings, quads }
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    /// Set one pixel. Out-of-range indices are ignored, not an error.
    pub fn set_pixel(&mut self, index: usize, color: RGB8, percent: u8) {
        let Some(quad) = self.quads.get_mut(index) else {
            return;
        };
        let percent = percent.min(100);
        let global = u32::from(self.settings.global_brightness.min(100));
        match self.settings.brightness_mode {
            BrightnessMode::Field => {
                let bright =
                    ceil_div(31 * global * u32::from(percent), 100 * 100).min(31) as u8;
                let (r, g, b) = if percent < LOW_BRIGHTNESS_PCT {
                    // compensation rule: the field alone cannot go dim
                    // enough, so scale the channels by percent/10 too
                    let scale = |c: u8| ceil_div(u32::from(c) * u32::from(percent), 10) as u8;
                    (scale(color.r), scale(color.g), scale(color.b))
                } else {
                    (color.r, color.g, color.b)
                };
                *quad = [LED_START | bright, b, g, r];
            }
            BrightnessMode::Scaled => {
                let scale = |c: u8| {
                    ceil_div(u32::from(c) * global * u32::from(percent), 100 * 100).min(255) as u8
                };
                *quad = [
                    LED_START | 0b0001_1111,
                    scale(color.b),
                    scale(color.g),
                    scale(color.r),
                ];
            }
        }
    }

    /// All pixels back to black.
    pub fn clear(&mut self) {
        for quad in &mut self.quads {
            *quad = [LED_START, 0, 0, 0];
        }
    }

    /// Raw wire quad for one LED, for tests and debugging.
    pub fn quad(&self, index: usize) -> Option<[u8; 4]> {
        self.quads.get(index).copied()
    }

    fn end_frame_len(&self) -> usize {
        match self.settings.end_frame {
            EndFrame::Clocked => (self.quads.len() + 15) / 16,
            EndFrame::Fixed => 4,
        }
    }

    /// Total length of an encoded frame: start + quads + end marker.
    pub fn encoded_len(&self) -> usize {
        4 + 4 * self.quads.len() + self.end_frame_len()
    }

    /// Produce the wire-ready frame: all-zero start frame, the LED
    /// quads, then the configured end marker.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&[0u8; 4]);
        for quad in &self.quads {
            out.extend_from_slice(quad);
        }
        match self.settings.end_frame {
            EndFrame::Clocked => out.resize(out.len() + self.end_frame_len(), 0x00),
            EndFrame::Fixed => out.extend_from_slice(&[0xFF; 4]),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(leds: usize, mode: BrightnessMode, end: EndFrame) -> StripSettings {
        StripSettings {
            leds,
            global_brightness: 100,
            brightness_mode: mode,
            end_frame: end,
        }
    }

    #[test]
    fn out_of_range_set_is_noop() {
        let mut buf = PixelBuffer::new(settings(4, BrightnessMode::Field, EndFrame::Clocked));
        let before = buf.encode();
        buf.set_pixel(4, RGB8::new(255, 255, 255), 100);
        buf.set_pixel(usize::MAX, RGB8::new(255, 255, 255), 100);
        assert_eq!(buf.encode(), before);
    }

    #[test]
    fn field_mode_full_brightness() {
        let mut buf = PixelBuffer::new(settings(1, BrightnessMode::Field, EndFrame::Clocked));
        buf.set_pixel(0, RGB8::new(10, 20, 30), 100);
        // full global x full percent -> all 31 field bits, channels untouched
        assert_eq!(buf.quad(0), Some([0xFF, 30, 20, 10]));
    }

    #[test]
    fn field_mode_global_scales_field() {
        let mut buf = PixelBuffer::new(StripSettings {
            leds: 1,
            global_brightness: 50,
            brightness_mode: BrightnessMode::Field,
            end_frame: EndFrame::Clocked,
        });
        buf.set_pixel(0, RGB8::new(200, 0, 0), 100);
        // ceil(31 * 50 * 100 / 10000) = 16
        assert_eq!(buf.quad(0), Some([LED_START | 16, 0, 0, 200]));
    }

    #[test]
    fn low_brightness_compensation_only_below_threshold() {
        let mut buf = PixelBuffer::new(settings(2, BrightnessMode::Field, EndFrame::Clocked));
        buf.set_pixel(0, RGB8::new(255, 100, 0), 5);
        buf.set_pixel(1, RGB8::new(255, 100, 0), 10);
        // 5% -> channels scaled by ceil(c * 5 / 10), field ceil(31*5/100)=2
        assert_eq!(buf.quad(0), Some([LED_START | 2, 0, 50, 128]));
        // 10% -> at the threshold, channels untouched
        assert_eq!(buf.quad(1), Some([LED_START | 4, 0, 100, 255]));
    }

    #[test]
    fn scaled_mode_folds_brightness_into_channels() {
        let mut buf = PixelBuffer::new(StripSettings {
            leds: 1,
            global_brightness: 50,
            brightness_mode: BrightnessMode::Scaled,
            end_frame: EndFrame::Fixed,
        });
        buf.set_pixel(0, RGB8::new(200, 100, 10), 50);
        // ceil(c * 50 * 50 / 10000): 200 -> 50, 100 -> 25, 10 -> 3
        assert_eq!(buf.quad(0), Some([0xFF, 3, 25, 50]));
    }

    #[test]
    fn encode_length_clocked() {
        for n in [1usize, 10, 16, 17, 74] {
            let buf = PixelBuffer::new(settings(n, BrightnessMode::Field, EndFrame::Clocked));
            let expected = 4 + 4 * n + (n + 15) / 16;
            assert_eq!(buf.encoded_len(), expected, "n={}", n);
            assert_eq!(buf.encode().len(), expected, "n={}", n);
        }
    }

    #[test]
    fn encode_length_fixed() {
        let buf = PixelBuffer::new(settings(10, BrightnessMode::Field, EndFrame::Fixed));
        assert_eq!(buf.encode().len(), 4 + 40 + 4);
        assert_eq!(&buf.encode()[44..], &[0xFF; 4]);
    }

    #[test]
    fn encode_starts_with_zero_start_frame() {
        let mut buf = PixelBuffer::new(settings(2, BrightnessMode::Field, EndFrame::Clocked));
        buf.set_pixel(0, RGB8::new(255, 255, 255), 100);
        assert_eq!(&buf.encode()[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn clear_resets_to_black() {
        let mut buf = PixelBuffer::new(settings(3, BrightnessMode::Field, EndFrame::Clocked));
        buf.set_pixel(1, RGB8::new(255, 0, 0), 100);
        buf.clear();
        for i in 0..3 {
            assert_eq!(buf.quad(i), Some([LED_START, 0, 0, 0]));
        }
    }
}
