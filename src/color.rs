/*
 *  color.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  Named color palette and the ordered threshold table that maps a
 *  sensor value to a color name.
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

use std::collections::HashMap;

use log::warn;
use rgb::RGB8;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("malformed hex color '{0}' (expected RRGGBB or #RRGGBB)")]
    BadHex(String),
    #[error("thresholds must be non-decreasing: {1} follows {0}")]
    Unsorted(f64, f64),
    #[error("threshold table references unknown color '{0}'")]
    UnknownColor(String),
}

/// Name -> RGB lookup built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct Palette {
    colors: HashMap<String, RGB8>,
}

impl Palette {
    pub fn from_hex_table(table: &HashMap<String, String>) -> Result<Self, ColorError> {
        let mut colors = HashMap::with_capacity(table.len());
        for (name, hex) in table {
            colors.insert(name.clone(), parse_hex(hex)?);
        }
        Ok(Palette { colors })
    }

    /// Resolve a color name to its RGB triple. An unknown name is a
    /// recovered error: we log it and the caller leaves the pixel black.
    pub fn get(&self, name: &str) -> Option<RGB8> {
        let rgb = self.colors.get(name).copied();
        if rgb.is_none() {
            warn!("unknown color name '{}', leaving pixel unset", name);
        }
        rgb
    }

    pub fn contains(&self, name: &str) -> bool {
        self.colors.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

fn parse_hex(hex: &str) -> Result<RGB8, ColorError> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ColorError::BadHex(hex.to_string()));
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
    match (channel(0), channel(2), channel(4)) {
        (Ok(r), Ok(g), Ok(b)) => Ok(RGB8::new(r, g, b)),
        _ => Err(ColorError::BadHex(hex.to_string())),
    }
}

/// Ordered (minimum value, color name) pairs. Lookup returns the color
/// of the last entry whose minimum is <= the query value; below the
/// first threshold there is no color at all.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    entries: Vec<(f64, String)>,
}

impl ThresholdTable {
    pub fn new(entries: Vec<(f64, String)>, palette: &Palette) -> Result<Self, ColorError> {
        for pair in entries.windows(2) {
            if pair[1].0 < pair[0].0 {
                return Err(ColorError::Unsorted(pair[0].0, pair[1].0));
            }
        }
        for (_, name) in &entries {
            if !palette.contains(name) {
                return Err(ColorError::UnknownColor(name.clone()));
            }
        }
        Ok(ThresholdTable { entries })
    }

    /// Highest threshold not exceeded wins; `None` below all thresholds.
    pub fn resolve(&self, value: f64) -> Option<&str> {
        let mut hit = None;
        for (min, name) in &self.entries {
            if value >= *min {
                hit = Some(name.as_str());
            } else {
                break;
            }
        }
        hit
    }

    /// Index of the matched entry, for monotonicity checks in tests.
    pub fn resolve_index(&self, value: f64) -> Option<usize> {
        let mut hit = None;
        for (i, (min, _)) in self.entries.iter().enumerate() {
            if value >= *min {
                hit = Some(i);
            } else {
                break;
            }
        }
        hit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Palette {
        let mut table = HashMap::new();
        table.insert("green".to_string(), "#00FF00".to_string());
        table.insert("amber".to_string(), "FFAA00".to_string());
        table.insert("red".to_string(), "#FF0000".to_string());
        Palette::from_hex_table(&table).unwrap()
    }

    fn table() -> ThresholdTable {
        ThresholdTable::new(
            vec![
                (0.0, "green".to_string()),
                (800.0, "amber".to_string()),
                (1500.0, "red".to_string()),
            ],
            &palette(),
        )
        .unwrap()
    }

    #[test]
    fn hex_parsing_with_and_without_hash() {
        let p = palette();
        assert_eq!(p.get("green"), Some(RGB8::new(0, 255, 0)));
        assert_eq!(p.get("amber"), Some(RGB8::new(255, 170, 0)));
    }

    #[test]
    fn bad_hex_rejected() {
        let mut table = HashMap::new();
        table.insert("x".to_string(), "#12345".to_string());
        assert!(Palette::from_hex_table(&table).is_err());
        let mut table = HashMap::new();
        table.insert("x".to_string(), "GG0000".to_string());
        assert!(Palette::from_hex_table(&table).is_err());
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(palette().get("mauve"), None);
    }

    #[test]
    fn last_threshold_not_exceeded_wins() {
        let t = table();
        assert_eq!(t.resolve(0.0), Some("green"));
        assert_eq!(t.resolve(799.9), Some("green"));
        assert_eq!(t.resolve(800.0), Some("amber"));
        assert_eq!(t.resolve(900.0), Some("amber"));
        assert_eq!(t.resolve(1500.0), Some("red"));
        assert_eq!(t.resolve(99999.0), Some("red"));
    }

    #[test]
    fn below_lowest_threshold_is_none() {
        let t = table();
        assert_eq!(t.resolve(-1.0), None);
        assert_eq!(t.resolve_index(-0.001), None);
    }

    #[test]
    fn resolver_is_monotonic() {
        let t = table();
        let mut last = None;
        for v in [-5.0, 0.0, 400.0, 800.0, 1200.0, 1500.0, 3000.0] {
            let idx = t.resolve_index(v);
            assert!(idx >= last, "index regressed at value {}", v);
            last = idx;
        }
    }

    #[test]
    fn decreasing_thresholds_rejected() {
        let err = ThresholdTable::new(
            vec![(800.0, "amber".to_string()), (0.0, "green".to_string())],
            &palette(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn unknown_color_in_table_rejected() {
        let err = ThresholdTable::new(vec![(0.0, "mauve".to_string())], &palette());
        assert!(err.is_err());
    }
}
