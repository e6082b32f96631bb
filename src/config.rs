/*
 *  config.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  Resolved once before the refresh loop starts: YAML file merged
 *  with CLI overrides, then validated. Configuration errors are fatal
 *  at startup.
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
use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, ValueHint};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strip::{BrightnessMode, EndFrame, StripSettings};

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpiConfig {
    /// /dev/spidev{bus}.{slave}
    pub bus: u8,
    pub slave: u8,
    pub clock_hz: u32,
}

impl Default for SpiConfig {
    fn default() -> Self {
        SpiConfig {
            bus: 0,
            slave: 0,
            clock_hz: 400_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub brightness: BrightnessMode,
    pub end_frame: EndFrame,
}

/// One stepped-override entry as it appears in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelStep {
    pub min: f64,
    pub pixels: Vec<String>,
}

/// Where (timestamp, value) samples come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedConfig {
    /// Poll a text file once per tick; mtime must advance.
    File {
        path: PathBuf,
        /// A line is accepted when its first token starts with this.
        metric: String,
    },
    /// Subscribe to an MQTT topic carrying tagged JSON payloads.
    Mqtt {
        host: String,
        #[serde(default = "default_mqtt_port")]
        port: u16,
        /// Explicit topic; when absent it is assembled as
        /// {hostname}/sensors/{sensor}/{measurement}.
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        sensor: String,
        #[serde(default)]
        measurement: String,
        /// Key looked up in the payload's `values` mapping.
        value: String,
        /// Tag keys that must be present in the payload's `tags`.
        #[serde(default)]
        tags: HashMap<String, String>,
    },
}

fn default_mqtt_port() -> u16 {
    1883
}

/// Top-level app configuration, fully resolved. Serde defaults mean a
/// partial YAML file merges over the built-in defaults field by field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Refresh interval in seconds.
    pub interval: f64,
    /// Staleness timeout in seconds.
    pub timeout_s: f64,
    pub leds: usize,
    /// Leading LEDs reserved for the overall status color.
    pub fixed_leds: usize,
    /// Global brightness 0-100.
    pub brightness: u8,
    /// Upper end of the value domain for the graduated bar.
    pub max_value: f64,
    pub spi: SpiConfig,
    pub encoding: EncodingConfig,
    /// Color name -> hex table.
    pub colors: HashMap<String, String>,
    /// Ordered (minimum value, color name) pairs.
    pub thresholds: Vec<(f64, String)>,
    /// Optional stepped-override table; presence selects the stepped
    /// render strategy.
    pub levels: Option<Vec<LevelStep>>,
    pub feed: FeedConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut colors = HashMap::new();
        colors.insert("green".to_string(), "#00FF00".to_string());
        colors.insert("amber".to_string(), "#FFAA00".to_string());
        colors.insert("red".to_string(), "#FF0000".to_string());
        colors.insert("blue".to_string(), "#0000FF".to_string());
        Config {
            interval: 1.0,
            timeout_s: 3.0,
            leds: 74,
            fixed_leds: 0,
            brightness: 100,
            max_value: 2000.0,
            spi: SpiConfig::default(),
            encoding: EncodingConfig::default(),
            colors,
            thresholds: vec![
                (0.0, "green".to_string()),
                (800.0, "amber".to_string()),
                (1500.0, "red".to_string()),
            ],
            levels: None,
            feed: FeedConfig::File {
                path: PathBuf::from("/run/sensors/scd30/last"),
                metric: "co2_ppm".to_string(),
            },
        }
    }
}

impl Config {
    pub fn strip_settings(&self) -> StripSettings {
        StripSettings {
            leds: self.leds,
            global_brightness: self.brightness,
            brightness_mode: self.encoding.brightness,
            end_frame: self.encoding.end_frame,
        }
    }
}

/// CLI overrides. All value fields are Options so we can layer them
/// over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "ampel", version, about = "APA102 LED strip value indicator")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(short = 'c', long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// Enable debug log level
    #[arg(short = 'D', long, action = ArgAction::SetTrue)]
    pub debug: bool,
    /// Refresh interval in seconds
    #[arg(short = 'i', long)]
    pub interval: Option<f64>,
    /// Staleness timeout in seconds
    #[arg(short = 't', long)]
    pub timeout: Option<f64>,
    /// Number of LEDs in the strip
    #[arg(short = 'l', long)]
    pub leds: Option<usize>,
    /// Global brightness 0-100
    #[arg(short = 'b', long)]
    pub brightness: Option<u8>,
    /// SPI bus number (/dev/spidev[bus].[ss])
    #[arg(long)]
    pub spi_bus: Option<u8>,
    /// SPI slave-select line
    #[arg(long)]
    pub spi_ss: Option<u8>,
    /// SPI clock frequency in Hz
    #[arg(long)]
    pub spi_hz: Option<u32>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<(Config, Cli), ConfigError> {
    let cli = Cli::parse();

    // 1) defaults, 2) YAML file (explicit path or search)
    let mut cfg = if let Some(p) = cli.config.as_ref() {
        if !p.exists() {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
        read_yaml(p)?
    } else if let Some(p) = find_config_file() {
        read_yaml(&p)?
    } else {
        Config::default()
    };

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, &cli);

    // 4) Validate
    validate(&cfg)?;

    if cli.dump_config {
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok((cfg, cli))
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    let system = PathBuf::from("/etc/ampel/ampel.yaml");
    if system.exists() {
        return Some(system);
    }
    if let Some(home) = std::env::var_os("HOME") {
        let p = Path::new(&home).join(".config/ampel/config.yaml");
        if p.exists() {
            return Some(p);
        }
    }
    for candidate in &["ampel.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(v) = cli.interval {
        cfg.interval = v;
    }
    if let Some(v) = cli.timeout {
        cfg.timeout_s = v;
    }
    if let Some(v) = cli.leds {
        cfg.leds = v;
    }
    if let Some(v) = cli.brightness {
        cfg.brightness = v;
    }
    if let Some(v) = cli.spi_bus {
        cfg.spi.bus = v;
    }
    if let Some(v) = cli.spi_ss {
        cfg.spi.slave = v;
    }
    if let Some(v) = cli.spi_hz {
        cfg.spi.clock_hz = v;
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.leds == 0 {
        return Err(ConfigError::Validation("leds must be > 0".into()));
    }
    if cfg.fixed_leds >= cfg.leds {
        return Err(ConfigError::Validation(
            "fixed_leds must leave at least one graduated pixel".into(),
        ));
    }
    if cfg.brightness > 100 {
        return Err(ConfigError::Validation("brightness must be 0..=100".into()));
    }
    if !(cfg.interval > 0.0) {
        return Err(ConfigError::Validation("interval must be > 0".into()));
    }
    if !(cfg.timeout_s > 0.0) {
        return Err(ConfigError::Validation("timeout_s must be > 0".into()));
    }
    if !(cfg.max_value > 0.0) {
        return Err(ConfigError::Validation("max_value must be > 0".into()));
    }
    if cfg.colors.is_empty() {
        return Err(ConfigError::Validation("colors table must not be empty".into()));
    }
    if cfg.thresholds.is_empty() {
        return Err(ConfigError::Validation("thresholds must not be empty".into()));
    }
    if let FeedConfig::Mqtt {
        topic,
        sensor,
        measurement,
        value,
        ..
    } = &cfg.feed
    {
        if value.is_empty() {
            return Err(ConfigError::Validation("feed.value must not be empty".into()));
        }
        if topic.is_none() && (sensor.is_empty() || measurement.is_empty()) {
            return Err(ConfigError::Validation(
                "feed needs either an explicit topic or sensor+measurement".into(),
            ));
        }
    }
    Ok(())
}
