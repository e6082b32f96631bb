/*
 *  sink.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  Device sink: where encoded frames go. The SPI implementation talks
 *  to the strip through /dev/spidev; the memory implementation backs
 *  the tests.
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

use std::sync::{Arc, Mutex};

use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use thiserror::Error;

use crate::config::SpiConfig;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("SPI transport error: {0}")]
    Spi(#[from] rppal::spi::Error),
    #[error("unsupported SPI bus {0}")]
    UnknownBus(u8),
    #[error("unsupported SPI slave-select line {0}")]
    UnknownSlaveSelect(u8),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-forget frame transport. No acknowledgement contract; a
/// flush error is transient and the next tick tries again.
pub trait DeviceSink: Send {
    fn flush(&mut self, frame: &[u8]) -> Result<(), SinkError>;
}

/// APA102 chain on a Raspberry Pi SPI bus.
pub struct SpiSink {
    spi: Spi,
}

impl SpiSink {
    pub fn open(cfg: &SpiConfig) -> Result<Self, SinkError> {
        let bus = match cfg.bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            2 => Bus::Spi2,
            3 => Bus::Spi3,
            4 => Bus::Spi4,
            5 => Bus::Spi5,
            6 => Bus::Spi6,
            other => return Err(SinkError::UnknownBus(other)),
        };
        let ss = match cfg.slave {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            other => return Err(SinkError::UnknownSlaveSelect(other)),
        };
        // the strips want clock phase shifted: SPI mode 1
        let spi = Spi::new(bus, ss, cfg.clock_hz, Mode::Mode1)?;
        Ok(SpiSink { spi })
    }
}

impl DeviceSink for SpiSink {
    fn flush(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        self.spi.write(frame)?;
        Ok(())
    }
}

/// Captures flushed frames for inspection. Handles share the same
/// backing store so a test can keep one while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Make every subsequent flush fail, to exercise the transient
    /// error path.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut f) = self.fail.lock() {
            *f = failing;
        }
    }
}

impl DeviceSink for MemorySink {
    fn flush(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(SinkError::Unavailable("memory sink set to fail".into()));
        }
        if let Ok(mut frames) = self.frames.lock() {
            frames.push(frame.to_vec());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_shares_backing_store() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        handle.flush(&[1, 2, 3]).unwrap();
        assert_eq!(sink.frames(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn memory_sink_failure_is_switchable() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        sink.set_failing(true);
        assert!(handle.flush(&[0]).is_err());
        sink.set_failing(false);
        assert!(handle.flush(&[0]).is_ok());
        assert_eq!(sink.frame_count(), 1);
    }
}
