/*
 *  engine.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  The refresh loop: once per interval, pick up the latest sample,
 *  render the matching pattern, flush it to the device and pace the
 *  next tick. Stops on the shutdown flag and blanks the strip on the
 *  way out.
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

use std::time::{Duration, Instant};

use log::{info, warn};
use rgb::RGB8;
use tokio::sync::watch;

use crate::feed::{FileFeed, SampleCell};
use crate::freshness::{Freshness, FreshnessMonitor};
use crate::notify;
use crate::render::BarRenderer;
use crate::sink::DeviceSink;
use crate::strip::PixelBuffer;

/// Brightness of the stale error rotation.
const ERROR_PCT: u8 = 20;
/// Brightness of the awaiting-first-sample blink.
const IDLE_PCT: u8 = 20;

const WHITE: RGB8 = RGB8::new(255, 255, 255);

pub struct Engine {
    buffer: PixelBuffer,
    renderer: BarRenderer,
    monitor: FreshnessMonitor,
    sink: Box<dyn DeviceSink>,
    cell: SampleCell,
    /// Present only for the file feed; MQTT pushes into the cell from
    /// its own task.
    file_feed: Option<FileFeed>,
    interval: Duration,
    tick: u64,
    /// Timestamp of the sample most recently handed to the monitor,
    /// to tell a re-read of the same sample from a new arrival.
    last_seen: Option<Instant>,
}

impl Engine {
    pub fn new(
        buffer: PixelBuffer,
        renderer: BarRenderer,
        monitor: FreshnessMonitor,
        sink: Box<dyn DeviceSink>,
        cell: SampleCell,
        file_feed: Option<FileFeed>,
        interval: Duration,
    ) -> Self {
        Engine {
            buffer,
            renderer,
            monitor,
            sink,
            cell,
            file_feed,
            interval,
            tick: 0,
            last_seen: None,
        }
    }

    /// Run ticks until the shutdown flag flips, then blank the strip.
    /// The sleep is the pacing element: interval minus the time the
    /// tick itself took, floored at zero. An overrun is logged and the
    /// next tick starts immediately, it is never skipped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "refresh loop started, interval {:.2}s",
            self.interval.as_secs_f64()
        );
        while !*shutdown.borrow() {
            let started = Instant::now();
            self.tick(started).await;
            notify::alive();
            let elapsed = started.elapsed();
            if elapsed >= self.interval {
                warn!(
                    "tick took {}ms, longer than the {}ms interval",
                    elapsed.as_millis(),
                    self.interval.as_millis()
                );
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval - elapsed) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        self.blank();
        info!("refresh loop stopped, strip blanked");
    }

    async fn tick(&mut self, now: Instant) {
        if let Some(feed) = self.file_feed.as_mut() {
            if let Some(value) = feed.poll().await {
                self.cell.store(value, Instant::now()).await;
            }
        }
        // read the cell exactly once; value and timestamp stay paired
        let sample = self.cell.snapshot().await;
        if let Some(s) = sample {
            if self.last_seen != Some(s.at) {
                self.last_seen = Some(s.at);
                self.monitor.on_sample(s.at);
            }
        }
        match self.monitor.observe(now) {
            Freshness::AwaitingFirstSample => {
                // dim white blink on alternate ticks, visually distinct
                // from both the bar and the error rotation
                let pct = if self.tick % 2 == 0 { IDLE_PCT } else { 0 };
                self.renderer.paint_all(WHITE, pct, &mut self.buffer);
            }
            Freshness::Stale => {
                let color = self.monitor.next_error_color();
                self.renderer.paint_all(color, ERROR_PCT, &mut self.buffer);
            }
            Freshness::Fresh => {
                if let Some(s) = sample {
                    self.renderer.render(s.value, &mut self.buffer);
                }
            }
        }
        self.flush();
        self.tick += 1;
    }

    /// Flush errors are transient; the frame is dropped and the next
    /// tick tries again with current data.
    fn flush(&mut self) {
        let frame = self.buffer.encode();
        if let Err(e) = self.sink.flush(&frame) {
            warn!("device flush failed: {}", e);
        }
    }

    fn blank(&mut self) {
        self.buffer.clear();
        self.flush();
    }
}
