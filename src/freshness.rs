/*
 *  freshness.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  Tracks whether the value feed is alive. Before the first sample
 *  the strip idles with its own animation; after that, a missing
 *  sample beyond the timeout flips the display into the rotating
 *  error pattern until a fresh sample arrives.
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

/// Fixed 3-color cycle shown while stale, advanced once per tick.
const ERROR_CYCLE: [RGB8; 3] = [
    RGB8::new(255, 0, 0),
    RGB8::new(0, 255, 0),
    RGB8::new(0, 0, 255),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No sample has ever arrived. No timeout applies here.
    AwaitingFirstSample,
    Fresh,
    Stale,
}

#[derive(Debug)]
pub struct FreshnessMonitor {
    timeout: Duration,
    last_update: Option<Instant>,
    state: Freshness,
    cursor: usize,
}

impl FreshnessMonitor {
    pub fn new(timeout: Duration) -> Self {
        FreshnessMonitor {
            timeout,
            last_update: None,
            state: Freshness::AwaitingFirstSample,
            cursor: 0,
        }
    }

    /// Record a sample arrival. Transition messages are emitted once
    /// per state change, never per tick.
    pub fn on_sample(&mut self, at: Instant) {
        self.last_update = Some(at);
        match self.state {
            Freshness::AwaitingFirstSample => {
                info!("first sample received, leaving idle animation");
            }
            Freshness::Stale => {
                info!("value feed recovered, leaving error rotation");
            }
            Freshness::Fresh => {}
        }
        self.state = Freshness::Fresh;
    }

    /// Evaluate staleness at `now` and return the current state.
    pub fn observe(&mut self, now: Instant) -> Freshness {
        if let (Freshness::Fresh, Some(last)) = (self.state, self.last_update) {
            if now > last + self.timeout {
                warn!(
                    "no sample for more than {:.1}s, entering error rotation",
                    self.timeout.as_secs_f64()
                );
                self.state = Freshness::Stale;
            }
        }
        self.state
    }

    /// Next color of the red/green/blue error cycle; wraps mod 3.
    pub fn next_error_color(&mut self) -> RGB8 {
        let color = ERROR_CYCLE[self.cursor];
        self.cursor = (self.cursor + 1) % ERROR_CYCLE.len();
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(3);

    #[test]
    fn starts_awaiting_first_sample() {
        let mut m = FreshnessMonitor::new(TIMEOUT);
        let now = Instant::now();
        // no timeout concept before the first sample, ever
        assert_eq!(m.observe(now), Freshness::AwaitingFirstSample);
        assert_eq!(
            m.observe(now + Duration::from_secs(3600)),
            Freshness::AwaitingFirstSample
        );
    }

    #[test]
    fn staleness_transition_is_exact() {
        let mut m = FreshnessMonitor::new(TIMEOUT);
        let t0 = Instant::now();
        m.on_sample(t0);
        let eps = Duration::from_millis(1);
        assert_eq!(m.observe(t0 + TIMEOUT - eps), Freshness::Fresh);
        assert_eq!(m.observe(t0 + TIMEOUT), Freshness::Fresh);
        assert_eq!(m.observe(t0 + TIMEOUT + eps), Freshness::Stale);
    }

    #[test]
    fn new_sample_recovers_from_stale() {
        let mut m = FreshnessMonitor::new(TIMEOUT);
        let t0 = Instant::now();
        m.on_sample(t0);
        assert_eq!(m.observe(t0 + TIMEOUT * 2), Freshness::Stale);
        let t1 = t0 + TIMEOUT * 2 + Duration::from_secs(1);
        m.on_sample(t1);
        assert_eq!(m.observe(t1), Freshness::Fresh);
        assert_eq!(m.observe(t1 + TIMEOUT - Duration::from_millis(1)), Freshness::Fresh);
    }

    #[test]
    fn error_cycle_wraps_after_three() {
        let mut m = FreshnessMonitor::new(TIMEOUT);
        let c1 = m.next_error_color();
        let c2 = m.next_error_color();
        let c3 = m.next_error_color();
        let c4 = m.next_error_color();
        assert_eq!(c1, RGB8::new(255, 0, 0));
        assert_eq!(c2, RGB8::new(0, 255, 0));
        assert_eq!(c3, RGB8::new(0, 0, 255));
        assert_eq!(c4, c1);
    }
}
