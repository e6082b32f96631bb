/*
 *  notify.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  Best-effort systemd notifications. Outside systemd (no
 *  NOTIFY_SOCKET) these are no-ops; a notification failure never
 *  disturbs the refresh loop.
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

use sd_notify::NotifyState;

/// Startup complete, service is serving.
pub fn ready() {
    let _ = sd_notify::notify(false, &[NotifyState::Ready]);
}

/// Per-tick watchdog keepalive.
pub fn alive() {
    let _ = sd_notify::notify(false, &[NotifyState::Watchdog]);
}

/// Announce orderly shutdown.
pub fn stopping() {
    let _ = sd_notify::notify(false, &[NotifyState::Stopping]);
}
