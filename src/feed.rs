/*
 *  feed.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
 *
 *  Value sources. Samples arrive either by polling a metrics text
 *  file once per tick or from an MQTT subscription running as its own
 *  task; both land in the shared sample cell the refresh loop reads.
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

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Delay before redialing the broker after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// One value observation with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub at: Instant,
}

/// Shared slot between producers and the refresh loop. The value and
/// its timestamp always swap as a pair; a reader never sees a new
/// value with an old timestamp.
#[derive(Debug, Clone, Default)]
pub struct SampleCell {
    inner: Arc<Mutex<Option<Sample>>>,
}

impl SampleCell {
    pub fn new() -> Self {
        SampleCell::default()
    }

    pub async fn store(&self, value: f64, at: Instant) {
        let mut slot = self.inner.lock().await;
        *slot = Some(Sample { value, at });
    }

    pub async fn snapshot(&self) -> Option<Sample> {
        *self.inner.lock().await
    }
}

/// Polls a prometheus-style text file. A poll only reads when the
/// file's mtime has advanced past the last accepted one.
#[derive(Debug)]
pub struct FileFeed {
    path: PathBuf,
    metric: String,
    last_mtime: Option<SystemTime>,
}

impl FileFeed {
    pub fn new(path: PathBuf, metric: String) -> Self {
        FileFeed {
            path,
            metric,
            last_mtime: None,
        }
    }

    /// One poll attempt. Returns a value only when the file changed
    /// since the previous accepted read and a matching line parsed.
    /// All failure modes are soft: the caller's last sample stands.
    pub async fn poll(&mut self) -> Option<f64> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) => {
                debug!("feed file {} unreadable: {}", self.path.display(), e);
                return None;
            }
        };
        let mtime = meta.modified().ok()?;
        if let Some(last) = self.last_mtime {
            if mtime <= last {
                return None;
            }
        }
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) => {
                warn!("failed to read {}: {}", self.path.display(), e);
                return None;
            }
        };
        self.last_mtime = Some(mtime);
        let parsed = parse_metric_text(&content, &self.metric);
        if parsed.is_none() {
            warn!(
                "no parsable '{}' line in {}",
                self.metric,
                self.path.display()
            );
        }
        parsed
    }
}

/// Scan metrics text for lines whose first token starts with `metric`
/// and whose second token is a float. The last matching line wins.
pub fn parse_metric_text(content: &str, metric: &str) -> Option<f64> {
    let mut value = None;
    for line in content.lines() {
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(raw)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        if !name.starts_with(metric) {
            continue;
        }
        match raw.parse::<f64>() {
            Ok(v) => value = Some(v),
            Err(_) => debug!("unparsable value token {:?} for {}", raw, name),
        }
    }
    value
}

/// Everything the MQTT listener task needs, resolved from config.
#[derive(Debug, Clone)]
pub struct MqttFeedSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    /// Key looked up in the payload's `values` mapping.
    pub value_key: String,
    /// Tag keys that must be present in the payload's `tags`.
    pub required_tags: Vec<String>,
}

/// Extract the sample value from one publish payload. Payloads look
/// like {"tags": {...}, "values": {...}}; anything malformed or not
/// carrying the required tags is discarded with a reason.
pub fn parse_mqtt_payload(
    payload: &[u8],
    value_key: &str,
    required_tags: &[String],
) -> Result<f64, String> {
    let doc: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| format!("not JSON: {e}"))?;
    if !required_tags.is_empty() {
        let tags = doc
            .get("tags")
            .and_then(|t| t.as_object())
            .ok_or_else(|| "payload carries no tags object".to_string())?;
        for key in required_tags {
            if !tags.contains_key(key) {
                return Err(format!("required tag {key:?} missing"));
            }
        }
    }
    let values = doc
        .get("values")
        .and_then(|v| v.as_object())
        .ok_or_else(|| "payload carries no values object".to_string())?;
    values
        .get(value_key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| format!("values[{value_key:?}] missing or not a number"))
}

/// Machine hostname, for assembling the default topic.
pub fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Spawn the subscription task. It reconnects with a fixed delay for
/// as long as the shutdown flag stays unset and (re)subscribes on
/// every ConnAck, so broker restarts are survived.
pub fn spawn_mqtt_listener(
    settings: MqttFeedSettings,
    cell: SampleCell,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut options = MqttOptions::new("ampel", settings.host.clone(), settings.port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(options, 10);
        info!(
            "MQTT listener for {} on {}:{}",
            settings.topic, settings.host, settings.port
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = client.disconnect().await;
                    break;
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to broker, subscribing to {}", settings.topic);
                        if let Err(e) = client.subscribe(&settings.topic, QoS::AtMostOnce).await {
                            warn!("subscribe failed: {}", e);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match parse_mqtt_payload(
                            &publish.payload,
                            &settings.value_key,
                            &settings.required_tags,
                        ) {
                            Ok(value) => {
                                debug!("sample {} from {}", value, publish.topic);
                                cell.store(value, Instant::now()).await;
                            }
                            Err(reason) => debug!("discarding publish: {}", reason),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            "MQTT connection error: {}, retrying in {}s",
                            e,
                            RECONNECT_DELAY.as_secs()
                        );
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
        info!("MQTT listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_text_prefix_match_last_wins() {
        let content = "\
co2_ppm{gas=\"CO2\"} 640\n\
temperature_celsius 21.4\n\
co2_ppm{gas=\"CO2\"} 812\n";
        assert_eq!(parse_metric_text(content, "co2_ppm"), Some(812.0));
        assert_eq!(parse_metric_text(content, "temperature"), Some(21.4));
        assert_eq!(parse_metric_text(content, "humidity"), None);
    }

    #[test]
    fn metric_text_skips_garbage_lines() {
        let content = "co2_ppm\nco2_ppm notanumber\nco2_ppm 455\n";
        assert_eq!(parse_metric_text(content, "co2_ppm"), Some(455.0));
    }

    #[test]
    fn payload_happy_path() {
        let payload = br#"{"tags":{"sensor":"scd30"},"values":{"co2_ppm":678.5}}"#;
        let tags = vec!["sensor".to_string()];
        assert_eq!(parse_mqtt_payload(payload, "co2_ppm", &tags), Ok(678.5));
    }

    #[test]
    fn payload_missing_required_tag_discarded() {
        let payload = br#"{"tags":{"other":"x"},"values":{"co2_ppm":678.5}}"#;
        let tags = vec!["sensor".to_string()];
        assert!(parse_mqtt_payload(payload, "co2_ppm", &tags).is_err());
    }

    #[test]
    fn payload_tag_value_is_not_checked() {
        // only the key has to be present, the tag value is free-form
        let payload = br#"{"tags":{"sensor":"anything"},"values":{"co2_ppm":1.0}}"#;
        let tags = vec!["sensor".to_string()];
        assert_eq!(parse_mqtt_payload(payload, "co2_ppm", &tags), Ok(1.0));
    }

    #[test]
    fn payload_bad_json_or_missing_value_discarded() {
        assert!(parse_mqtt_payload(b"not json", "co2_ppm", &[]).is_err());
        let payload = br#"{"values":{"co2_ppm":"high"}}"#;
        assert!(parse_mqtt_payload(payload, "co2_ppm", &[]).is_err());
        let payload = br#"{"values":{}}"#;
        assert!(parse_mqtt_payload(payload, "co2_ppm", &[]).is_err());
    }

    #[tokio::test]
    async fn cell_swaps_value_and_timestamp_together() {
        let cell = SampleCell::new();
        assert!(cell.snapshot().await.is_none());
        let t0 = Instant::now();
        cell.store(400.0, t0).await;
        let s = cell.snapshot().await.unwrap();
        assert_eq!(s.value, 400.0);
        assert_eq!(s.at, t0);
        let t1 = t0 + Duration::from_secs(1);
        cell.store(500.0, t1).await;
        let s = cell.snapshot().await.unwrap();
        assert_eq!((s.value, s.at), (500.0, t1));
    }

    #[tokio::test]
    async fn file_feed_requires_mtime_to_advance() {
        let dir = std::env::temp_dir().join(format!("ampel-feed-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("last");
        tokio::fs::write(&path, "co2_ppm 512\n").await.unwrap();

        let mut feed = FileFeed::new(path.clone(), "co2_ppm".to_string());
        assert_eq!(feed.poll().await, Some(512.0));
        // same mtime, nothing new
        assert_eq!(feed.poll().await, None);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn file_feed_missing_file_is_soft() {
        let mut feed = FileFeed::new(
            PathBuf::from("/nonexistent/ampel/last"),
            "co2_ppm".to_string(),
        );
        assert_eq!(feed.poll().await, None);
    }
}
