/*
 *  main.rs
 *
 *  ampel - scalar value to LED light
 *  (c) 2021-26 ampel authors
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

use std::time::Duration;

use anyhow::Result;
use env_logger::Env;
use log::{error, info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use ampel::color::{Palette, ThresholdTable};
use ampel::config::{self, FeedConfig};
use ampel::engine::Engine;
use ampel::feed::{self, FileFeed, MqttFeedSettings, SampleCell};
use ampel::freshness::FreshnessMonitor;
use ampel::notify;
use ampel::render::BarRenderer;
use ampel::sink::{DeviceSink, SpiSink};
use ampel::strip::PixelBuffer;

/// How long the MQTT listener gets to wind down after the loop stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Waits for SIGINT, SIGTERM or SIGHUP; any of them means shutdown.
async fn signal_handler() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let (cfg, cli) = config::load()?;

    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    info!("ampel v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "{} LEDs ({} fixed), interval {:.2}s, timeout {:.1}s",
        cfg.leds, cfg.fixed_leds, cfg.interval, cfg.timeout_s
    );

    let palette = Palette::from_hex_table(&cfg.colors)?;
    let thresholds = ThresholdTable::new(cfg.thresholds.clone(), &palette)?;
    let renderer = match &cfg.levels {
        Some(levels) => BarRenderer::stepped(
            palette,
            thresholds,
            cfg.fixed_leds,
            cfg.max_value,
            levels
                .iter()
                .map(|step| (step.min, step.pixels.clone()))
                .collect(),
        ),
        None => BarRenderer::graduated(
            palette,
            thresholds,
            cfg.leds,
            cfg.fixed_leds,
            cfg.max_value,
        ),
    };
    let buffer = PixelBuffer::new(cfg.strip_settings());
    let monitor = FreshnessMonitor::new(Duration::from_secs_f64(cfg.timeout_s));
    let sink: Box<dyn DeviceSink> = Box::new(SpiSink::open(&cfg.spi)?);
    let cell = SampleCell::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut file_feed = None;
    let mut listener = None;
    match &cfg.feed {
        FeedConfig::File { path, metric } => {
            info!("polling {} for '{}'", path.display(), metric);
            file_feed = Some(FileFeed::new(path.clone(), metric.clone()));
        }
        FeedConfig::Mqtt {
            host,
            port,
            topic,
            sensor,
            measurement,
            value,
            tags,
        } => {
            let topic = topic.clone().unwrap_or_else(|| {
                format!("{}/sensors/{}/{}", feed::hostname(), sensor, measurement)
            });
            let settings = MqttFeedSettings {
                host: host.clone(),
                port: *port,
                topic,
                value_key: value.clone(),
                required_tags: tags.keys().cloned().collect(),
            };
            listener = Some(feed::spawn_mqtt_listener(
                settings,
                cell.clone(),
                shutdown_rx.clone(),
            ));
        }
    }

    let mut engine = Engine::new(
        buffer,
        renderer,
        monitor,
        sink,
        cell,
        file_feed,
        Duration::from_secs_f64(cfg.interval),
    );

    let sig_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler().await {
            error!("failed to install signal handlers: {}", e);
        }
        let _ = sig_tx.send(true);
    });

    notify::ready();
    engine.run(shutdown_rx).await;
    notify::stopping();

    if let Some(handle) = listener {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            warn!(
                "MQTT listener did not stop within {}s, abandoning it",
                SHUTDOWN_GRACE.as_secs()
            );
        }
    }

    info!("ampel exiting");
    Ok(())
}
