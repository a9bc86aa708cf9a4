mod alert;
mod calibration;
mod command;
mod config;
mod db;
mod indicator;
mod monitor;
mod mqtt;
mod ports;
mod threshold;

#[cfg(feature = "adc")]
mod adc;
#[cfg(feature = "sim")]
mod sim;

#[cfg(not(any(feature = "adc", feature = "sim")))]
compile_error!("enable at least one sensor backend: feature `adc` or `sim`");

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use db::Db;
use indicator::StatusLed;
use monitor::Monitor;
use mqtt::{MqttPublisher, Topics};
use ports::Indicator;
use threshold::ThresholdStore;

// ---------------------------------------------------------------------------
// Sensor backend
// ---------------------------------------------------------------------------

#[cfg(feature = "adc")]
fn build_sensor(cfg: &Config) -> Result<adc::Ads1115> {
    adc::Ads1115::new(cfg.sensor.i2c_addr, cfg.sensor.channel).context("failed to open ADS1115")
}

#[cfg(all(feature = "sim", not(feature = "adc")))]
fn build_sensor(cfg: &Config) -> Result<sim::SoilMoistureSim> {
    let scenario = sim::Scenario::from_str_lossy(&cfg.sensor.sim_scenario);
    info!(%scenario, "using simulated moisture probe");
    Ok(sim::SoilMoistureSim::new(
        scenario,
        cfg.sensor.bounds()?,
        cfg.sensor.adc_max,
    ))
}

// ---------------------------------------------------------------------------
// MQTT event loop
// ---------------------------------------------------------------------------

/// Polls the broker connection forever: re-subscribes to the configuration
/// topic on every (re)connect and feeds inbound publishes to the command
/// handler one at a time.
async fn serve_commands(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Topics,
    store: Arc<ThresholdStore<Db>>,
    notifier: MqttPublisher,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                // try_subscribe: awaiting here would block the loop that
                // drains the request queue.
                match client.try_subscribe(topics.set_type(), QoS::AtMostOnce) {
                    Ok(()) => info!(topic = topics.set_type(), "subscribed"),
                    Err(e) => error!(topic = topics.set_type(), "subscribe failed: {e}"),
                }
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                mqtt::dispatch(&p, &topics, &*store, &notifier).await;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
            }
            Ok(_) => {}
            Err(e) => {
                error!("mqtt error: {e}. reconnecting...");
                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    let bounds = cfg.sensor.bounds()?;
    info!(
        path = %config_path,
        broker = %cfg.mqtt.host,
        port = cfg.mqtt.port,
        base_topic = %cfg.mqtt.base_topic,
        "config loaded"
    );

    // ── Threshold store ─────────────────────────────────────────────
    let db = Db::connect(&cfg.store.db_url).await?;
    db.migrate().await?;

    let store = Arc::new(ThresholdStore::new(db));
    let threshold = store.load_or_default().await;
    info!(%threshold, "alert threshold");

    // ── Hardware ────────────────────────────────────────────────────
    let mut led = StatusLed::new(cfg.indicator.gpio_pin, cfg.indicator.active_low)
        .context("failed to initialise status LED")?;
    led.set(false);

    let sensor = build_sensor(&cfg)?;

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new(&cfg.mqtt.client_id, &cfg.mqtt.host, cfg.mqtt.port);
    mqttoptions.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_sec));

    let (client, eventloop) = AsyncClient::new(mqttoptions, 20);
    let topics = Topics::new(&cfg.mqtt.base_topic);
    let publisher = MqttPublisher::new(client.clone(), topics.clone());

    tokio::spawn(serve_commands(
        eventloop,
        client,
        topics,
        Arc::clone(&store),
        publisher.clone(),
    ));

    // ── Monitor ─────────────────────────────────────────────────────
    if cfg.monitor.warmup_s > 0 {
        info!(warmup_s = cfg.monitor.warmup_s, "waiting for probe to settle");
        sleep(cfg.monitor.warmup()).await;
    }

    let monitor = Monitor::new(sensor, led, publisher.clone(), publisher, bounds);
    monitor.run(store, cfg.monitor.sample_every()).await;

    Ok(())
}
