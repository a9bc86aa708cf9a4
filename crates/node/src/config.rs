//! TOML config file loading, env overrides and validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::ErrorKind;
use std::str::FromStr;
use std::time::Duration;

use crate::calibration::{CalibrationBounds, RawReading};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub sensor: SensorConfig,
    pub monitor: MonitorConfig,
    pub indicator: IndicatorConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub base_topic: String,
    pub keep_alive_sec: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".into(),
            port: 1883,
            client_id: "soilscan-node".into(),
            base_topic: "soilscan/plant".into(),
            keep_alive_sec: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Raw reading with the probe in water.
    pub wet_raw: RawReading,
    /// Raw reading with the probe in dry air.
    pub dry_raw: RawReading,
    /// Highest value the ADC can produce (4095 for 12-bit, 32767 for ADS1115).
    pub adc_max: RawReading,
    pub i2c_addr: u16,
    pub channel: u8,
    pub sim_scenario: String,
}

/// Full-scale reading of the compiled-in ADC, when the backend fixes one.
#[cfg(feature = "adc")]
const BACKEND_ADC_MAX: Option<RawReading> = Some(crate::adc::ADS1115_MAX);
#[cfg(not(feature = "adc"))]
const BACKEND_ADC_MAX: Option<RawReading> = None;

/// Default `(wet_raw, dry_raw, adc_max)`.  The 12-bit reference probe unless
/// the ADS1115 is compiled in.
#[cfg(feature = "adc")]
const DEFAULT_RANGE: (RawReading, RawReading, RawReading) =
    (12000, 26000, crate::adc::ADS1115_MAX);
#[cfg(not(feature = "adc"))]
const DEFAULT_RANGE: (RawReading, RawReading, RawReading) = (1406, 3817, 4095);

impl Default for SensorConfig {
    fn default() -> Self {
        let (wet_raw, dry_raw, adc_max) = DEFAULT_RANGE;
        Self {
            wet_raw,
            dry_raw,
            adc_max,
            i2c_addr: 0x48,
            channel: 0,
            sim_scenario: "drying".into(),
        }
    }
}

impl SensorConfig {
    pub fn bounds(&self) -> Result<CalibrationBounds> {
        Ok(CalibrationBounds::new(self.wet_raw, self.dry_raw)?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub sample_every_s: u64,
    /// Delay before the first sample while the probe settles.
    pub warmup_s: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_every_s: 30,
            warmup_s: 180,
        }
    }
}

impl MonitorConfig {
    pub fn sample_every(&self) -> Duration {
        Duration::from_secs(self.sample_every_s)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_s)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// BCM numbering.
    pub gpio_pin: u8,
    pub active_low: bool,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            gpio_pin: 2,
            active_low: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_url: "sqlite:soilscan.db?mode=rwc".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
const VALID_GPIO_PINS: std::ops::RangeInclusive<u8> = 2..=27;

/// ADS1115 single-ended inputs AIN0..AIN3.
const MAX_ADC_CHANNEL: u8 = 3;

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{key}={value:?} is not valid: {e}"))
}

impl Config {
    /// Overlay environment variables on top of the file values.  `lookup` is
    /// `std::env::var` in production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MQTT_HOST") {
            self.mqtt.host = v;
        }
        if let Some(v) = lookup("MQTT_PORT") {
            self.mqtt.port = parse_env("MQTT_PORT", &v)?;
        }
        if let Some(v) = lookup("DB_URL") {
            self.store.db_url = v;
        }
        if let Some(v) = lookup("SAMPLE_EVERY_S") {
            self.monitor.sample_every_s = parse_env("SAMPLE_EVERY_S", &v)?;
        }
        if let Some(v) = lookup("WARMUP_S") {
            self.monitor.warmup_s = parse_env("WARMUP_S", &v)?;
        }
        if let Some(v) = lookup("SIM_SCENARIO") {
            self.sensor.sim_scenario = v;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate every section. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_mqtt(&mut errors);
        self.validate_sensor(&mut errors);

        if self.monitor.sample_every_s == 0 {
            errors.push("monitor: sample_every_s must be positive".into());
        }

        if !VALID_GPIO_PINS.contains(&self.indicator.gpio_pin) {
            errors.push(format!(
                "indicator: gpio_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.indicator.gpio_pin
            ));
        }

        if self.store.db_url.trim().is_empty() {
            errors.push("store: db_url is empty".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_mqtt(&self, errors: &mut Vec<String>) {
        let m = &self.mqtt;

        if m.host.trim().is_empty() {
            errors.push("mqtt: host is empty".into());
        }
        if m.port == 0 {
            errors.push("mqtt: port must be non-zero".into());
        }
        if m.client_id.trim().is_empty() {
            errors.push("mqtt: client_id is empty".into());
        }
        if m.base_topic.trim_end_matches('/').trim().is_empty() {
            errors.push("mqtt: base_topic is empty".into());
        } else if m.base_topic.contains(['+', '#']) {
            errors.push(format!(
                "mqtt: base_topic '{}' must not contain wildcards",
                m.base_topic
            ));
        }
        if m.keep_alive_sec == 0 {
            errors.push("mqtt: keep_alive_sec must be positive".into());
        }
    }

    fn validate_sensor(&self, errors: &mut Vec<String>) {
        let s = &self.sensor;

        if s.wet_raw >= s.dry_raw {
            errors.push(format!(
                "sensor: wet_raw ({}) must be less than dry_raw ({})",
                s.wet_raw, s.dry_raw
            ));
        }
        if s.dry_raw > s.adc_max {
            errors.push(format!(
                "sensor: dry_raw ({}) exceeds adc_max ({})",
                s.dry_raw, s.adc_max
            ));
        }
        if s.channel > MAX_ADC_CHANNEL {
            errors.push(format!(
                "sensor: channel {} out of range (0-{MAX_ADC_CHANNEL})",
                s.channel
            ));
        }
        validate_backend_range(s.adc_max, BACKEND_ADC_MAX, errors);
    }
}

/// `adc_max` must match the backend's full scale when it has a fixed one,
/// otherwise calibration written for another ADC maps to nonsense.
fn validate_backend_range(
    adc_max: RawReading,
    backend_max: Option<RawReading>,
    errors: &mut Vec<String>,
) {
    if let Some(backend_max) = backend_max {
        if adc_max != backend_max {
            errors.push(format!(
                "sensor: adc_max ({adc_max}) does not match the ADC full scale ({backend_max})"
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// Read the TOML file at `path` (defaults if it does not exist), apply env
/// overrides, and validate.
pub fn load(path: &str) -> Result<Config> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => Config::from_toml(&contents)
            .with_context(|| format!("failed to parse config: {path}"))?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path, "config file not found, using defaults");
            Config::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config: {path}"));
        }
    };

    config
        .apply_env(|key| std::env::var(key).ok())
        .context("invalid environment override")?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
