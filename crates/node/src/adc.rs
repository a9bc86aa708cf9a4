//! ADS1115 16-bit ADC driver over I2C for the soil moisture probe.
//!
//! Reads one single-ended channel at PGA ±4.096 V, 128 SPS, single-shot mode.
//! Readings are in the ADS1115's native 0..=32767 range, so `sensor.adc_max`
//! and the calibration endpoints in `config.toml` must be given in the same
//! units when this driver is enabled.

use anyhow::Context;
use rppal::i2c::I2c;
use std::{thread, time::Duration};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::block_in_place;

use crate::calibration::RawReading;
use crate::ports::Sensor;

// ── ADS1115 register addresses ──────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
// Layout (MSB first):
//   [15]    OS       — write 1 to start single-shot conversion
//   [14:12] MUX      — input multiplexer (channel selection)
//   [11:9]  PGA      — programmable gain amplifier
//   [8]     MODE     — 0 = continuous, 1 = single-shot
//   [7:5]   DR       — data rate
//   [4:2]   COMP_*   — comparator mode/polarity/latch
//   [1:0]   COMP_QUE — 11 = disable comparator

/// OS=1 (start), PGA=001 (±4.096 V), MODE=1 (single-shot),
/// DR=100 (128 SPS), COMP_QUE=11 (comparator off).
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

/// AIN0: MUX=100, AIN1: MUX=101, AIN2: MUX=110, AIN3: MUX=111
const MUX_SHIFT: u8 = 12;
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

const MAX_CHANNEL: u8 = 3;

/// Conversion time at 128 SPS is ~7.8 ms.
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// Bit 15 of the config register reads back as the conversion-ready flag.
const OS_READY_BIT: u16 = 1 << 15;

/// Highest single-ended conversion value.
pub(crate) const ADS1115_MAX: RawReading = 32767;

fn config_for_channel(channel: u8) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[usize::from(channel)] << MUX_SHIFT)
}

/// Single-ended conversions never go negative; anything else is bus noise.
fn to_raw(conversion: i16) -> RawReading {
    conversion.clamp(0, ADS1115_MAX as i16) as RawReading
}

// ── Driver ──────────────────────────────────────────────────────────────────

/// Conversions attempted in `new()` before giving up.
const STARTUP_ATTEMPTS: usize = 3;
const STARTUP_RETRY_WAIT: Duration = Duration::from_millis(50);

/// Runs blocking I2C work without stalling other tasks on a multi-thread
/// runtime.  Elsewhere (current-thread runtime, no runtime) it just runs `f`.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => block_in_place(f),
        _ => f(),
    }
}

/// First good conversion out of `attempts` tries, or the last error.
fn first_good(
    attempts: usize,
    mut convert: impl FnMut() -> anyhow::Result<i16>,
) -> anyhow::Result<RawReading> {
    let mut last_err = anyhow::anyhow!("no conversion attempted");
    for attempt in 1..=attempts {
        match convert() {
            Ok(conversion) => return Ok(to_raw(conversion)),
            Err(e) => {
                tracing::warn!(attempt, "adc startup read failed: {e}");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// Conversion result, falling back to the previous reading on failure.
fn or_last_good(conversion: anyhow::Result<i16>, last_good: RawReading) -> RawReading {
    match conversion {
        Ok(conversion) => to_raw(conversion),
        Err(e) => {
            tracing::error!(last_good, "adc read failed: {e}");
            last_good
        }
    }
}

pub struct Ads1115 {
    i2c: I2c,
    channel: u8,
    /// Returned when a conversion fails.  Seeded from a real conversion in
    /// `new()`.
    last_good: RawReading,
}

impl Ads1115 {
    /// Open I2C bus 1, address the ADS1115 at `addr` and take a first reading.
    /// Fails if no conversion succeeds, so the monitor never starts from a
    /// made-up value.
    pub fn new(addr: u16, channel: u8) -> anyhow::Result<Self> {
        anyhow::ensure!(
            channel <= MAX_CHANNEL,
            "ADS1115 channel {channel} out of range (0–{MAX_CHANNEL})"
        );

        let mut i2c = I2c::new()?;
        i2c.set_slave_address(addr)?;

        let mut adc = Self {
            i2c,
            channel,
            last_good: 0,
        };
        let seed = first_good(STARTUP_ATTEMPTS, || {
            let result = adc.convert();
            if result.is_err() {
                thread::sleep(STARTUP_RETRY_WAIT);
            }
            result
        })
        .context("ADS1115 produced no valid conversion")?;
        adc.last_good = seed;

        tracing::info!(
            addr = format_args!("0x{addr:02x}"),
            channel,
            raw = adc.last_good,
            "ads1115 initialised"
        );

        Ok(adc)
    }

    fn convert(&mut self) -> anyhow::Result<i16> {
        let config = config_for_channel(self.channel);
        self.i2c.block_write(REG_CONFIG, &config.to_be_bytes())?;

        thread::sleep(CONVERSION_WAIT);

        // One wait is normally enough at 128 SPS.
        for _ in 0..3 {
            let mut buf = [0u8; 2];
            self.i2c.block_read(REG_CONFIG, &mut buf)?;
            if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.i2c.block_read(REG_CONVERSION, &mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }
}

impl Sensor for Ads1115 {
    fn read(&mut self) -> RawReading {
        let conversion = run_blocking(|| self.convert());
        self.last_good = or_last_good(conversion, self.last_good);
        self.last_good
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
