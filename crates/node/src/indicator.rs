//! "Needs watering" LED.  The `gpio` feature gates the real rppal driver;
//! without it, a mock implementation logs level changes.

use anyhow::Result;

use crate::ports::Indicator;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

// ---------------------------------------------------------------------------
// Real GPIO LED (production — requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct StatusLed {
    pin: OutputPin,
    active_low: bool,
}

#[cfg(feature = "gpio")]
impl StatusLed {
    pub(crate) fn new(gpio_pin: u8, active_low: bool) -> Result<Self> {
        let pin = Gpio::new()?.get(gpio_pin)?.into_output();
        let mut led = Self { pin, active_low };
        led.set(false);
        tracing::info!(gpio_pin, active_low, "status led initialised");
        Ok(led)
    }
}

#[cfg(feature = "gpio")]
impl Indicator for StatusLed {
    fn set(&mut self, active: bool) {
        // active-low wiring: LOW = lit
        if active != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

// ---------------------------------------------------------------------------
// Mock LED (development — no hardware, logs level changes)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct StatusLed {
    lit: bool,
}

#[cfg(not(feature = "gpio"))]
impl StatusLed {
    pub(crate) fn new(gpio_pin: u8, _active_low: bool) -> Result<Self> {
        tracing::info!(gpio_pin, "[mock-gpio] status led registered (not wired)");
        Ok(Self { lit: false })
    }
}

#[cfg(not(feature = "gpio"))]
impl Indicator for StatusLed {
    fn set(&mut self, active: bool) {
        if self.lit != active {
            tracing::info!("[mock-gpio] status led {}", if active { "ON" } else { "OFF" });
        }
        self.lit = active;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
