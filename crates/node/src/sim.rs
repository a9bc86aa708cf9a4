//! Stateful soil moisture probe simulator for development without hardware.
//!
//! Models capacitive probe behaviour in raw ADC units (wet = low, dry = high):
//! - Temporal coherence via random walk with mean reversion
//! - Gradual drying drift (evaporation)
//! - Per-reading electronic noise
//! - Occasional spikes (probe flakiness)
//! - Simulated watering once the soil gets dry, so alerts clear again

use std::fmt;

use crate::calibration::{CalibrationBounds, RawReading};
use crate::ports::Sensor;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    (0..12).map(|_| fastrand::f64()).sum::<f64>() - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Simulation profiles selectable via `sensor.sim_scenario` / `SIM_SCENARIO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Starts fairly wet and dries steadily.  Gets watered when it runs dry,
    /// so both alert transitions show up within a few hours of samples.
    Drying,
    /// Hovers near its start point.  Low noise, rare spikes.
    Stable,
    /// High noise and frequent spikes.  Exercises threshold flapping.
    Flaky,
    /// Starts near the wet end and barely moves.
    Wet,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "flaky" => Self::Flaky,
            "wet" => Self::Wet,
            _ => Self::Drying,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drying => "drying",
            Self::Stable => "stable",
            Self::Flaky => "flaky",
            Self::Wet => "wet",
        };
        f.write_str(name)
    }
}

/// Scenario parameters, all expressed as fractions of the calibrated span.
struct Profile {
    drift: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    noise_sigma: f64,
    spike_prob: f32,
    spike_sigma: f64,
    start_frac: f64,
    auto_water: bool,
}

impl Profile {
    fn for_scenario(scenario: Scenario) -> Self {
        match scenario {
            Scenario::Drying => Self {
                drift: 0.004,
                walk_sigma: 0.008,
                mean_reversion: 0.0,
                noise_sigma: 0.005,
                spike_prob: 0.03,
                spike_sigma: 0.12,
                start_frac: 0.3,
                auto_water: true,
            },
            Scenario::Stable => Self {
                drift: 0.0,
                walk_sigma: 0.004,
                mean_reversion: 0.05,
                noise_sigma: 0.003,
                spike_prob: 0.005,
                spike_sigma: 0.06,
                start_frac: 0.4,
                auto_water: false,
            },
            Scenario::Flaky => Self {
                drift: 0.002,
                walk_sigma: 0.015,
                mean_reversion: 0.02,
                noise_sigma: 0.02,
                spike_prob: 0.10,
                spike_sigma: 0.25,
                start_frac: 0.5,
                auto_water: true,
            },
            Scenario::Wet => Self {
                drift: 0.0005,
                walk_sigma: 0.005,
                mean_reversion: 0.03,
                noise_sigma: 0.004,
                spike_prob: 0.02,
                spike_sigma: 0.1,
                start_frac: 0.1,
                auto_water: false,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Watering starts once the soil is this far toward dry...
const WATER_START_FRAC: f64 = 0.85;
/// ...and stops once it is back to this.
const WATER_STOP_FRAC: f64 = 0.15;
/// Per-sample change while watering (negative = wetter).
const WATER_RATE_FRAC: f64 = -0.08;

pub struct SoilMoistureSim {
    profile: Profile,
    wet_raw: f64,
    range: f64,
    adc_max: f64,
    /// Current "true" soil moisture in ADC units.  Evolves each sample.
    base: f64,
    /// Point the walk reverts toward.
    anchor: f64,
    watering: bool,
}

impl SoilMoistureSim {
    pub fn new(scenario: Scenario, bounds: CalibrationBounds, adc_max: RawReading) -> Self {
        let profile = Profile::for_scenario(scenario);
        let wet_raw = f64::from(bounds.wet_raw());
        let range = f64::from(bounds.dry_raw() - bounds.wet_raw());
        let anchor = wet_raw + profile.start_frac * range;

        Self {
            profile,
            wet_raw,
            range,
            adc_max: f64::from(adc_max),
            base: anchor,
            anchor,
            watering: false,
        }
    }

    /// Position of `base` inside the calibrated span: 0.0 wet, 1.0 dry.
    fn dryness(&self) -> f64 {
        (self.base - self.wet_raw) / self.range
    }

    fn update_watering(&mut self) {
        if !self.profile.auto_water {
            return;
        }
        let dryness = self.dryness();
        if !self.watering && dryness >= WATER_START_FRAC {
            self.watering = true;
            tracing::debug!("[sim] plant is being watered");
        } else if self.watering && dryness <= WATER_STOP_FRAC {
            self.watering = false;
            tracing::debug!("[sim] watering finished");
        }
    }

    /// Produce the next raw reading.  Each call advances the internal state.
    pub fn sample(&mut self) -> RawReading {
        let p = &self.profile;

        // -- Evolve the base value ----------------------------------------
        let pull = p.mean_reversion * (self.anchor - self.base);
        let walk = gaussian(0.0, p.walk_sigma * self.range);
        let drift = p.drift * self.range;
        let wet = if self.watering {
            WATER_RATE_FRAC * self.range
        } else {
            0.0
        };

        let margin = 0.05 * self.range;
        self.base = (self.base + drift + pull + walk + wet)
            .clamp(self.wet_raw - margin, self.wet_raw + self.range + margin);

        self.update_watering();

        // -- Build the instantaneous reading ------------------------------
        let p = &self.profile;
        let noise = gaussian(0.0, p.noise_sigma * self.range);
        let spike = if fastrand::f32() < p.spike_prob {
            gaussian(0.0, p.spike_sigma * self.range)
        } else {
            0.0
        };

        // Clamped to the ADC's native range before the cast.
        (self.base + noise + spike).round().clamp(0.0, self.adc_max) as RawReading
    }

    #[cfg(test)]
    fn is_watering(&self) -> bool {
        self.watering
    }
}

impl Sensor for SoilMoistureSim {
    fn read(&mut self) -> RawReading {
        self.sample()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
