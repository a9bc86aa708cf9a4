//! Raw ADC reading → wetness percentage.
//!
//! Capacitive soil sensors read *higher* when the soil is drier, so the
//! mapping is an inverse linear interpolation between the reading taken in
//! saturated soil (`wet_raw`) and the one taken in dry air (`dry_raw`).

use thiserror::Error;

/// Sensor-native ADC units (0–4095 on a 12-bit converter).
pub(crate) type RawReading = u16;

/// Calibrated moisture, 0 = bone dry, 100 = saturated.
pub(crate) type WetnessPercent = u8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CalibrationError {
    #[error("wet_raw ({wet_raw}) must be below dry_raw ({dry_raw})")]
    Inverted { wet_raw: RawReading, dry_raw: RawReading },
}

/// Calibration endpoints. Always satisfies `wet_raw < dry_raw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CalibrationBounds {
    wet_raw: RawReading,
    dry_raw: RawReading,
}

impl CalibrationBounds {
    pub(crate) fn new(wet_raw: RawReading, dry_raw: RawReading) -> Result<Self, CalibrationError> {
        if wet_raw >= dry_raw {
            return Err(CalibrationError::Inverted { wet_raw, dry_raw });
        }
        Ok(Self { wet_raw, dry_raw })
    }

    pub(crate) fn wet_raw(&self) -> RawReading {
        self.wet_raw
    }

    pub(crate) fn dry_raw(&self) -> RawReading {
        self.dry_raw
    }
}

/// Convert a raw reading to a percentage. Readings outside the calibration
/// window are clamped first so sensor drift never produces values outside
/// `[0, 100]`.
pub(crate) fn map(raw: RawReading, bounds: CalibrationBounds) -> WetnessPercent {
    let wet = u32::from(bounds.wet_raw);
    let dry = u32::from(bounds.dry_raw);
    let raw = u32::from(raw).clamp(wet, dry);

    let dryness = ((raw - wet) * 100) / (dry - wet);
    (100 - dryness) as WetnessPercent
}

// ===========================================================================
// Tests
// ===========================================================================
