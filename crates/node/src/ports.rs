//! Port traits: the boundary between the moisture logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Monitor / ThresholdStore / command::handle
//! ```
//!
//! Sensor, indicator, telemetry and notifier calls are infallible from the
//! caller's point of view: adapters log their own failures.  Persistence is
//! the only port that reports errors, because the threshold store decides
//! what to do about them.

use std::future::Future;

use crate::calibration::RawReading;

// ---------------------------------------------------------------------------
// Hardware
// ---------------------------------------------------------------------------

/// Moisture probe.  Always returns a value in the ADC's native range.
pub(crate) trait Sensor {
    fn read(&mut self) -> RawReading;
}

/// "Needs watering" indicator output (an LED on the reference board).
pub(crate) trait Indicator {
    fn set(&mut self, active: bool);
}

// ---------------------------------------------------------------------------
// Outbound messaging
// ---------------------------------------------------------------------------

/// Telemetry channels published by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Channel {
    Raw,
    Percent,
    Status,
    Alert,
}

/// Fire-and-forget telemetry publish.
pub(crate) trait Telemetry {
    fn publish(&self, channel: Channel, payload: &str);
}

/// Best-effort delivery of human-readable text to the operator.
pub(crate) trait Notifier {
    fn notify(&self, text: &str);
}

// ---------------------------------------------------------------------------
// Durable storage
// ---------------------------------------------------------------------------

/// Integer key/value medium.  Both calls may fail; callers treat failures as
/// non-fatal.
pub(crate) trait Persistence: Send + Sync {
    fn save(&self, key: &str, value: i64) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn load(&self, key: &str) -> impl Future<Output = anyhow::Result<Option<i64>>> + Send;
}

// ===========================================================================
// Test doubles
// ===========================================================================
