//! The active "dry" threshold: a single shared cell, restored at boot and
//! written through to durable storage when it changes.

use std::fmt;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::command::PlantProfile;
use crate::ports::Persistence;

/// Storage key of the persisted threshold.
pub(crate) const THRESHOLD_KEY: &str = "threshold";

// ---------------------------------------------------------------------------
// Threshold value
// ---------------------------------------------------------------------------

/// Wetness percentage below which the plant counts as dry.  Always in
/// `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Threshold(u8);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ThresholdError {
    #[error("threshold {0} out of range [0, 100]")]
    OutOfRange(i64),
}

impl Threshold {
    pub(crate) const DEFAULT: Threshold = PlantProfile::Standard.threshold();

    pub(crate) fn new(value: i64) -> Result<Self, ThresholdError> {
        match u8::try_from(value) {
            Ok(v) if v <= 100 => Ok(Self(v)),
            _ => Err(ThresholdError::OutOfRange(value)),
        }
    }

    /// Only for compile-time profile constants, which are known to be in range.
    pub(crate) const fn from_const(value: u8) -> Self {
        assert!(value <= 100);
        Self(value)
    }

    pub(crate) fn get(self) -> u8 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SetOutcome {
    /// New value is active; `persisted` is false when the write failed.
    Updated { persisted: bool },
    /// Value equals the current one; nothing was written.
    Unchanged,
}

pub(crate) struct ThresholdStore<P> {
    current: Mutex<Threshold>,
    persistence: P,
}

impl<P: Persistence> ThresholdStore<P> {
    pub(crate) fn new(persistence: P) -> Self {
        Self {
            current: Mutex::new(Threshold::DEFAULT),
            persistence,
        }
    }

    pub(crate) async fn get(&self) -> Threshold {
        *self.current.lock().await
    }

    /// Validate and apply `value`.  The in-memory value is committed before
    /// the persistence write; a failed write is logged and otherwise ignored.
    pub(crate) async fn set(&self, value: i64) -> Result<SetOutcome, ThresholdError> {
        let new = Threshold::new(value)?;

        {
            let mut current = self.current.lock().await;
            if *current == new {
                return Ok(SetOutcome::Unchanged);
            }
            *current = new;
        }

        let persisted = match self.persistence.save(THRESHOLD_KEY, i64::from(new.get())).await {
            Ok(()) => {
                info!(threshold = new.get(), "threshold saved");
                true
            }
            Err(e) => {
                error!(threshold = new.get(), "failed to save threshold: {e:#}");
                false
            }
        };

        Ok(SetOutcome::Updated { persisted })
    }

    /// Restore the persisted threshold, keeping the default when nothing
    /// usable is stored.  Never fails.
    pub(crate) async fn load_or_default(&self) -> Threshold {
        let loaded = match self.persistence.load(THRESHOLD_KEY).await {
            Ok(Some(v)) => match Threshold::new(v) {
                Ok(t) => Some(t),
                Err(e) => {
                    warn!("stored threshold rejected ({e}); using default {}", Threshold::DEFAULT);
                    None
                }
            },
            Ok(None) => {
                warn!("no threshold saved; using default {}", Threshold::DEFAULT);
                None
            }
            Err(e) => {
                warn!("threshold storage unavailable ({e:#}); using default {}", Threshold::DEFAULT);
                None
            }
        };

        let mut current = self.current.lock().await;
        if let Some(t) = loaded {
            info!(threshold = t.get(), "threshold restored");
            *current = t;
        }
        *current
    }

    #[cfg(test)]
    pub(crate) fn persistence(&self) -> &P {
        &self.persistence
    }
}

// ===========================================================================
// Tests
// ===========================================================================
