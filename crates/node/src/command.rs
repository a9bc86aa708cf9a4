//! Remote reconfiguration: plant-type tokens received on the `set_type` topic
//! are resolved to a dry threshold and applied to the [`ThresholdStore`].

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::mqtt::Topics;
use crate::ports::{Notifier, Persistence};
use crate::threshold::{SetOutcome, Threshold, ThresholdStore};

// ---------------------------------------------------------------------------
// Plant profiles
// ---------------------------------------------------------------------------

/// Named threshold presets selectable over MQTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlantProfile {
    Standard,
    Cactus,
    Fern,
}

/// Token → profile table.  Matching is exact and case-sensitive.
const PROFILES: [(&str, PlantProfile); 3] = [
    ("padrao", PlantProfile::Standard),
    ("cacto", PlantProfile::Cactus),
    ("samambaia", PlantProfile::Fern),
];

impl PlantProfile {
    pub(crate) fn from_token(token: &str) -> Option<Self> {
        PROFILES
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, p)| *p)
    }

    pub(crate) fn token(self) -> &'static str {
        match self {
            Self::Standard => "padrao",
            Self::Cactus => "cacto",
            Self::Fern => "samambaia",
        }
    }

    pub(crate) const fn threshold(self) -> Threshold {
        match self {
            Self::Standard => Threshold::from_const(35),
            Self::Cactus => Threshold::from_const(20),
            Self::Fern => Threshold::from_const(50),
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Standard => "Standard plant",
            Self::Cactus => "Cactus/Succulent",
            Self::Fern => "Fern (water lover)",
        }
    }
}

impl fmt::Display for PlantProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `'padrao', 'cacto' or 'samambaia'`
fn valid_tokens() -> String {
    let quoted: Vec<String> = PROFILES.iter().map(|(t, _)| format!("'{t}'")).collect();
    match quoted.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} or {last}", rest.join(", ")),
        Some((last, _)) => last.clone(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThresholdChangeRequest {
    pub(crate) new_value: Threshold,
    pub(crate) profile: PlantProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Message was not on the configuration topic.
    Ignored,
    /// Recognised profile whose threshold is already active.
    Unchanged(PlantProfile),
    Change(ThresholdChangeRequest),
}

/// Unrecognised plant type; carries the payload verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown plant type '{payload}'")]
pub(crate) struct Rejected {
    pub(crate) payload: String,
}

pub(crate) fn interpret(
    topic: &str,
    payload: &[u8],
    config_topic: &str,
    current: Threshold,
) -> Result<Outcome, Rejected> {
    if topic != config_topic {
        return Ok(Outcome::Ignored);
    }

    let text = String::from_utf8_lossy(payload);
    let profile = PlantProfile::from_token(&text).ok_or_else(|| Rejected {
        payload: text.to_string(),
    })?;

    let new_value = profile.threshold();
    if new_value == current {
        Ok(Outcome::Unchanged(profile))
    } else {
        Ok(Outcome::Change(ThresholdChangeRequest { new_value, profile }))
    }
}

// ---------------------------------------------------------------------------
// Handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Handled {
    Ignored,
    Rejected(String),
    Unchanged(PlantProfile),
    Applied(ThresholdChangeRequest),
}

/// Process one inbound message.  Returns once any threshold change is
/// committed in memory, so the next monitor cycle sees it.
pub(crate) async fn handle<P, N>(
    topic: &str,
    payload: &[u8],
    topics: &Topics,
    store: &ThresholdStore<P>,
    notifier: &N,
) -> Handled
where
    P: Persistence,
    N: Notifier,
{
    let current = store.get().await;

    match interpret(topic, payload, topics.set_type(), current) {
        Ok(Outcome::Ignored) => Handled::Ignored,
        Ok(Outcome::Unchanged(profile)) => {
            info!(
                profile = profile.token(),
                threshold = current.get(),
                "plant type unchanged; nothing to do"
            );
            Handled::Unchanged(profile)
        }
        Ok(Outcome::Change(req)) => {
            match store.set(i64::from(req.new_value.get())).await {
                Ok(SetOutcome::Updated { persisted }) => {
                    info!(
                        profile = req.profile.token(),
                        threshold = req.new_value.get(),
                        persisted,
                        "threshold reconfigured"
                    );
                    notifier.notify(&format!(
                        "SoilScan reconfigured!\nType: {}\nWatering alert below: {}",
                        req.profile, req.new_value
                    ));
                    Handled::Applied(req)
                }
                Ok(SetOutcome::Unchanged) => Handled::Unchanged(req.profile),
                // Profile thresholds are compile-time constants in [0, 100].
                Err(e) => {
                    warn!("profile threshold rejected by store: {e}");
                    Handled::Rejected(req.profile.token().to_string())
                }
            }
        }
        Err(rejected) => {
            warn!(payload = %rejected.payload, "unknown plant type");
            notifier.notify(&format!(
                "SoilScan: command '{}' not recognized. Use {}.",
                rejected.payload,
                valid_tokens()
            ));
            Handled::Rejected(rejected.payload)
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
