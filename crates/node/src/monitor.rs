//! Periodic sampling loop.
//!
//! Every cycle publishes the raw and calibrated readings and re-drives the
//! indicator.  Status/alert telemetry and operator notifications only go out
//! on the first (seeding) cycle and on an [`AlertState`] transition.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::alert::{AlertMachine, AlertState, Transition};
use crate::calibration::{self, CalibrationBounds, RawReading, WetnessPercent};
use crate::ports::{Channel, Indicator, Notifier, Persistence, Sensor, Telemetry};
use crate::threshold::{Threshold, ThresholdStore};

/// What happened during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CycleReport {
    pub(crate) raw: RawReading,
    pub(crate) percent: WetnessPercent,
    pub(crate) state: AlertState,
    pub(crate) event: CycleEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleEvent {
    /// First cycle: state seeded, start-up summary sent.
    Seeded,
    Transition(Transition),
    Steady,
}

pub(crate) struct Monitor<S, I, T, N> {
    sensor: S,
    indicator: I,
    telemetry: T,
    notifier: N,
    bounds: CalibrationBounds,
    alert: Option<AlertMachine>,
}

impl<S, I, T, N> Monitor<S, I, T, N>
where
    S: Sensor,
    I: Indicator,
    T: Telemetry,
    N: Notifier,
{
    pub(crate) fn new(sensor: S, indicator: I, telemetry: T, notifier: N, bounds: CalibrationBounds) -> Self {
        Self {
            sensor,
            indicator,
            telemetry,
            notifier,
            bounds,
            alert: None,
        }
    }

    /// Sample every `every`, reading the threshold fresh each cycle.  The
    /// first cycle runs immediately.
    pub(crate) async fn run<P: Persistence>(mut self, store: Arc<ThresholdStore<P>>, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(every_s = every.as_secs(), "monitor started");

        loop {
            ticker.tick().await;
            let threshold = store.get().await;
            self.cycle(threshold);
        }
    }

    pub(crate) fn cycle(&mut self, threshold: Threshold) -> CycleReport {
        let raw = self.sensor.read();
        let percent = calibration::map(raw, self.bounds);

        info!(raw, percent, threshold = threshold.get(), "reading");

        self.telemetry.publish(Channel::Raw, &raw.to_string());
        self.telemetry.publish(Channel::Percent, &format!("{percent}%"));

        let (state, event) = match self.alert {
            None => {
                let machine = AlertMachine::seed(percent, threshold);
                self.alert = Some(machine);
                let state = machine.state();
                self.publish_state(state);
                self.notifier.notify(&startup_message(state, percent));
                (state, CycleEvent::Seeded)
            }
            Some(mut machine) => {
                let transition = machine.step(percent, threshold);
                self.alert = Some(machine);
                match transition {
                    Some(transition) => {
                        let state = transition.target();
                        match transition {
                            Transition::BecameDry => info!(percent, "plant dried out; alerting"),
                            Transition::BecameWet => info!(percent, "plant watered; clearing alert"),
                        }
                        self.publish_state(state);
                        self.notifier.notify(&transition_message(transition, percent));
                        (state, CycleEvent::Transition(transition))
                    }
                    None => (machine.state(), CycleEvent::Steady),
                }
            }
        };

        self.indicator.set(state.is_dry());

        CycleReport {
            raw,
            percent,
            state,
            event,
        }
    }

    fn publish_state(&self, state: AlertState) {
        self.telemetry.publish(Channel::Status, state.status());
        self.telemetry.publish(Channel::Alert, state.directive());
    }
}

// ---------------------------------------------------------------------------
// Operator-facing text
// ---------------------------------------------------------------------------

fn startup_message(state: AlertState, percent: WetnessPercent) -> String {
    match state {
        AlertState::Dry => format!(
            "SoilScan started!\nYour plant is already dry, with only {percent}% moisture."
        ),
        AlertState::Wet => format!(
            "SoilScan started!\nYour plant is at {percent}% moisture. No need to water right now."
        ),
    }
}

fn transition_message(transition: Transition, percent: WetnessPercent) -> String {
    match transition {
        Transition::BecameDry => {
            format!("SoilScan alert: moisture dropped to {percent}%. Time to water!")
        }
        Transition::BecameWet => {
            format!("SoilScan: thanks for watering! Moisture is back to {percent}%.")
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::fakes::{
        MemoryPersistence, RecordingIndicator, RecordingNotifier, RecordingTelemetry,
        ScriptedSensor,
    };

    const WET_RAW: RawReading = 1406;
    const DRY_RAW: RawReading = 3817;

    type TestMonitor =
        Monitor<ScriptedSensor, RecordingIndicator, RecordingTelemetry, RecordingNotifier>;

    struct Harness {
        monitor: TestMonitor,
        indicator: RecordingIndicator,
        telemetry: RecordingTelemetry,
        notifier: RecordingNotifier,
    }

    fn harness(readings: &[RawReading]) -> Harness {
        let indicator = RecordingIndicator::default();
        let telemetry = RecordingTelemetry::default();
        let notifier = RecordingNotifier::default();
        let monitor = Monitor::new(
            ScriptedSensor::new(readings),
            indicator.clone(),
            telemetry.clone(),
            notifier.clone(),
            CalibrationBounds::new(WET_RAW, DRY_RAW).unwrap(),
        );
        Harness {
            monitor,
            indicator,
            telemetry,
            notifier,
        }
    }

    /// Raw value whose calibrated percentage is exactly `percent`.
    fn raw_for(percent: u32) -> RawReading {
        let span = u32::from(DRY_RAW - WET_RAW);
        // Round the dryness fraction up so truncation lands on `percent`.
        let dryness = 100 - percent;
        let raw = u32::from(WET_RAW) + (dryness * span).div_ceil(100);
        raw as RawReading
    }

    // -- First cycle --------------------------------------------------------

    #[test]
    fn first_cycle_seeds_and_reports_summary() {
        let mut h = harness(&[raw_for(60)]);
        let report = h.monitor.cycle(Threshold::DEFAULT);

        assert_eq!(report.percent, 60);
        assert_eq!(report.event, CycleEvent::Seeded);
        assert_eq!(report.state, AlertState::Wet);
        assert_eq!(h.telemetry.on(Channel::Status), vec!["WET"]);
        assert_eq!(h.telemetry.on(Channel::Alert), vec!["OK"]);
        assert_eq!(h.indicator.levels(), vec![false]);

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("SoilScan started!"), "got: {}", sent[0]);
        assert!(sent[0].contains("60%"));
    }

    #[test]
    fn first_cycle_already_dry_lights_indicator() {
        let mut h = harness(&[DRY_RAW]);
        let report = h.monitor.cycle(Threshold::DEFAULT);

        assert_eq!(report.state, AlertState::Dry);
        assert_eq!(report.event, CycleEvent::Seeded);
        assert_eq!(h.indicator.levels(), vec![true]);
        assert_eq!(h.telemetry.on(Channel::Alert), vec!["WATER_NOW"]);
        assert!(h.notifier.sent()[0].contains("already dry"));
    }

    // -- Transitions --------------------------------------------------------

    #[test]
    fn percent_sequence_notifies_once_each_way() {
        let readings: Vec<RawReading> = [50, 40, 30, 45].iter().map(|&p| raw_for(p)).collect();
        let mut h = harness(&readings);

        let events: Vec<CycleEvent> = (0..4)
            .map(|_| h.monitor.cycle(Threshold::DEFAULT).event)
            .collect();

        assert_eq!(
            events,
            vec![
                CycleEvent::Seeded,
                CycleEvent::Steady,
                CycleEvent::Transition(Transition::BecameDry),
                CycleEvent::Transition(Transition::BecameWet),
            ]
        );

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 3, "startup + dry + wet, got {sent:?}");
        assert!(sent[1].contains("dropped to 30%"), "got: {}", sent[1]);
        assert!(sent[2].contains("back to 45%"), "got: {}", sent[2]);

        assert_eq!(h.indicator.levels(), vec![false, false, true, false]);
        assert_eq!(h.telemetry.on(Channel::Status), vec!["WET", "DRY", "WET"]);
        assert_eq!(h.telemetry.on(Channel::Alert), vec!["OK", "WATER_NOW", "OK"]);
    }

    #[test]
    fn telemetry_published_every_cycle() {
        let mut h = harness(&[raw_for(80); 7]);
        for _ in 0..7 {
            h.monitor.cycle(Threshold::DEFAULT);
        }

        assert_eq!(h.telemetry.on(Channel::Raw).len(), 7);
        assert_eq!(h.telemetry.on(Channel::Percent), vec!["80%"; 7]);
        assert_eq!(h.indicator.levels().len(), 7);
        // Only the seeding cycle reports status.
        assert_eq!(h.telemetry.on(Channel::Status).len(), 1);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[test]
    fn raw_payload_is_decimal() {
        let mut h = harness(&[2611]);
        h.monitor.cycle(Threshold::DEFAULT);
        assert_eq!(h.telemetry.on(Channel::Raw), vec!["2611"]);
    }

    // -- End-to-end calibration scenario ------------------------------------

    #[test]
    fn calibrated_scenario() {
        let mut h = harness(&[2611, DRY_RAW, WET_RAW, 2611]);

        let seed = h.monitor.cycle(Threshold::DEFAULT);
        assert_eq!(seed.state, AlertState::Wet);

        let dry = h.monitor.cycle(Threshold::DEFAULT);
        assert_eq!(dry.percent, 0);
        assert_eq!(dry.event, CycleEvent::Transition(Transition::BecameDry));
        assert_eq!(h.indicator.levels().last(), Some(&true));
        assert_eq!(h.notifier.sent().len(), 2);

        let wet = h.monitor.cycle(Threshold::DEFAULT);
        assert_eq!(wet.percent, 100);
        assert_eq!(wet.event, CycleEvent::Transition(Transition::BecameWet));
        assert_eq!(h.indicator.levels().last(), Some(&false));
        assert_eq!(h.notifier.sent().len(), 3);

        let mid = h.monitor.cycle(Threshold::DEFAULT);
        assert_eq!(mid.percent, 51);
        assert_eq!(mid.event, CycleEvent::Steady);
        assert_eq!(h.notifier.sent().len(), 3);
    }

    // -- Threshold visibility -----------------------------------------------

    #[tokio::test]
    async fn threshold_change_seen_by_next_cycle() {
        let store = ThresholdStore::new(MemoryPersistence::default());
        let mut h = harness(&[raw_for(30); 2]);

        store.set(20).await.unwrap();
        let first = h.monitor.cycle(store.get().await);
        assert_eq!(first.state, AlertState::Wet);

        store.set(50).await.unwrap();
        let second = h.monitor.cycle(store.get().await);
        assert_eq!(second.event, CycleEvent::Transition(Transition::BecameDry));
    }

    #[tokio::test(start_paused = true)]
    async fn run_samples_on_every_tick() {
        let store = Arc::new(ThresholdStore::new(MemoryPersistence::default()));
        let h = harness(&[raw_for(60)]);
        let telemetry = h.telemetry.clone();

        let task = tokio::spawn(h.monitor.run(Arc::clone(&store), Duration::from_secs(30)));

        // Immediate first tick plus three more.
        tokio::time::sleep(Duration::from_secs(95)).await;
        task.abort();

        assert_eq!(telemetry.on(Channel::Raw).len(), 4);
    }

    #[test]
    fn raw_for_hits_requested_percent() {
        for p in [0, 1, 30, 35, 45, 50, 99, 100] {
            let b = CalibrationBounds::new(WET_RAW, DRY_RAW).unwrap();
            assert_eq!(u32::from(calibration::map(raw_for(p), b)), p);
        }
    }
}
