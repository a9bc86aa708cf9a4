use rumqttc::{AsyncClient, Publish, QoS};
use tracing::{debug, error};

use crate::command::{self, Handled};
use crate::ports::{Channel, Notifier, Persistence, Telemetry};
use crate::threshold::ThresholdStore;

// ---------------------------------------------------------------------------
// Topic layout
// ---------------------------------------------------------------------------

/// Topics under a common base, e.g. `soilscan/plant/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Topics {
    raw: String,
    percent: String,
    status: String,
    alert: String,
    notify: String,
    set_type: String,
}

impl Topics {
    pub(crate) fn new(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            raw: format!("{base}/raw_reading"),
            percent: format!("{base}/moisture_percent"),
            status: format!("{base}/status"),
            alert: format!("{base}/alert"),
            notify: format!("{base}/notify"),
            set_type: format!("{base}/set_type"),
        }
    }

    pub(crate) fn channel(&self, channel: Channel) -> &str {
        match channel {
            Channel::Raw => &self.raw,
            Channel::Percent => &self.percent,
            Channel::Status => &self.status,
            Channel::Alert => &self.alert,
        }
    }

    pub(crate) fn notify(&self) -> &str {
        &self.notify
    }

    /// Inbound configuration topic.
    pub(crate) fn set_type(&self) -> &str {
        &self.set_type
    }
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Telemetry and notifications over one MQTT client.  Publishes are queued
/// with `try_publish` so callers never wait on the broker; a full queue or a
/// closed event loop is logged and the message dropped.
#[derive(Clone)]
pub(crate) struct MqttPublisher {
    client: AsyncClient,
    topics: Topics,
}

impl MqttPublisher {
    pub(crate) fn new(client: AsyncClient, topics: Topics) -> Self {
        Self { client, topics }
    }

    fn send(&self, topic: &str, payload: &str) {
        match self
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
        {
            Ok(()) => debug!(topic, payload, "queued publish"),
            Err(e) => error!(topic, "publish failed: {e}"),
        }
    }
}

impl Telemetry for MqttPublisher {
    fn publish(&self, channel: Channel, payload: &str) {
        self.send(self.topics.channel(channel), payload);
    }
}

impl Notifier for MqttPublisher {
    fn notify(&self, text: &str) {
        self.send(self.topics.notify(), text);
    }
}

// ---------------------------------------------------------------------------
// Inbound dispatch
// ---------------------------------------------------------------------------

/// Route one inbound publish to the command handler.
pub(crate) async fn dispatch<P, N>(
    publish: &Publish,
    topics: &Topics,
    store: &ThresholdStore<P>,
    notifier: &N,
) -> Handled
where
    P: Persistence,
    N: Notifier,
{
    debug!(topic = %publish.topic, bytes = publish.payload.len(), "inbound message");
    let handled = command::handle(&publish.topic, &publish.payload, topics, store, notifier).await;
    if handled == Handled::Ignored {
        debug!(topic = %publish.topic, "unhandled topic");
    }
    handled
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::fakes::{MemoryPersistence, RecordingNotifier};
    use rumqttc::Request;

    const BASE: &str = "soilscan/plant";

    // -- Topics -------------------------------------------------------------

    #[test]
    fn topics_share_base() {
        let t = Topics::new(BASE);
        assert_eq!(t.channel(Channel::Raw), "soilscan/plant/raw_reading");
        assert_eq!(t.channel(Channel::Percent), "soilscan/plant/moisture_percent");
        assert_eq!(t.channel(Channel::Status), "soilscan/plant/status");
        assert_eq!(t.channel(Channel::Alert), "soilscan/plant/alert");
        assert_eq!(t.notify(), "soilscan/plant/notify");
        assert_eq!(t.set_type(), "soilscan/plant/set_type");
    }

    #[test]
    fn topics_trailing_slash_ignored() {
        assert_eq!(Topics::new("greenhouse/"), Topics::new("greenhouse"));
    }

    // -- Publisher ----------------------------------------------------------

    /// Publisher whose requests land in a channel the test can drain.
    fn publisher(cap: usize) -> (MqttPublisher, flume::Receiver<Request>) {
        let (tx, rx) = flume::bounded(cap);
        let client = AsyncClient::from_senders(tx);
        (MqttPublisher::new(client, Topics::new(BASE)), rx)
    }

    /// Drain every queued publish as (topic, qos, retain, payload).
    fn queued(rx: &flume::Receiver<Request>) -> Vec<(String, QoS, bool, String)> {
        rx.try_iter()
            .map(|req| match req {
                Request::Publish(p) => (
                    p.topic,
                    p.qos,
                    p.retain,
                    String::from_utf8(p.payload.to_vec()).unwrap(),
                ),
                other => panic!("expected a publish, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn telemetry_routes_each_channel_to_its_topic() {
        let (p, rx) = publisher(10);
        p.publish(Channel::Raw, "2611");
        p.publish(Channel::Percent, "51%");
        p.publish(Channel::Status, "DRY");
        p.publish(Channel::Alert, "WATER_NOW");

        let topics: Vec<_> = queued(&rx).into_iter().map(|(t, _, _, payload)| (t, payload)).collect();
        assert_eq!(
            topics,
            vec![
                ("soilscan/plant/raw_reading".to_string(), "2611".to_string()),
                ("soilscan/plant/moisture_percent".to_string(), "51%".to_string()),
                ("soilscan/plant/status".to_string(), "DRY".to_string()),
                ("soilscan/plant/alert".to_string(), "WATER_NOW".to_string()),
            ]
        );
    }

    #[test]
    fn notifications_go_to_notify_topic() {
        let (p, rx) = publisher(10);
        p.notify("SoilScan alert: moisture dropped to 30%. Time to water!");

        let sent = queued(&rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "soilscan/plant/notify");
        assert_eq!(sent[0].3, "SoilScan alert: moisture dropped to 30%. Time to water!");
    }

    #[test]
    fn publishes_are_qos1_and_not_retained() {
        let (p, rx) = publisher(10);
        p.publish(Channel::Status, "WET");
        p.notify("hello");

        let sent = queued(&rx);
        assert_eq!(sent.len(), 2);
        for (topic, qos, retain, _) in sent {
            assert_eq!(qos, QoS::AtLeastOnce, "{topic}");
            assert!(!retain, "{topic} must not be retained");
        }
    }

    #[test]
    fn full_queue_drops_extra_messages() {
        let (p, rx) = publisher(1);
        p.publish(Channel::Raw, "1");
        p.publish(Channel::Raw, "2");
        p.notify("dropped");

        let sent = queued(&rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].3, "1");
    }

    #[test]
    fn closed_request_queue_drops_without_panicking() {
        let (p, rx) = publisher(10);
        drop(rx);
        p.publish(Channel::Status, "DRY");
        p.notify("nobody listening");
    }

    // -- Inbound dispatch ---------------------------------------------------

    fn inbound(topic: &str, payload: &str) -> Publish {
        Publish::new(topic, QoS::AtMostOnce, payload)
    }

    #[tokio::test]
    async fn dispatch_applies_profile_from_config_topic() {
        let topics = Topics::new(BASE);
        let store = ThresholdStore::new(MemoryPersistence::default());
        let notifier = RecordingNotifier::default();

        let handled = dispatch(&inbound(topics.set_type(), "cacto"), &topics, &store, &notifier).await;

        assert!(matches!(handled, Handled::Applied(_)));
        assert_eq!(store.get().await.get(), 20);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_ignores_other_topics() {
        let topics = Topics::new(BASE);
        let store = ThresholdStore::new(MemoryPersistence::default());
        let notifier = RecordingNotifier::default();

        let handled =
            dispatch(&inbound("soilscan/plant/status", "cacto"), &topics, &store, &notifier).await;

        assert_eq!(handled, Handled::Ignored);
        assert!(notifier.sent().is_empty());
        assert_eq!(store.get().await.get(), 35);
    }

    #[tokio::test]
    async fn dispatch_confirmation_published_on_notify_topic() {
        let topics = Topics::new(BASE);
        let store = ThresholdStore::new(MemoryPersistence::default());
        let (p, rx) = publisher(10);

        dispatch(&inbound(topics.set_type(), "samambaia"), &topics, &store, &p).await;

        let sent = queued(&rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "soilscan/plant/notify");
        assert!(sent[0].3.contains("50%"), "got: {}", sent[0].3);
    }

    #[tokio::test]
    async fn dispatch_rejection_published_on_notify_topic() {
        let topics = Topics::new(BASE);
        let store = ThresholdStore::new(MemoryPersistence::default());
        let (p, rx) = publisher(10);

        let handled = dispatch(&inbound(topics.set_type(), "bananeira"), &topics, &store, &p).await;

        assert_eq!(handled, Handled::Rejected("bananeira".into()));
        let sent = queued(&rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "soilscan/plant/notify");
        assert!(sent[0].3.contains("'bananeira'"), "got: {}", sent[0].3);
    }
}
