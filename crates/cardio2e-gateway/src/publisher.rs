//! Outbound MQTT sink

use rumqttc::{Client, QoS};
use tracing::{trace, warn};

/// Somewhere to publish gateway topics
///
/// Implemented for the rumqttc client; tests substitute a recorder.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str, retain: bool);
}

/// Never blocks: while the broker is unreachable and the request queue is
/// full, publishes are dropped so the bus listener keeps reading
impl Publisher for Client {
    fn publish(&self, topic: &str, payload: &str, retain: bool) {
        trace!("MQTT -> {} {}", topic, payload);
        let bytes = payload.as_bytes();
        if let Err(e) = self.try_publish(topic, QoS::AtLeastOnce, retain, bytes) {
            warn!("Dropped publish to {}: {}", topic, e);
        }
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::Publisher;
    use std::sync::Mutex;

    /// Keeps every publish for assertions
    #[derive(Default)]
    pub struct RecordingPublisher {
        published: Mutex<Vec<(String, String, bool)>>,
    }

    impl RecordingPublisher {
        pub fn published(&self) -> Vec<(String, String, bool)> {
            self.published.lock().unwrap().clone()
        }

        /// Last payload sent to `topic`
        pub fn last(&self, topic: &str) -> Option<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(t, _, _)| t == topic)
                .map(|(_, p, _)| p.clone())
        }

        pub fn topics(&self) -> Vec<String> {
            self.published().into_iter().map(|(t, _, _)| t).collect()
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, topic: &str, payload: &str, retain: bool) {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string(), retain));
        }
    }
}
