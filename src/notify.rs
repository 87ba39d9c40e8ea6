use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::EventRecord;

const CHANNEL_CAPACITY: usize = 64;

/// Signals for rendering layers. Carried over a broadcast channel so any
/// number of listeners can subscribe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum TrackerEvent {
    EventRecorded(EventRecord),
    AchievementsUnlocked(Vec<String>),
}

#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<TrackerEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Delivers to current subscribers. Having none is not an error.
    pub fn emit(&self, event: TrackerEvent) {
        if self.sender.send(event).is_err() {
            log::debug!("No subscribers for tracker event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let notifier = Notifier::new();
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.emit(TrackerEvent::AchievementsUnlocked(vec!["first_session".into()]));

        let expected = TrackerEvent::AchievementsUnlocked(vec!["first_session".into()]);
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
    }

    #[test]
    fn emitting_without_subscribers_is_silent() {
        let notifier = Notifier::new();
        assert_eq!(notifier.subscriber_count(), 0);
        notifier.emit(TrackerEvent::AchievementsUnlocked(Vec::new()));
    }
}
