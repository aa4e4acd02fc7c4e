//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Presence`] | Who is being tracked, live mood |
//! | [`Topic::Consent`] | Enrollment prompt opened / closed / failed |
//! | [`Topic::Speech`] | Live transcript, listening and speaking indicators |
//! | [`Topic::Memory`] | Consolidated conversation summaries |
//! | [`Topic::Reminders`] | Wake-window reminders |
//!
//! Every event is additionally mirrored onto a firehose channel
//! ([`EventBus::subscribe_all`]) for consoles and loggers that want
//! everything.

use reminisce_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Presence,
    Consent,
    Speech,
    Memory,
    Reminders,
}

impl Topic {
    /// The lane a payload belongs on.
    pub fn of(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::PresenceChanged { .. } | EventPayload::LiveMood { .. } => Topic::Presence,
            EventPayload::ConsentRequested
            | EventPayload::ConsentClosed { .. }
            | EventPayload::EnrollmentFailed { .. } => Topic::Consent,
            EventPayload::TranscriptUpdated { .. }
            | EventPayload::Listening(_)
            | EventPayload::Speaking(_) => Topic::Speech,
            EventPayload::MemoryConsolidated { .. } => Topic::Memory,
            EventPayload::Reminder(_) => Topic::Reminders,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    firehose: broadcast::Sender<Event>,
    presence: broadcast::Sender<Event>,
    consent: broadcast::Sender<Event>,
    speech: broadcast::Sender<Event>,
    memory: broadcast::Sender<Event>,
    reminders: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (firehose, _) = broadcast::channel(capacity);
        let (presence, _) = broadcast::channel(capacity);
        let (consent, _) = broadcast::channel(capacity);
        let (speech, _) = broadcast::channel(capacity);
        let (memory, _) = broadcast::channel(capacity);
        let (reminders, _) = broadcast::channel(capacity);
        Self {
            firehose,
            presence,
            consent,
            speech,
            memory,
            reminders,
        }
    }

    /// Publish `event` on the lane matching its payload and on the firehose.
    ///
    /// Returns the number of receivers that were handed the event. Having no
    /// listeners is normal for a display projection and yields `0`.
    pub fn publish(&self, event: Event) -> usize {
        let topic = Topic::of(&event.payload);
        let on_topic = self.topic_sender(topic).send(event.clone()).unwrap_or(0);
        let on_firehose = self.firehose.send(event).unwrap_or(0);
        on_topic + on_firehose
    }

    /// Convenience wrapper that stamps `payload` into a fresh [`Event`].
    pub fn emit(&self, source: &str, payload: EventPayload) -> usize {
        self.publish(Event::new(source, payload))
    }

    /// Subscribe to a single [`Topic`] lane.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic: Some(topic),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Subscribe to every event regardless of topic.
    pub fn subscribe_all(&self) -> TopicReceiver {
        TopicReceiver {
            topic: None,
            receiver: self.firehose.subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Presence => &self.presence,
            Topic::Consent => &self.consent,
            Topic::Speech => &self.speech,
            Topic::Memory => &self.memory,
            Topic::Reminders => &self.reminders,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to one topic lane, or to the firehose.
pub struct TopicReceiver {
    topic: Option<Topic>,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event.
    ///
    /// Lagging subscribers skip the dropped events with a warning. Returns
    /// `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "bus subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll; `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to; `None` for the firehose.
    pub fn topic(&self) -> Option<Topic> {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reminisce_types::Emotion;

    fn presence(name: &str) -> Event {
        Event::new(
            "reminisce-runtime::test",
            EventPayload::PresenceChanged {
                identity: Some(name.to_string()),
            },
        )
    }

    #[test]
    fn payloads_route_to_expected_topics() {
        assert_eq!(Topic::of(&EventPayload::ConsentRequested), Topic::Consent);
        assert_eq!(Topic::of(&EventPayload::Speaking("hi".into())), Topic::Speech);
        assert_eq!(Topic::of(&EventPayload::Reminder("water".into())), Topic::Reminders);
        assert_eq!(
            Topic::of(&EventPayload::MemoryConsolidated {
                identity: "Ana".into(),
                summary: "s".into(),
                emotion: Emotion::Happy,
            }),
            Topic::Memory
        );
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(presence("Ana")), 0);
    }

    #[tokio::test]
    async fn topic_and_firehose_both_receive() {
        let bus = EventBus::default();
        let mut presence_rx = bus.subscribe_to(Topic::Presence);
        let mut all_rx = bus.subscribe_all();

        let event = presence("Ana");
        assert_eq!(bus.publish(event.clone()), 2);

        assert_eq!(presence_rx.recv().await.unwrap().id, event.id);
        assert_eq!(all_rx.recv().await.unwrap().id, event.id);
        assert_eq!(all_rx.topic(), None);
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topics() {
        let bus = EventBus::default();
        let mut consent_rx = bus.subscribe_to(Topic::Consent);
        bus.publish(presence("Ana"));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), consent_rx.recv()).await;
        assert!(result.is_err(), "consent lane must not see presence events");
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_dropped_events() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe_all();
        for i in 0..32 {
            bus.emit("flood", EventPayload::Reminder(format!("r{i}")));
        }
        let next = slow.recv().await.unwrap();
        assert!(matches!(next.payload, EventPayload::Reminder(_)));
    }

    #[test]
    fn try_recv_on_empty_returns_none() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Memory);
        assert!(rx.try_recv().is_none());
    }
}
