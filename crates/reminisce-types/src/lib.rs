use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The fixed set of moods a consolidated conversation can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    #[default]
    Neutral,
    Excited,
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Angry => "Angry",
            Emotion::Neutral => "Neutral",
            Emotion::Excited => "Excited",
        };
        f.write_str(label)
    }
}

/// Parses the variant name as written by `Display` and by serde.
impl std::str::FromStr for Emotion {
    type Err = serde::de::value::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use serde::de::IntoDeserializer;
        let de: serde::de::value::StrDeserializer<'_, Self::Err> = s.into_deserializer();
        Emotion::deserialize(de)
    }
}

/// One remembered conversation. Immutable once appended to an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub emotion: Emotion,
    /// Raw transcript (or a prefix of it) the summary was produced from.
    pub transcript_excerpt: String,
}

impl MemoryEntry {
    /// Construct an entry stamped with the current UTC time.
    pub fn new(summary: impl Into<String>, emotion: Emotion, transcript_excerpt: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            summary: summary.into(),
            emotion,
            transcript_excerpt: transcript_excerpt.into(),
        }
    }
}

/// An enrolled person, keyed by their unique name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub bio: String,
    pub contact: Option<String>,
    /// Face descriptor owned by the identity store; only the recognizer reads it.
    pub embedding: Vec<f32>,
    /// Oldest first.
    pub history: Vec<MemoryEntry>,
    pub tags: Vec<String>,
}

impl Identity {
    /// Emotion of the most recent memory, `Neutral` when there is none.
    pub fn last_emotion(&self) -> Emotion {
        self.history.last().map(|e| e.emotion).unwrap_or_default()
    }
}

/// Structured result of summarising one conversation.
///
/// The JSON Schema of this type is sent to the language model as the
/// required response format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Consolidation {
    /// A concise two-sentence summary of what was said.
    pub summary: String,
    /// Primary emotion detected in the conversation.
    pub emotion: Emotion,
    /// Short topical keywords (people, pets, places, events).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Cleaned-up transcript, if the model returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for the presence-triggered session. Read at every decision point,
/// so edits take effect on the next tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Camera polling period.
    pub tick_period_ms: u64,
    /// Consecutive unmatched ticks tolerated before an unknown person is confirmed.
    pub unknown_streak_threshold: u32,
    /// How long a tracked person may be out of frame before the session ends.
    pub grace_period_ms: u64,
    /// Transcripts with this many trimmed characters or fewer are not summarised.
    pub min_transcript_chars: usize,
    /// Maximum number of tags kept per identity.
    pub tag_cap: usize,
    /// Maximum number of memories kept per identity; `None` keeps all.
    pub history_cap: Option<usize>,
    /// Spoken when the greeting model fails. `{name}` is substituted.
    pub greeting_fallback: String,
}

impl SessionSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// `true` when `transcript` carries enough content to be worth summarising.
    pub fn is_meaningful(&self, transcript: &str) -> bool {
        transcript.trim().chars().count() > self.min_transcript_chars
    }

    pub fn fallback_greeting(&self, name: &str) -> String {
        self.greeting_fallback.replace("{name}", name)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_period_ms: 350,
            unknown_streak_threshold: 5,
            grace_period_ms: 5_000,
            min_transcript_chars: 10,
            tag_cap: 8,
            history_cap: Some(100),
            greeting_fallback: "Look, it's {name}.".to_string(),
        }
    }
}

/// Daily window during which reminders may fire.
///
/// `wake > sleep` describes a window that wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderWindow {
    pub wake: NaiveTime,
    pub sleep: NaiveTime,
}

impl ReminderWindow {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.wake <= self.sleep {
            t >= self.wake && t < self.sleep
        } else {
            t >= self.wake || t < self.sleep
        }
    }
}

impl Default for ReminderWindow {
    fn default() -> Self {
        Self {
            wake: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            sleep: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub enabled: bool,
    pub window: ReminderWindow,
    pub interval_minutes: u64,
    pub message: String,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window: ReminderWindow::default(),
            interval_minutes: 120,
            message: "Time for a glass of water.".to_string(),
        }
    }
}

/// Everything that may be changed while the system is running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionSettings,
    pub reminders: ReminderSettings,
}

// ─────────────────────────────────────────────────────────────────────────────
// Event bus payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"reminisce-runtime::orchestrator"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Display-facing projection of what the system is doing. Nothing inside the
/// runtime reads these back; they exist for whatever renders the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// The tracked person changed. `None` means nobody is being tracked.
    PresenceChanged { identity: Option<String> },
    /// An unknown person was confirmed and the enrollment prompt is open.
    ConsentRequested,
    /// The enrollment prompt closed, optionally because someone was enrolled.
    ConsentClosed { enrolled: Option<String> },
    EnrollmentFailed { name: String, reason: String },
    TranscriptUpdated { committed: String, interim: String },
    Listening(bool),
    Speaking(String),
    MemoryConsolidated {
        identity: String,
        summary: String,
        emotion: Emotion,
    },
    /// Mood of the conversation that just ended for the person still present.
    LiveMood { identity: String, emotion: Emotion },
    Reminder(String),
}

/// Global error type spanning sensors, providers, storage and enrollment.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReminisceError {
    #[error("Sensor fault on {component}: {details}")]
    Sensor { component: String, details: String },

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("{provider} provider error: {details}")]
    Provider { provider: String, details: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Enrollment of {name} failed: {reason}")]
    Enrollment { name: String, reason: String },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ReminisceError {
    pub fn provider(provider: &str, details: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            details: details.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emotion_defaults_to_neutral() {
        assert_eq!(Emotion::default(), Emotion::Neutral);
    }

    #[test]
    fn emotion_display_parses_back() {
        for e in [Emotion::Happy, Emotion::Sad, Emotion::Angry, Emotion::Neutral, Emotion::Excited] {
            assert_eq!(e.to_string().parse::<Emotion>().unwrap(), e);
            assert_eq!(serde_json::to_string(&e).unwrap(), format!("\"{e}\""));
        }
        assert!("Melancholy".parse::<Emotion>().is_err());
    }

    #[test]
    fn consolidation_parses_model_output_without_tags() {
        let raw = r#"{"summary":"Talked about the garden.","emotion":"Happy"}"#;
        let c: Consolidation = serde_json::from_str(raw).unwrap();
        assert_eq!(c.emotion, Emotion::Happy);
        assert!(c.tags.is_empty());
        assert!(c.transcript.is_none());
    }

    #[test]
    fn consolidation_rejects_unknown_emotion() {
        let raw = r#"{"summary":"x","emotion":"Bored","tags":[]}"#;
        assert!(serde_json::from_str::<Consolidation>(raw).is_err());
    }

    #[test]
    fn consolidation_schema_lists_emotions() {
        let schema = serde_json::to_string(&schemars::schema_for!(Consolidation)).unwrap();
        for e in ["Happy", "Sad", "Angry", "Neutral", "Excited"] {
            assert!(schema.contains(e), "schema must enumerate {e}");
        }
    }

    #[test]
    fn last_emotion_uses_newest_entry() {
        let mut id = Identity {
            name: "Ana".into(),
            bio: "Daughter".into(),
            contact: None,
            embedding: vec![0.0; 4],
            history: vec![],
            tags: vec![],
        };
        assert_eq!(id.last_emotion(), Emotion::Neutral);
        id.history.push(MemoryEntry::new("a", Emotion::Sad, ""));
        id.history.push(MemoryEntry::new("b", Emotion::Excited, ""));
        assert_eq!(id.last_emotion(), Emotion::Excited);
    }

    #[test]
    fn meaningful_transcript_threshold_is_exclusive() {
        let s = SessionSettings::default();
        assert!(!s.is_meaningful("ok"));
        assert!(!s.is_meaningful("   0123456789   "));
        assert!(s.is_meaningful("0123456789a"));
    }

    #[test]
    fn fallback_greeting_substitutes_name() {
        let s = SessionSettings::default();
        assert_eq!(s.fallback_greeting("Marc"), "Look, it's Marc.");
    }

    #[test]
    fn reminder_window_same_day() {
        let w = ReminderWindow::default();
        assert!(w.contains(NaiveTime::from_hms_opt(8, 0, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(14, 30, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(21, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
    }

    #[test]
    fn reminder_window_wraps_midnight() {
        let w = ReminderWindow {
            wake: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            sleep: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        };
        assert!(w.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let s: Settings = serde_json::from_str(r#"{"session":{"grace_period_ms":2000}}"#).unwrap();
        assert_eq!(s.session.grace_period(), Duration::from_secs(2));
        assert_eq!(s.session.unknown_streak_threshold, 5);
        assert!(s.reminders.enabled);
    }

    #[test]
    fn error_display() {
        let err = ReminisceError::provider("tts", "HTTP 500");
        assert_eq!(err.to_string(), "tts provider error: HTTP 500");
        let err = ReminisceError::Enrollment {
            name: "Bob".into(),
            reason: "no face in frame".into(),
        };
        assert!(err.to_string().contains("Bob"));
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "reminisce-runtime::orchestrator",
            EventPayload::PresenceChanged {
                identity: Some("Ana".into()),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.payload, event.payload);
    }
}
