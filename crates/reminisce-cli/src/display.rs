//! Terminal projection of the event bus.
//!
//! Everything the patient-facing screen would show (who is here, what is
//! being said, the consent prompt, the latest mood) is rendered as one line
//! per bus event.

use colored::Colorize;
use reminisce_middleware::TopicReceiver;
use reminisce_types::{Emotion, EventPayload};

/// Render one payload, or `None` for events not worth a line.
pub fn render(payload: &EventPayload) -> Option<String> {
    let line = match payload {
        EventPayload::PresenceChanged { identity: Some(name) } => {
            format!("{} {}", "●".green(), format!("{name} is here").bold())
        }
        EventPayload::PresenceChanged { identity: None } => format!("{} {}", "○".dimmed(), "nobody tracked".dimmed()),
        EventPayload::ConsentRequested => format!(
            "{} Someone new is here. Remember them? {} or {}",
            "?".yellow().bold(),
            "/yes <name>".bold(),
            "/no".bold()
        ),
        EventPayload::ConsentClosed { enrolled: Some(name) } => {
            format!("{} {} enrolled", "✓".green().bold(), name.bold())
        }
        EventPayload::ConsentClosed { enrolled: None } => format!("{}", "consent prompt closed".dimmed()),
        EventPayload::EnrollmentFailed { name, reason } => {
            format!("{} could not enroll {}: {}", "✗".red().bold(), name.bold(), reason)
        }
        EventPayload::TranscriptUpdated { committed, interim } => {
            if interim.is_empty() {
                format!("  {} {}", "heard:".dimmed(), committed)
            } else {
                return None;
            }
        }
        EventPayload::Listening(_) => return None,
        EventPayload::Speaking(text) => format!("{} {}", "🔊".cyan(), text.italic()),
        EventPayload::MemoryConsolidated { identity, summary, emotion } => format!(
            "{} memory saved for {} ({}): {}",
            "✎".blue(),
            identity.bold(),
            mood(*emotion),
            summary
        ),
        EventPayload::LiveMood { identity, emotion } => {
            format!("  {}'s mood: {}", identity, mood(*emotion))
        }
        EventPayload::Reminder(message) => format!("{} {}", "⏰".yellow(), message.bold()),
    };
    Some(line)
}

fn mood(emotion: Emotion) -> String {
    let label = emotion.to_string();
    match emotion {
        Emotion::Happy | Emotion::Excited => label.green().to_string(),
        Emotion::Sad => label.blue().to_string(),
        Emotion::Angry => label.red().to_string(),
        Emotion::Neutral => label.normal().to_string(),
    }
}

/// Print bus events until the bus is dropped.
pub async fn print_events(mut rx: TopicReceiver) {
    while let Some(event) = rx.recv().await {
        if let Some(line) = render(&event.payload) {
            println!("[{}] {}", event.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"), line);
        }
    }
}
