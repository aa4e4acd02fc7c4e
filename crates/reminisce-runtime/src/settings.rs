//! Live settings distribution.
//!
//! [`SettingsHandle`] owns the sending side of a `tokio::sync::watch`
//! channel. Components hold a receiver and read the current value at each
//! decision point, so an edit applies from the next tick, timer or
//! transcript on.

use reminisce_types::{ReminisceError, Settings};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<Settings>,
}

impl SettingsHandle {
    pub fn new(initial: Settings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Apply `edit` to the live settings and notify every subscriber.
    pub fn update(&self, edit: impl FnOnce(&mut Settings)) {
        self.tx.send_modify(edit);
    }

    /// Set a single value by dotted key, e.g. `session.grace_period_ms`.
    pub fn set(&self, key: &str, value: &str) -> Result<(), ReminisceError> {
        let mut next = self.current();
        apply_key(&mut next, key, value)?;
        self.tx.send_replace(next);
        info!(key, value, "setting updated");
        Ok(())
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ReminisceError> {
    value
        .trim()
        .parse()
        .map_err(|_| ReminisceError::Config(format!("invalid value for {key}: {value:?}")))
}

fn apply_key(s: &mut Settings, key: &str, value: &str) -> Result<(), ReminisceError> {
    match key {
        "session.tick_period_ms" => s.session.tick_period_ms = parse::<u64>(key, value)?.max(1),
        "session.unknown_streak_threshold" => s.session.unknown_streak_threshold = parse(key, value)?,
        "session.grace_period_ms" => s.session.grace_period_ms = parse(key, value)?,
        "session.min_transcript_chars" => s.session.min_transcript_chars = parse(key, value)?,
        "session.tag_cap" => s.session.tag_cap = parse(key, value)?,
        "session.history_cap" => {
            s.session.history_cap = match value.trim() {
                "none" | "off" => None,
                v => Some(parse::<usize>(key, v)?.max(1)),
            }
        }
        "session.greeting_fallback" => s.session.greeting_fallback = value.to_string(),
        "reminders.enabled" => s.reminders.enabled = parse(key, value)?,
        "reminders.interval_minutes" => s.reminders.interval_minutes = parse::<u64>(key, value)?.max(1),
        "reminders.message" => s.reminders.message = value.to_string(),
        "reminders.wake" => {
            s.reminders.window.wake = parse_time(key, value)?;
        }
        "reminders.sleep" => {
            s.reminders.window.sleep = parse_time(key, value)?;
        }
        _ => return Err(ReminisceError::Config(format!("unknown setting {key}"))),
    }
    Ok(())
}

fn parse_time(key: &str, value: &str) -> Result<chrono::NaiveTime, ReminisceError> {
    chrono::NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ReminisceError::Config(format!("{key} expects HH:MM, got {value:?}")))
}
