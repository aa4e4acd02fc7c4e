//! [`ReminderScheduler`] – wake-window reminders.
//!
//! The scheduler wakes every [`CHECK_PERIOD`], re-reads the live
//! [`Settings`], and publishes [`EventPayload::Reminder`] when reminders are
//! enabled, local time is inside the wake window, and at least
//! `interval_minutes` have passed since the previous reminder.
//!
//! It has no data dependency on the session core; the only coupling is the
//! shared event bus.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use reminisce_kernel::reminder::is_due;
//! use reminisce_types::ReminderSettings;
//!
//! let s = ReminderSettings::default();
//! let noon = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
//! assert!(is_due(noon, None, &s));
//! assert!(!is_due(noon, Some(noon), &s));
//! ```

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use reminisce_middleware::EventBus;
use reminisce_types::{EventPayload, ReminderSettings, Settings};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// How often the window and interval are re-evaluated.
pub const CHECK_PERIOD: Duration = Duration::from_secs(30);

const SOURCE: &str = "reminisce-kernel::reminder";

/// `true` when a reminder should fire at `now`.
pub fn is_due(now: NaiveDateTime, last_fired: Option<NaiveDateTime>, settings: &ReminderSettings) -> bool {
    if !settings.enabled || !settings.window.contains(now.time()) {
        return false;
    }
    match last_fired {
        None => true,
        Some(last) => {
            let interval = chrono::Duration::minutes(settings.interval_minutes as i64);
            now.signed_duration_since(last) >= interval
        }
    }
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

pub struct ReminderScheduler {
    bus: EventBus,
    settings: watch::Receiver<Settings>,
    clock: Clock,
    last_fired: Option<NaiveDateTime>,
}

impl ReminderScheduler {
    pub fn new(bus: EventBus, settings: watch::Receiver<Settings>) -> Self {
        Self {
            bus,
            settings,
            clock: Box::new(|| Local::now().naive_local()),
            last_fired: None,
        }
    }

    /// Replace the wall clock, e.g. with a fixed time in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Evaluate once and publish if due. Returns whether a reminder fired.
    pub fn check(&mut self) -> bool {
        let now = (self.clock)();
        let reminders = self.settings.borrow().reminders.clone();
        if !is_due(now, self.last_fired, &reminders) {
            return false;
        }
        self.last_fired = Some(now);
        info!(message = %reminders.message, "reminder fired");
        let _ = self.bus.emit(SOURCE, EventPayload::Reminder(reminders.message));
        true
    }

    /// Run until every settings sender has been dropped.
    ///
    /// A settings change triggers an immediate re-check so a newly opened
    /// window or shortened interval takes effect without waiting a period.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(CHECK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("reminder settings changed");
                }
            }
            self.check();
        }
        debug!("reminder scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use reminisce_middleware::Topic;
    use reminisce_types::ReminderWindow;
    use std::sync::{Arc, Mutex};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn not_due_outside_window_or_when_disabled() {
        let mut s = ReminderSettings::default();
        assert!(!is_due(at(6, 0), None, &s));
        assert!(!is_due(at(22, 0), None, &s));
        s.enabled = false;
        assert!(!is_due(at(12, 0), None, &s));
    }

    #[test]
    fn interval_gates_repeat_reminders() {
        let s = ReminderSettings::default();
        assert!(!is_due(at(11, 59), Some(at(10, 0)), &s));
        assert!(is_due(at(12, 0), Some(at(10, 0)), &s));
    }

    #[test]
    fn wrapped_window_fires_after_midnight() {
        let s = ReminderSettings {
            window: ReminderWindow {
                wake: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                sleep: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            },
            ..ReminderSettings::default()
        };
        assert!(is_due(at(1, 0), None, &s));
        assert!(!is_due(at(12, 0), None, &s));
    }

    #[test]
    fn check_publishes_configured_message() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Reminders);
        let (_tx, settings) = watch::channel(Settings::default());
        let mut sched = ReminderScheduler::new(bus, settings).with_clock(|| at(9, 0));

        assert!(sched.check());
        assert!(!sched.check(), "interval must gate the second check");
        let event = rx.try_recv().unwrap();
        assert_eq!(event.payload, EventPayload::Reminder("Time for a glass of water.".into()));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_fires_on_interval_and_stops_with_settings() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Reminders);
        let mut settings = Settings::default();
        settings.reminders.interval_minutes = 1;
        let (tx, settings_rx) = watch::channel(settings);

        let now = Arc::new(Mutex::new(at(9, 0)));
        let clock = now.clone();
        let sched = ReminderScheduler::new(bus, settings_rx).with_clock(move || *clock.lock().unwrap());
        let task = tokio::spawn(sched.run());

        assert!(matches!(rx.recv().await.unwrap().payload, EventPayload::Reminder(_)));

        *now.lock().unwrap() = at(9, 1);
        tokio::time::sleep(CHECK_PERIOD).await;
        assert!(matches!(rx.recv().await.unwrap().payload, EventPayload::Reminder(_)));

        drop(tx);
        task.await.unwrap();
    }
}
