//! Presence debouncing.
//!
//! One recognizer [`Verdict`] goes in per polling tick; at most one
//! [`PresenceEvent`] comes out.
//!
//! | Verdict | Event |
//! |---|---|
//! | `Match` | [`PresenceEvent::PersonArrived`], immediately |
//! | `Unmatched` | [`PresenceEvent::PersonUnknownConfirmed`] once the streak exceeds the threshold, otherwise nothing |
//! | `NoFace` | [`PresenceEvent::PersonAbsentTick`] |
//!
//! The unknown streak resets on any `Match` or `NoFace`. A confirmed streak
//! reports the unknown person once; further unmatched ticks in the same
//! streak stay silent.
//!
//! # Example
//!
//! ```rust
//! use reminisce_hal::Verdict;
//! use reminisce_perception::{PresenceDebouncer, PresenceEvent};
//!
//! let mut d = PresenceDebouncer::new();
//! assert_eq!(d.observe(Verdict::NoFace, 5), Some(PresenceEvent::PersonAbsentTick));
//! ```

use reminisce_hal::{CameraFrame, Verdict};
use tracing::debug;

/// Stable presence signal consumed by the session orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    PersonArrived { identity: String, frame: CameraFrame },
    /// An unknown face has been seen for long enough to ask about it.
    PersonUnknownConfirmed { frame: CameraFrame },
    PersonAbsentTick,
}

#[derive(Debug, Default)]
pub struct PresenceDebouncer {
    streak: u32,
    confirmed: bool,
}

impl PresenceDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of consecutive unmatched ticks.
    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Feed one verdict. `threshold` is the number of consecutive unmatched
    /// ticks that are still tolerated; the next one confirms.
    pub fn observe(&mut self, verdict: Verdict, threshold: u32) -> Option<PresenceEvent> {
        match verdict {
            Verdict::Match { identity, frame, .. } => {
                self.reset();
                Some(PresenceEvent::PersonArrived { identity, frame })
            }
            Verdict::NoFace => {
                self.reset();
                Some(PresenceEvent::PersonAbsentTick)
            }
            Verdict::Unmatched { frame } => {
                self.streak = self.streak.saturating_add(1);
                if self.confirmed || self.streak <= threshold {
                    return None;
                }
                self.confirmed = true;
                debug!(streak = self.streak, "unknown face confirmed");
                Some(PresenceEvent::PersonUnknownConfirmed { frame })
            }
        }
    }

    pub fn reset(&mut self) {
        self.streak = 0;
        self.confirmed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reminisce_hal::PixelFormat;

    fn frame(tag: u8) -> CameraFrame {
        CameraFrame {
            width: 1,
            height: 1,
            format: PixelFormat::Gray8,
            data: vec![tag],
        }
    }

    fn unmatched(tag: u8) -> Verdict {
        Verdict::Unmatched { frame: frame(tag) }
    }

    fn matched(name: &str) -> Verdict {
        Verdict::Match {
            identity: name.to_string(),
            distance: 0.1,
            frame: frame(0),
        }
    }

    #[test]
    fn sixth_unmatched_tick_confirms_exactly_once() {
        let mut d = PresenceDebouncer::new();
        for i in 0..5 {
            assert_eq!(d.observe(unmatched(i), 5), None, "tick {i} must stay silent");
        }
        assert_eq!(
            d.observe(unmatched(6), 5),
            Some(PresenceEvent::PersonUnknownConfirmed { frame: frame(6) })
        );
        for i in 7..20 {
            assert_eq!(d.observe(unmatched(i), 5), None);
        }
    }

    #[test]
    fn match_is_reported_immediately_and_resets_streak() {
        let mut d = PresenceDebouncer::new();
        for i in 0..4 {
            d.observe(unmatched(i), 5);
        }
        assert!(matches!(
            d.observe(matched("Ana"), 5),
            Some(PresenceEvent::PersonArrived { ref identity, .. }) if identity == "Ana"
        ));
        assert_eq!(d.streak(), 0);
        for i in 0..5 {
            assert_eq!(d.observe(unmatched(i), 5), None);
        }
    }

    #[test]
    fn no_face_resets_streak_and_reports_absence() {
        let mut d = PresenceDebouncer::new();
        for i in 0..5 {
            d.observe(unmatched(i), 5);
        }
        assert_eq!(d.observe(Verdict::NoFace, 5), Some(PresenceEvent::PersonAbsentTick));
        assert_eq!(d.streak(), 0);
        for i in 0..5 {
            assert_eq!(d.observe(unmatched(i), 5), None);
        }
        assert!(d.observe(unmatched(9), 5).is_some());
    }

    #[test]
    fn confirmation_can_recur_after_reset() {
        let mut d = PresenceDebouncer::new();
        for i in 0..6 {
            d.observe(unmatched(i), 5);
        }
        d.observe(Verdict::NoFace, 5);
        let fired = (0..6).filter_map(|i| d.observe(unmatched(i), 5)).count();
        assert_eq!(fired, 1);
    }

    #[test]
    fn threshold_is_read_per_call() {
        let mut d = PresenceDebouncer::new();
        assert_eq!(d.observe(unmatched(1), 1), None);
        assert!(d.observe(unmatched(2), 1).is_some());
    }
}
