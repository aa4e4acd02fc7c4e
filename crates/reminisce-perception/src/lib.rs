//! `reminisce-perception` – turns noisy per-frame recognition into presence.
//!
//! Raw classification flickers near confidence boundaries. This layer
//! converts the per-tick [`Verdict`][reminisce_hal::Verdict] stream into the
//! stable events the session core acts on.
//!
//! # Modules
//!
//! - [`debounce`] – [`PresenceDebouncer`][debounce::PresenceDebouncer]:
//!   emits arrivals immediately, confirms unknown faces only after a run of
//!   consecutive unmatched ticks, and reports every empty frame.

pub mod debounce;

pub use debounce::{PresenceDebouncer, PresenceEvent};
