//! `reminisce-kernel` – Background regulation.
//!
//! Periodic duties that run beside the session core without reading or
//! writing any session state.
//!
//! # Modules
//!
//! - [`reminder`] – [`ReminderScheduler`][reminder::ReminderScheduler]:
//!   fires a reminder on the event bus at a fixed interval, but only inside
//!   the configured wake/sleep window.

pub mod reminder;

pub use reminder::{ReminderScheduler, is_due};
