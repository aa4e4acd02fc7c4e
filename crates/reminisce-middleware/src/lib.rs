//! `reminisce-middleware` – routing between the session core and whatever
//! renders it.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels. The session orchestrator publishes its
//!   display-facing projection here; nothing in the core reads it back.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
