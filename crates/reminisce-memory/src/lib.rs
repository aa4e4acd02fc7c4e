//! `reminisce-memory` – The Identity Store.
//!
//! Gives the system persistent recall of the people it has met, utilizing a
//! local SQLite substrate.
//!
//! # Modules
//!
//! - [`identity`] – [`IdentityStore`][identity::IdentityStore]: enrolled
//!   people keyed by name, their face descriptors, an append-only
//!   conversation history with a retention bound, and a capped tag set. The
//!   store doubles as the recognizer's descriptor gallery.

pub mod identity;

pub use identity::{IdentityStore, StoreError, merge_tags};
