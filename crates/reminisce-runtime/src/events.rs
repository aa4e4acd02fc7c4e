//! Inputs to the session orchestrator.
//!
//! Everything that can change session state arrives as a [`SessionEvent`] on
//! one channel and is applied to completion before the next is read. Late
//! completions of asynchronous work carry the token that was current when
//! the work was started, so superseded results can be recognised and
//! dropped.

use reminisce_perception::PresenceEvent;
use reminisce_types::{Consolidation, ReminisceError};
use tokio::sync::mpsc;

/// Monotonic session counter. Bumped whenever a session starts or ends.
pub type SessionToken = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Debounced output of the presence loop.
    Presence(PresenceEvent),
    /// The grace timer armed with this token ran out.
    GraceExpired { timer: u64 },
    GreetingReady { token: SessionToken, text: String },
    /// Playback started under this token ended, successfully or not.
    PlaybackFinished { token: SessionToken },
    ConsolidationReady {
        identity: String,
        consolidation: Consolidation,
        transcript: String,
    },
    ConsentApproved { name: String },
    ConsentDenied,
    /// The camera view became active.
    Activate,
    /// The camera view went away; flush and go dormant.
    Deactivate,
    /// Flush, wait for queued consolidations, then stop.
    Shutdown,
}

/// Cloneable sender half used by the presence loop, provider tasks and the
/// operator console.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: SessionEvent) -> Result<(), ReminisceError> {
        self.tx
            .send(event)
            .map_err(|_| ReminisceError::Channel("session orchestrator has stopped".into()))
    }

    pub fn activate(&self) -> Result<(), ReminisceError> {
        self.send(SessionEvent::Activate)
    }

    pub fn deactivate(&self) -> Result<(), ReminisceError> {
        self.send(SessionEvent::Deactivate)
    }

    pub fn approve_consent(&self, name: impl Into<String>) -> Result<(), ReminisceError> {
        self.send(SessionEvent::ConsentApproved { name: name.into() })
    }

    pub fn deny_consent(&self) -> Result<(), ReminisceError> {
        self.send(SessionEvent::ConsentDenied)
    }

    pub fn shutdown(&self) -> Result<(), ReminisceError> {
        self.send(SessionEvent::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
