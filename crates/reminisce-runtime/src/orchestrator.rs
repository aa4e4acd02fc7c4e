//! [`SessionOrchestrator`] – the presence-triggered session state machine.
//!
//! Binds "who is in front of the camera" to a conversation session: start
//! listening when a known person arrives, greet them, keep capturing while
//! they stay, and hand the transcript off for consolidation once they leave.
//! Unknown faces open a consent prompt for enrollment.
//!
//! # States
//!
//! | State | Meaning |
//! |---|---|
//! | [`SessionState::Idle`] | Nobody tracked, no recording |
//! | [`SessionState::Tracking`] | Known person present, recording bound to them |
//! | [`SessionState::AwaitingLossTimeout`] | Tracked person out of frame, grace timer running |
//! | [`SessionState::ConsentPending`] | Unknown person confirmed, enrollment prompt open |
//!
//! # Concurrency
//!
//! All state lives in this struct and is mutated only by
//! [`dispatch`](SessionOrchestrator::dispatch), one [`SessionEvent`] at a
//! time. Slow work (greeting generation, speech synthesis, consolidation,
//! the grace timer) runs in spawned tasks that report back through the same
//! event channel, tagged with the session token or timer id they were
//! started under. A completion whose tag no longer matches is discarded.
//!
//! Switching directly from one person to another stops the first recording
//! and queues its transcript before the second recording starts.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo(deps: reminisce_runtime::orchestrator::SessionDeps) {
//! use reminisce_runtime::orchestrator::SessionOrchestrator;
//!
//! let orchestrator = SessionOrchestrator::new(deps);
//! let handle = orchestrator.handle();
//! let task = tokio::spawn(orchestrator.run());
//!
//! handle.activate().unwrap();
//! // ... presence loop feeds events through `handle` ...
//! handle.shutdown().unwrap();
//! task.await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use reminisce_hal::{CameraFrame, Recognizer};
use reminisce_memory::IdentityStore;
use reminisce_middleware::EventBus;
use reminisce_perception::PresenceEvent;
use reminisce_types::{Consolidation, EventPayload, MemoryEntry, ReminisceError, Settings};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::consolidator::{ConsolidationQueue, MemoryConsolidator};
use crate::enrollment::{NEW_PERSON_BIO, enroll_from_frame};
use crate::events::{SessionEvent, SessionHandle, SessionToken};
use crate::playback::PlaybackArbiter;
use crate::providers::{AudioSink, GreetingRequest, LanguageModel, SpeechSynthesizer, SpeechToText};
use crate::transcription::TranscriptionSession;

const SOURCE: &str = "reminisce-runtime::orchestrator";

/// Longest transcript excerpt stored alongside a memory.
const EXCERPT_CHARS: usize = 2_000;

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Tracking(String),
    AwaitingLossTimeout(String),
    ConsentPending,
}

/// Collaborators wired into a [`SessionOrchestrator`].
pub struct SessionDeps {
    pub recognizer: Arc<dyn Recognizer>,
    pub store: Arc<IdentityStore>,
    pub model: Arc<dyn LanguageModel>,
    pub speech_to_text: Arc<dyn SpeechToText>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub sink: Arc<dyn AudioSink>,
    pub bus: EventBus,
    pub settings: watch::Receiver<Settings>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal state
// ─────────────────────────────────────────────────────────────────────────────

/// Scoped to one "no known person present" streak.
#[derive(Debug, Default)]
struct ConsentState {
    pending_frame: Option<CameraFrame>,
    open: bool,
    denied: bool,
}

struct LossTimer {
    id: u64,
    handle: JoinHandle<()>,
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct SessionOrchestrator {
    recognizer: Arc<dyn Recognizer>,
    store: Arc<IdentityStore>,
    model: Arc<dyn LanguageModel>,
    bus: EventBus,
    settings: watch::Receiver<Settings>,
    transcription: TranscriptionSession,
    playback: PlaybackArbiter,
    consolidations: ConsolidationQueue,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    camera: watch::Sender<bool>,
    // ── Session ───────────────────────────────────────────────────────────────
    active: Option<String>,
    token: SessionToken,
    loss_timer: Option<LossTimer>,
    next_timer: u64,
    greeting: Option<JoinHandle<()>>,
    consent: ConsentState,
}

impl SessionOrchestrator {
    pub fn new(deps: SessionDeps) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (camera, _) = watch::channel(false);
        Self {
            transcription: TranscriptionSession::new(deps.speech_to_text, deps.bus.clone()),
            playback: PlaybackArbiter::new(deps.synthesizer, deps.sink, events_tx.clone()),
            consolidations: ConsolidationQueue::new(
                MemoryConsolidator::new(deps.model.clone()),
                events_tx.clone(),
            ),
            recognizer: deps.recognizer,
            store: deps.store,
            model: deps.model,
            bus: deps.bus,
            settings: deps.settings,
            events_tx,
            events_rx,
            camera,
            active: None,
            token: 0,
            loss_timer: None,
            next_timer: 0,
            greeting: None,
            consent: ConsentState::default(),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.events_tx.clone())
    }

    /// `true` while the camera view is active. The presence loop idles
    /// while this is `false`.
    pub fn camera_state(&self) -> watch::Receiver<bool> {
        self.camera.subscribe()
    }

    pub fn state(&self) -> SessionState {
        match (&self.active, &self.loss_timer) {
            _ if self.consent.open => SessionState::ConsentPending,
            (Some(name), Some(_)) => SessionState::AwaitingLossTimeout(name.clone()),
            (Some(name), None) => SessionState::Tracking(name.clone()),
            (None, _) => SessionState::Idle,
        }
    }

    pub fn active_identity(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn is_recording(&self) -> bool {
        self.transcription.is_active()
    }

    fn camera_active(&self) -> bool {
        *self.camera.borrow()
    }

    /// Process events until [`SessionEvent::Shutdown`].
    pub async fn run(mut self) {
        info!("session orchestrator started");
        while let Some(event) = self.events_rx.recv().await {
            let stop = matches!(event, SessionEvent::Shutdown);
            self.dispatch(event).await;
            if stop {
                break;
            }
        }
        info!("session orchestrator stopped");
    }

    /// Apply every event already queued. Returns how many were applied.
    pub async fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event).await;
            applied += 1;
        }
        applied
    }

    /// Apply one event to completion.
    pub async fn dispatch(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Presence(presence) => self.on_presence(presence).await,
            SessionEvent::GraceExpired { timer } => self.on_grace_expired(timer).await,
            SessionEvent::GreetingReady { token, text } => self.on_greeting(token, text),
            SessionEvent::PlaybackFinished { token } => self.on_playback_finished(token),
            SessionEvent::ConsolidationReady {
                identity,
                consolidation,
                transcript,
            } => self.merge(&identity, consolidation, transcript),
            SessionEvent::ConsentApproved { name } => self.on_consent_approved(name).await,
            SessionEvent::ConsentDenied => self.on_consent_denied(),
            SessionEvent::Activate => self.activate(),
            SessionEvent::Deactivate => self.deactivate().await,
            SessionEvent::Shutdown => self.shutdown().await,
        }
    }

    // ── Presence ─────────────────────────────────────────────────────────────

    async fn on_presence(&mut self, presence: PresenceEvent) {
        if !self.camera_active() {
            debug!("presence ignored while dormant");
            return;
        }
        match presence {
            PresenceEvent::PersonArrived { identity, frame } => self.on_arrival(identity, Some(frame)).await,
            PresenceEvent::PersonUnknownConfirmed { frame } => self.on_unknown(frame).await,
            PresenceEvent::PersonAbsentTick => self.on_absent(),
        }
    }

    async fn on_arrival(&mut self, identity: String, frame: Option<CameraFrame>) {
        self.cancel_loss_timer();
        if self.active.as_deref() == Some(identity.as_str()) {
            return;
        }
        if self.consent.open {
            info!(%identity, "known person arrived, closing consent prompt");
            self.close_consent(None);
        }
        self.consent.denied = false;
        if self.active.is_some() {
            self.finalize(false).await;
        }
        self.start_session(identity, frame).await;
    }

    async fn on_unknown(&mut self, frame: CameraFrame) {
        if self.consent.denied {
            debug!("consent already denied for this streak");
            return;
        }
        if self.consent.open {
            return;
        }
        if self.active.is_some() {
            self.finalize(false).await;
        } else {
            self.playback.stop();
            let _ = self.transcription.stop().await;
        }
        self.consent.open = true;
        self.consent.pending_frame = Some(frame);
        info!("unknown person confirmed, asking for consent");
        let _ = self.bus.emit(SOURCE, EventPayload::ConsentRequested);
    }

    fn on_absent(&mut self) {
        if self.consent.open {
            debug!("face gone, closing consent prompt");
            self.close_consent(None);
        }
        self.consent.denied = false;
        if self.active.is_some() && self.loss_timer.is_none() {
            self.arm_loss_timer();
        }
    }

    // ── Timers ───────────────────────────────────────────────────────────────

    fn arm_loss_timer(&mut self) {
        let grace = self.settings.borrow().session.grace_period();
        self.next_timer += 1;
        let id = self.next_timer;
        let events = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = events.send(SessionEvent::GraceExpired { timer: id });
        });
        debug!(timer = id, grace_ms = grace.as_millis() as u64, "grace timer armed");
        self.loss_timer = Some(LossTimer { id, handle });
    }

    fn cancel_loss_timer(&mut self) {
        if let Some(timer) = self.loss_timer.take() {
            debug!(timer = timer.id, "grace timer cancelled");
            timer.handle.abort();
        }
    }

    async fn on_grace_expired(&mut self, timer: u64) {
        if !self.loss_timer.as_ref().is_some_and(|t| t.id == timer) {
            debug!(timer, "stale grace timer ignored");
            return;
        }
        self.loss_timer = None;
        info!(identity = ?self.active, "grace period elapsed");
        self.finalize(false).await;
    }

    // ── Session lifecycle ────────────────────────────────────────────────────

    async fn start_session(&mut self, identity: String, frame: Option<CameraFrame>) {
        self.token += 1;
        self.active = Some(identity.clone());
        info!(%identity, token = self.token, "session started");
        let _ = self.bus.emit(
            SOURCE,
            EventPayload::PresenceChanged {
                identity: Some(identity.clone()),
            },
        );
        if let Err(e) = self.transcription.start().await {
            warn!(%identity, error = %e, "transcription failed to start");
        }
        self.request_greeting(identity, frame);
    }

    /// End the active session: stop recording and queue its transcript.
    ///
    /// `recover` falls back to interim text when nothing was committed.
    async fn finalize(&mut self, recover: bool) {
        let Some(identity) = self.active.take() else {
            return;
        };
        self.cancel_loss_timer();
        if let Some(greeting) = self.greeting.take() {
            greeting.abort();
        }
        self.playback.stop();
        let transcript = if recover {
            self.transcription.recover().await
        } else {
            self.transcription.stop().await
        };
        self.token += 1;
        let _ = self.bus.emit(SOURCE, EventPayload::PresenceChanged { identity: None });

        let meaningful = self.settings.borrow().session.is_meaningful(&transcript);
        if meaningful {
            info!(%identity, chars = transcript.chars().count(), "session ended, consolidating");
            self.consolidations.submit(&identity, transcript);
        } else {
            info!(%identity, "session ended with too little speech to remember");
        }
    }

    fn request_greeting(&mut self, identity: String, frame: Option<CameraFrame>) {
        let token = self.token;
        let fallback = self.settings.borrow().session.fallback_greeting(&identity);
        let record = match self.store.get(&identity) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%identity, error = %e, "identity lookup failed, using fallback greeting");
                None
            }
        };
        let model = self.model.clone();
        let events = self.events_tx.clone();
        if let Some(previous) = self.greeting.take() {
            previous.abort();
        }
        let span = info_span!("greeting", identity = %identity, token);
        self.greeting = Some(tokio::spawn(
            async move {
                let text = match record {
                    Some(identity) => match model.greet(GreetingRequest { identity, frame }).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "greeting failed, using fallback");
                            fallback
                        }
                    },
                    None => fallback,
                };
                let _ = events.send(SessionEvent::GreetingReady { token, text });
            }
            .instrument(span),
        ));
    }

    fn on_greeting(&mut self, token: SessionToken, text: String) {
        if token != self.token || self.active.is_none() {
            debug!(token, current = self.token, "stale greeting discarded");
            return;
        }
        self.greeting = None;
        self.transcription.pause();
        let _ = self.bus.emit(SOURCE, EventPayload::Speaking(text.clone()));
        self.playback.speak(text, token);
    }

    fn on_playback_finished(&mut self, token: SessionToken) {
        if token != self.token || self.active.is_none() {
            debug!(token, current = self.token, "stale playback completion ignored");
            return;
        }
        self.transcription.resume();
    }

    // ── Consolidation ────────────────────────────────────────────────────────

    /// Append a finished consolidation to the identity's history.
    fn merge(&mut self, identity: &str, consolidation: Consolidation, transcript: String) {
        let session = self.settings.borrow().session.clone();
        let excerpt = consolidation
            .transcript
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(transcript);
        let excerpt: String = excerpt.chars().take(EXCERPT_CHARS).collect();
        let entry = MemoryEntry::new(consolidation.summary, consolidation.emotion, excerpt);

        if let Err(e) = self.store.append_memory(
            identity,
            &entry,
            &consolidation.tags,
            session.tag_cap,
            session.history_cap,
        ) {
            warn!(identity, error = %e, "could not store consolidated memory");
            return;
        }
        info!(identity, emotion = %entry.emotion, "memory stored");
        let _ = self.bus.emit(
            SOURCE,
            EventPayload::MemoryConsolidated {
                identity: identity.to_string(),
                summary: entry.summary.clone(),
                emotion: entry.emotion,
            },
        );
        if self.active.as_deref() == Some(identity) {
            let _ = self.bus.emit(
                SOURCE,
                EventPayload::LiveMood {
                    identity: identity.to_string(),
                    emotion: entry.emotion,
                },
            );
        }
    }

    // ── Consent ──────────────────────────────────────────────────────────────

    fn close_consent(&mut self, enrolled: Option<String>) {
        self.consent.open = false;
        self.consent.pending_frame = None;
        let _ = self.bus.emit(SOURCE, EventPayload::ConsentClosed { enrolled });
    }

    fn on_consent_denied(&mut self) {
        if !self.consent.open {
            debug!("consent denial with no prompt open");
            return;
        }
        self.close_consent(None);
        self.consent.denied = true;
        info!("consent denied");
    }

    async fn on_consent_approved(&mut self, name: String) {
        if !self.consent.open {
            warn!(%name, "consent approval with no prompt open");
            return;
        }
        let name = name.trim().to_string();
        let Some(frame) = self.consent.pending_frame.clone() else {
            return;
        };
        if let Err(e) = self.enroll(&name, &frame).await {
            warn!(%name, error = %e, "enrollment failed");
            let _ = self.bus.emit(
                SOURCE,
                EventPayload::EnrollmentFailed {
                    name,
                    reason: e.to_string(),
                },
            );
            return;
        }
        self.close_consent(Some(name.clone()));
        self.consent.denied = false;
        self.start_session(name, Some(frame)).await;
    }

    async fn enroll(&self, name: &str, frame: &CameraFrame) -> Result<(), ReminisceError> {
        enroll_from_frame(self.recognizer.as_ref(), &self.store, frame, name, NEW_PERSON_BIO, None).await?;
        Ok(())
    }

    // ── Camera lifecycle ─────────────────────────────────────────────────────

    fn activate(&mut self) {
        if self.camera_active() {
            return;
        }
        self.camera.send_replace(true);
        info!("camera activated");
    }

    /// Flush and reset everything. Safe to call repeatedly.
    async fn deactivate(&mut self) {
        if !self.camera_active() && self.active.is_none() && !self.consent.open {
            return;
        }
        info!(identity = ?self.active, "camera deactivated, flushing session");
        self.finalize(true).await;
        if let Some(greeting) = self.greeting.take() {
            greeting.abort();
        }
        self.playback.stop();
        self.cancel_loss_timer();
        let _ = self.transcription.stop().await;
        if self.consent.open {
            self.close_consent(None);
        }
        self.consent = ConsentState::default();
        self.camera.send_replace(false);
    }

    async fn shutdown(&mut self) {
        self.deactivate().await;
        self.consolidations.drain().await;
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                SessionEvent::ConsolidationReady {
                    identity,
                    consolidation,
                    transcript,
                } => self.merge(&identity, consolidation, transcript),
                other => debug!(?other, "event dropped at shutdown"),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
