//! [`TranscriptionSession`] – one speech-to-text capture at a time.
//!
//! Committed (finalized) text and interim (provisional) text are kept apart
//! in a [`TranscriptBuffer`]. Only committed text is authoritative; the
//! interim snapshot is shown live and serves as a last-resort fallback when
//! a session is torn down before the provider finalized anything.
//!
//! A background pump task drains the provider's fragment channel into the
//! buffer and mirrors every change onto the event bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reminisce_middleware::EventBus;
use reminisce_types::{EventPayload, ReminisceError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::providers::{SpeechToText, TranscriptFragment};

const SOURCE: &str = "reminisce-runtime::transcription";

/// How long `stop` waits for the provider to flush after `close`.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Accumulated text for the current capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    pub committed: String,
    pub interim: String,
    /// While set, incoming fragments are dropped (the device is talking).
    pub paused: bool,
}

impl TranscriptBuffer {
    /// Apply one fragment. Returns `false` when it was dropped.
    pub fn apply(&mut self, fragment: TranscriptFragment) -> bool {
        if self.paused {
            return false;
        }
        match fragment {
            TranscriptFragment::Interim(text) => self.interim = text,
            TranscriptFragment::Committed(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    if !self.committed.is_empty() {
                        self.committed.push(' ');
                    }
                    self.committed.push_str(text);
                }
                self.interim.clear();
            }
        }
        true
    }

    /// Committed text, or the interim snapshot when nothing was committed.
    pub fn best_effort(&self) -> String {
        if self.committed.trim().is_empty() {
            self.interim.trim().to_string()
        } else {
            self.committed.clone()
        }
    }
}

pub struct TranscriptionSession {
    provider: Arc<dyn SpeechToText>,
    bus: EventBus,
    buffer: Arc<Mutex<TranscriptBuffer>>,
    pump: Option<JoinHandle<()>>,
}

impl TranscriptionSession {
    pub fn new(provider: Arc<dyn SpeechToText>, bus: EventBus) -> Self {
        Self {
            provider,
            bus,
            buffer: Arc::new(Mutex::new(TranscriptBuffer::default())),
            pump: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.pump.is_some()
    }

    /// Current buffer contents.
    pub fn snapshot(&self) -> TranscriptBuffer {
        self.buffer.lock().map(|b| b.clone()).unwrap_or_default()
    }

    /// Open a fresh capture with an empty buffer. A capture that is already
    /// open is stopped first and its text discarded.
    pub async fn start(&mut self) -> Result<(), ReminisceError> {
        if self.is_active() {
            warn!("transcription already active, restarting");
            self.stop().await;
        }
        self.reset();
        let fragments = self.provider.open().await?;
        self.pump = Some(tokio::spawn(pump(fragments, self.buffer.clone(), self.bus.clone())));
        let _ = self.bus.emit(SOURCE, EventPayload::Listening(true));
        debug!("transcription started");
        Ok(())
    }

    /// Close the capture and return the committed text. A no-op returning an
    /// empty string when nothing is open.
    pub async fn stop(&mut self) -> String {
        if !self.close().await {
            return String::new();
        }
        let text = self.take().committed;
        debug!(chars = text.len(), "transcription stopped");
        text
    }

    /// Like [`stop`](Self::stop), but falls back to the last interim snapshot
    /// when nothing was committed. Also recovers text left in the buffer by a
    /// capture that ended on its own.
    pub async fn recover(&mut self) -> String {
        self.close().await;
        let text = self.take().best_effort();
        debug!(chars = text.len(), "transcription recovered");
        text
    }

    /// Drop incoming speech without ending the capture.
    pub fn pause(&self) {
        if let Ok(mut b) = self.buffer.lock() {
            b.paused = true;
        }
        let _ = self.bus.emit(SOURCE, EventPayload::Listening(false));
    }

    pub fn resume(&self) {
        if !self.is_active() {
            return;
        }
        if let Ok(mut b) = self.buffer.lock() {
            b.paused = false;
        }
        let _ = self.bus.emit(SOURCE, EventPayload::Listening(true));
    }

    /// Returns `true` when a capture was open.
    async fn close(&mut self) -> bool {
        let Some(mut pump) = self.pump.take() else {
            return false;
        };
        if let Err(e) = self.provider.close().await {
            warn!(error = %e, "speech-to-text close failed");
        }
        if tokio::time::timeout(FLUSH_TIMEOUT, &mut pump).await.is_err() {
            warn!("speech-to-text did not flush in time, abandoning stream");
            pump.abort();
        }
        let _ = self.bus.emit(SOURCE, EventPayload::Listening(false));
        true
    }

    fn take(&self) -> TranscriptBuffer {
        self.buffer
            .lock()
            .map(|mut b| std::mem::take(&mut *b))
            .unwrap_or_default()
    }

    fn reset(&self) {
        if let Ok(mut b) = self.buffer.lock() {
            *b = TranscriptBuffer::default();
        }
    }
}

impl Drop for TranscriptionSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump(
    mut fragments: mpsc::Receiver<TranscriptFragment>,
    buffer: Arc<Mutex<TranscriptBuffer>>,
    bus: EventBus,
) {
    while let Some(fragment) = fragments.recv().await {
        let update = buffer.lock().ok().and_then(|mut b| {
            b.apply(fragment)
                .then(|| (b.committed.clone(), b.interim.clone()))
        });
        if let Some((committed, interim)) = update {
            let _ = bus.emit(SOURCE, EventPayload::TranscriptUpdated { committed, interim });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Provider whose stream is fed by the test.
    #[derive(Default)]
    struct FedStt {
        tx: Mutex<Option<mpsc::Sender<TranscriptFragment>>>,
        opened: Mutex<u32>,
    }

    impl FedStt {
        async fn send(&self, f: TranscriptFragment) {
            let tx = self.tx.lock().unwrap().clone();
            if let Some(tx) = tx {
                tx.send(f).await.unwrap();
            }
        }
    }

    #[async_trait]
    impl SpeechToText for FedStt {
        async fn open(&self) -> Result<mpsc::Receiver<TranscriptFragment>, ReminisceError> {
            let (tx, rx) = mpsc::channel(16);
            *self.tx.lock().unwrap() = Some(tx);
            *self.opened.lock().unwrap() += 1;
            Ok(rx)
        }

        async fn close(&self) -> Result<(), ReminisceError> {
            self.tx.lock().unwrap().take();
            Ok(())
        }
    }

    fn session() -> (Arc<FedStt>, TranscriptionSession) {
        let stt = Arc::new(FedStt::default());
        let s = TranscriptionSession::new(stt.clone(), EventBus::default());
        (stt, s)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn interim_is_never_counted_as_committed() {
        let mut b = TranscriptBuffer::default();
        b.apply(TranscriptFragment::Interim("hel".into()));
        b.apply(TranscriptFragment::Interim("hello the".into()));
        b.apply(TranscriptFragment::Committed("hello there".into()));
        b.apply(TranscriptFragment::Interim("how".into()));
        assert_eq!(b.committed, "hello there");
        assert_eq!(b.interim, "how");
        b.apply(TranscriptFragment::Committed("how are you".into()));
        assert_eq!(b.committed, "hello there how are you");
        assert!(b.interim.is_empty());
    }

    #[test]
    fn best_effort_falls_back_to_interim() {
        let mut b = TranscriptBuffer::default();
        b.apply(TranscriptFragment::Interim("half a sentence".into()));
        assert_eq!(b.best_effort(), "half a sentence");
        b.apply(TranscriptFragment::Committed("whole".into()));
        assert_eq!(b.best_effort(), "whole");
    }

    #[test]
    fn paused_buffer_drops_fragments() {
        let mut b = TranscriptBuffer {
            paused: true,
            ..Default::default()
        };
        assert!(!b.apply(TranscriptFragment::Committed("echo".into())));
        assert!(b.committed.is_empty());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let (_stt, mut s) = session();
        assert_eq!(s.stop().await, "");
        assert_eq!(s.stop().await, "");
        assert!(!s.is_active());
    }

    #[tokio::test]
    async fn stop_returns_committed_text_only() {
        let (stt, mut s) = session();
        s.start().await.unwrap();
        stt.send(TranscriptFragment::Committed("I planted tomatoes".into())).await;
        stt.send(TranscriptFragment::Interim("and then".into())).await;
        settle().await;
        assert_eq!(s.stop().await, "I planted tomatoes");
        assert!(s.snapshot().committed.is_empty());
    }

    #[tokio::test]
    async fn recover_uses_interim_when_nothing_committed() {
        let (stt, mut s) = session();
        s.start().await.unwrap();
        stt.send(TranscriptFragment::Interim("we went to the lake".into())).await;
        settle().await;
        assert_eq!(s.recover().await, "we went to the lake");
    }

    #[tokio::test]
    async fn start_resets_previous_text() {
        let (stt, mut s) = session();
        s.start().await.unwrap();
        stt.send(TranscriptFragment::Committed("old".into())).await;
        settle().await;
        s.start().await.unwrap();
        assert_eq!(*stt.opened.lock().unwrap(), 2);
        assert_eq!(s.stop().await, "");
    }

    #[tokio::test]
    async fn pause_and_resume_gate_speech() {
        let (stt, mut s) = session();
        s.start().await.unwrap();
        s.pause();
        stt.send(TranscriptFragment::Committed("device voice".into())).await;
        settle().await;
        s.resume();
        stt.send(TranscriptFragment::Committed("patient voice".into())).await;
        settle().await;
        assert_eq!(s.stop().await, "patient voice");
    }
}
