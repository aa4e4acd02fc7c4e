//! [`PlaybackArbiter`] – at most one utterance at a time.
//!
//! `speak` aborts whatever is being synthesized or played before starting
//! the new request. When an utterance ends on its own (played, or skipped
//! because synthesis failed) the arbiter reports
//! [`SessionEvent::PlaybackFinished`] with the caller's token so the
//! orchestrator can resume listening. Aborted utterances report nothing.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::events::{SessionEvent, SessionToken};
use crate::providers::{AudioSink, SpeechSynthesizer};

pub struct PlaybackArbiter {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
    events: mpsc::UnboundedSender<SessionEvent>,
    current: Option<JoinHandle<()>>,
}

impl PlaybackArbiter {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            synthesizer,
            sink,
            events,
            current: None,
        }
    }

    /// `true` while a request is being synthesized or played.
    pub fn is_speaking(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn speak(&mut self, text: impl Into<String>, token: SessionToken) {
        self.stop();
        let text = text.into();
        let synthesizer = self.synthesizer.clone();
        let sink = self.sink.clone();
        let events = self.events.clone();
        let span = info_span!("playback", token);
        self.current = Some(tokio::spawn(
            async move {
                match synthesizer.synthesize(&text).await {
                    Ok(clip) => {
                        if let Err(e) = sink.play(clip).await {
                            warn!(error = %e, "audio playback failed");
                        }
                    }
                    Err(e) => warn!(error = %e, "speech synthesis failed, skipping playback"),
                }
                let _ = events.send(SessionEvent::PlaybackFinished { token });
            }
            .instrument(span),
        ));
    }

    /// Cancel the current utterance, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            if !handle.is_finished() {
                debug!("cancelling in-flight speech");
            }
            handle.abort();
        }
    }
}

impl Drop for PlaybackArbiter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SpeechClip;
    use async_trait::async_trait;
    use reminisce_types::ReminisceError;
    use std::sync::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    struct SlowVoice {
        log: Log,
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for SlowVoice {
        async fn synthesize(&self, text: &str) -> Result<SpeechClip, ReminisceError> {
            self.log.lock().unwrap().push(format!("synth:{text}"));
            if self.fail {
                return Err(ReminisceError::provider("tts", "HTTP 401"));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(SpeechClip {
                text: text.to_string(),
                audio: vec![1, 2, 3],
                mime_type: "audio/mpeg".into(),
            })
        }
    }

    struct Speaker {
        log: Log,
    }

    #[async_trait]
    impl AudioSink for Speaker {
        async fn play(&self, clip: SpeechClip) -> Result<(), ReminisceError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.log.lock().unwrap().push(format!("played:{}", clip.text));
            Ok(())
        }
    }

    fn arbiter(fail: bool) -> (Log, PlaybackArbiter, mpsc::UnboundedReceiver<SessionEvent>) {
        let log: Log = Arc::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let a = PlaybackArbiter::new(
            Arc::new(SlowVoice { log: log.clone(), fail }),
            Arc::new(Speaker { log: log.clone() }),
            tx,
        );
        (log, a, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn new_speech_cancels_previous() {
        let (log, mut a, mut rx) = arbiter(false);
        a.speak("first", 1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        a.speak("second", 2);
        assert_eq!(rx.recv().await, Some(SessionEvent::PlaybackFinished { token: 2 }));
        let log = log.lock().unwrap().clone();
        assert!(!log.contains(&"played:first".to_string()));
        assert!(log.contains(&"played:second".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_failure_skips_playback_but_reports_finish() {
        let (log, mut a, mut rx) = arbiter(true);
        a.speak("hello", 7);
        assert_eq!(rx.recv().await, Some(SessionEvent::PlaybackFinished { token: 7 }));
        assert_eq!(*log.lock().unwrap(), vec!["synth:hello".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences() {
        let (_log, mut a, mut rx) = arbiter(false);
        a.stop();
        a.speak("hello", 1);
        assert!(a.is_speaking());
        a.stop();
        a.stop();
        assert!(!a.is_speaking());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
