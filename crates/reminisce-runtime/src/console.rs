//! Keyboard-driven stand-ins for the microphone and the speaker.
//!
//! [`ConsoleSpeechToText`] turns lines typed at the operator console into
//! transcript fragments. [`ConsoleAudioSink`] "plays" a clip by waiting
//! roughly as long as it would take to say it.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reminisce_types::ReminisceError;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::providers::{AudioSink, SpeechClip, SpeechToText, TranscriptFragment};

/// Rough speaking rate used to size simulated playback.
const PER_WORD: Duration = Duration::from_millis(280);

#[derive(Debug, Default)]
pub struct ConsoleSpeechToText {
    tx: Mutex<Option<mpsc::Sender<TranscriptFragment>>>,
}

impl ConsoleSpeechToText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.tx.lock().map(|tx| tx.is_some()).unwrap_or(false)
    }

    /// Speak `text` into the open capture: an interim snapshot followed by
    /// the committed line. Returns `false` when nothing is listening.
    pub fn feed(&self, text: &str) -> bool {
        let Some(tx) = self.tx.lock().ok().and_then(|tx| tx.clone()) else {
            return false;
        };
        tx.try_send(TranscriptFragment::Interim(text.to_string())).is_ok()
            && tx.try_send(TranscriptFragment::Committed(text.to_string())).is_ok()
    }
}

#[async_trait]
impl SpeechToText for ConsoleSpeechToText {
    async fn open(&self) -> Result<mpsc::Receiver<TranscriptFragment>, ReminisceError> {
        let (tx, rx) = mpsc::channel(64);
        let mut slot = self
            .tx
            .lock()
            .map_err(|_| ReminisceError::provider("speech-to-text", "console state poisoned"))?;
        *slot = Some(tx);
        debug!("console capture opened");
        Ok(rx)
    }

    async fn close(&self) -> Result<(), ReminisceError> {
        if let Ok(mut slot) = self.tx.lock() {
            slot.take();
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAudioSink;

impl ConsoleAudioSink {
    pub fn duration_of(clip: &SpeechClip) -> Duration {
        PER_WORD * clip.text.split_whitespace().count() as u32
    }
}

#[async_trait]
impl AudioSink for ConsoleAudioSink {
    async fn play(&self, clip: SpeechClip) -> Result<(), ReminisceError> {
        let duration = Self::duration_of(&clip);
        info!(
            text = %clip.text,
            bytes = clip.audio.len(),
            duration_ms = duration.as_millis() as u64,
            "playing"
        );
        tokio::time::sleep(duration).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn feed_requires_open_capture() {
        let stt = ConsoleSpeechToText::new();
        assert!(!stt.feed("hello"));

        let mut rx = stt.open().await.unwrap();
        assert!(stt.is_open());
        assert!(stt.feed("hello there"));
        assert_eq!(rx.recv().await, Some(TranscriptFragment::Interim("hello there".into())));
        assert_eq!(rx.recv().await, Some(TranscriptFragment::Committed("hello there".into())));

        stt.close().await.unwrap();
        assert!(!stt.is_open());
        assert_eq!(rx.recv().await, None);
        stt.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn playback_lasts_about_as_long_as_speech() {
        let clip = SpeechClip {
            text: "Look, it's Ana.".into(),
            audio: Vec::new(),
            mime_type: String::new(),
        };
        assert_eq!(ConsoleAudioSink::duration_of(&clip), PER_WORD * 3);

        let start = tokio::time::Instant::now();
        ConsoleAudioSink.play(clip).await.unwrap();
        assert!(start.elapsed() >= PER_WORD * 3);
    }
}
