//! External collaborator boundaries.
//!
//! The session core never talks to a network or a device directly. Speech
//! capture, speech synthesis, audio output and the language model all sit
//! behind the traits below so they can be swapped for HTTP clients, local
//! engines or test doubles.

use async_trait::async_trait;
use reminisce_hal::CameraFrame;
use reminisce_types::{Consolidation, Identity, ReminisceError};
use tokio::sync::mpsc;

/// One update from a streaming speech-to-text provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptFragment {
    /// Provisional text that may still be revised. Replaces the previous
    /// interim snapshot.
    Interim(String),
    /// Finalized text. Appended to the committed transcript exactly once.
    Committed(String),
}

/// A streaming speech-to-text session.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Open a capture session. Fragments arrive on the returned channel until
    /// [`close`](Self::close) is called, after which the provider flushes any
    /// final text and drops its sender.
    async fn open(&self) -> Result<mpsc::Receiver<TranscriptFragment>, ReminisceError>;

    /// Close the current capture session. Must be safe with none open.
    async fn close(&self) -> Result<(), ReminisceError>;
}

/// Synthesized speech ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub text: String,
    pub audio: Vec<u8>,
    /// e.g. `"audio/mpeg"`; empty for text-only clips.
    pub mime_type: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, ReminisceError>;
}

/// Audio output device. `play` resolves when playback has finished; dropping
/// the future stops playback.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, clip: SpeechClip) -> Result<(), ReminisceError>;
}

/// Everything the greeting model is shown about the person who arrived.
#[derive(Debug, Clone)]
pub struct GreetingRequest {
    pub identity: Identity,
    /// The frame the person was recognized in, when available.
    pub frame: Option<CameraFrame>,
}

/// The language-model collaborator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One short sentence telling the patient who has arrived.
    async fn greet(&self, request: GreetingRequest) -> Result<String, ReminisceError>;

    /// Summarise what `identity` said during one conversation.
    async fn summarize(&self, identity: &str, transcript: &str) -> Result<Consolidation, ReminisceError>;
}
