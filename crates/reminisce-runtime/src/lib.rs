//! `reminisce-runtime` – the presence-triggered session core.
//!
//! Ties "who is in front of the camera" to a conversation: recording starts
//! when a known person arrives, a short greeting reminds the patient who they
//! are, and once the person leaves the transcript is summarised into a memory
//! that personalises the next greeting.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`SessionOrchestrator`]: the single-owner session
//!   state machine. Applies [`SessionEvent`]s one at a time and spawns the
//!   slow work (greeting, speech, consolidation, grace timer).
//! - [`presence_loop`] – [`PresenceLoop`]: polls the camera, recognizes
//!   faces single-flight and debounces verdicts into presence events.
//! - [`transcription`] – [`TranscriptionSession`]: one speech-to-text capture
//!   with separate committed and interim buffers.
//! - [`playback`] – [`PlaybackArbiter`]: at most one utterance at a time.
//! - [`consolidator`] – [`MemoryConsolidator`] and the per-identity
//!   [`ConsolidationQueue`].
//! - [`enrollment`] – [`enroll_from_frame`]: describe a face and store it,
//!   used by the consent prompt and by caregiver enrollment.
//! - [`llm_driver`] – [`LlmDriver`]: an OpenAI-compatible chat client used
//!   for greetings (optionally with the camera frame) and for structured
//!   summaries constrained by the [`Consolidation`][reminisce_types::Consolidation]
//!   JSON Schema.
//! - [`speech_http`] – [`HttpSpeechSynthesizer`] for ElevenLabs-style TTS.
//! - [`console`] – keyboard stand-ins for the microphone and speaker.
//! - [`settings`] – [`SettingsHandle`]: live, watch-distributed settings.
//! - [`telemetry`] – [`init_tracing`]: the `tracing` subscriber with an
//!   optional OTLP span exporter.

pub mod console;
pub mod consolidator;
pub mod enrollment;
pub mod events;
pub mod llm_driver;
pub mod orchestrator;
pub mod playback;
pub mod presence_loop;
pub mod providers;
pub mod settings;
pub mod speech_http;
pub mod telemetry;
pub mod transcription;

pub use console::{ConsoleAudioSink, ConsoleSpeechToText};
pub use consolidator::{ConsolidationQueue, MemoryConsolidator};
pub use enrollment::{NEW_PERSON_BIO, enroll_from_frame};
pub use events::{SessionEvent, SessionHandle, SessionToken};
pub use llm_driver::{CARE_GUIDELINES, ChatMessage, LlmDriver, LlmError, Role};
pub use orchestrator::{SessionDeps, SessionOrchestrator, SessionState};
pub use playback::PlaybackArbiter;
pub use presence_loop::{LoopStats, PresenceLoop};
pub use providers::{
    AudioSink, GreetingRequest, LanguageModel, SpeechClip, SpeechSynthesizer, SpeechToText,
    TranscriptFragment,
};
pub use settings::SettingsHandle;
pub use speech_http::{HttpSpeechSynthesizer, TextOnlySynthesizer};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
pub use transcription::{TranscriptBuffer, TranscriptionSession};
