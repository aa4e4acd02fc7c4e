//! HTTP text-to-speech client.
//!
//! Talks to an ElevenLabs-compatible endpoint:
//! `POST {base_url}/v1/text-to-speech/{voice_id}` with the API key in the
//! `xi-api-key` header, returning MPEG audio.

use async_trait::async_trait;
use reminisce_types::ReminisceError;
use serde::Serialize;
use tracing::debug;

use crate::providers::{SpeechClip, SpeechSynthesizer};

pub const DEFAULT_TTS_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_TTS_MODEL: &str = "eleven_monolingual_v1";

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct HttpSpeechSynthesizer {
    base_url: String,
    voice_id: String,
    api_key: String,
    model_id: String,
    client: reqwest::Client,
}

impl HttpSpeechSynthesizer {
    pub fn new(base_url: impl Into<String>, voice_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            voice_id: voice_id.into(),
            api_key: api_key.into(),
            model_id: DEFAULT_TTS_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, ReminisceError> {
        let err = |e: reqwest::Error| ReminisceError::provider("text-to-speech", e);
        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&SynthesisRequest {
                text,
                model_id: &self.model_id,
            })
            .send()
            .await
            .map_err(err)?
            .error_for_status()
            .map_err(err)?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let audio = response.bytes().await.map_err(err)?.to_vec();
        debug!(bytes = audio.len(), "speech synthesized");
        Ok(SpeechClip {
            text: text.to_string(),
            audio,
            mime_type,
        })
    }
}

/// Synthesizer that produces text-only clips, for running without a voice.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextOnlySynthesizer;

#[async_trait]
impl SpeechSynthesizer for TextOnlySynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, ReminisceError> {
        Ok(SpeechClip {
            text: text.to_string(),
            audio: Vec::new(),
            mime_type: String::new(),
        })
    }
}
