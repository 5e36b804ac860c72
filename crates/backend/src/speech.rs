use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use snafu::ResultExt;

use super::error::{BackendResult, SpeechBodySnafu, SpeechRequestSnafu, SpeechStatusSnafu};

/// Fixed synthesis model the speech endpoint is driven with.
pub const SPEECH_MODEL_ID: &str = "eleven_multilingual_v2";

/// Seam over the speech-synthesis backend: text in, audio bytes out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, api_key: &str, voice_id: &str, text: &str)
    -> BackendResult<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
    style: f64,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.8,
            similarity_boost: 0.75,
            style: 0.1,
            use_speaker_boost: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'static str,
    voice_settings: VoiceSettings,
}

impl<'a> SpeechRequest<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            model_id: SPEECH_MODEL_ID,
            voice_settings: VoiceSettings::default(),
        }
    }
}

/// Synthesizes speech through the ElevenLabs-style HTTP endpoint.
pub struct HttpSpeechSynthesizer {
    client: Client,
    base_url: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn synthesis_url(&self, voice_id: &str) -> String {
        format!("{}/v1/text-to-speech/{voice_id}", self.base_url)
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(
        &self,
        api_key: &str,
        voice_id: &str,
        text: &str,
    ) -> BackendResult<Vec<u8>> {
        let url = self.synthesis_url(voice_id);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&SpeechRequest::new(text))
            .send()
            .await
            .context(SpeechRequestSnafu {
                stage: "speech-synthesize-send",
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return SpeechStatusSnafu {
                stage: "speech-synthesize-status",
                status: status.as_u16(),
                body,
            }
            .fail();
        }

        let audio = response.bytes().await.context(SpeechBodySnafu {
            stage: "speech-synthesize-read-body",
        })?;

        tracing::debug!(voice_id = %voice_id, audio_bytes = audio.len(), "speech synthesis completed");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_fixed_model_and_voice_settings() {
        let request = SpeechRequest::new("Bonjour");
        let serialized = serde_json::to_value(&request).expect("serialize");

        assert_eq!(serialized["text"], "Bonjour");
        assert_eq!(serialized["model_id"], SPEECH_MODEL_ID);
        assert_eq!(serialized["voice_settings"]["stability"], 0.8);
        assert_eq!(serialized["voice_settings"]["similarity_boost"], 0.75);
        assert_eq!(serialized["voice_settings"]["use_speaker_boost"], false);
    }

    #[test]
    fn synthesis_url_embeds_the_voice() {
        let synthesizer = HttpSpeechSynthesizer::new("https://api.example.test/");
        assert_eq!(
            synthesizer.synthesis_url("voice-123"),
            "https://api.example.test/v1/text-to-speech/voice-123"
        );
    }
}
