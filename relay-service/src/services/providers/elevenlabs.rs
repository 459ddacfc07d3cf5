//! ElevenLabs text-to-speech provider.

use super::{ProviderError, SpeechProvider, VoiceSettings};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;

const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io/v1";

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: Option<Secret<String>>,
    pub timeout: Duration,
    pub base_url: String,
}

impl ElevenLabsConfig {
    pub fn new(api_key: Option<Secret<String>>, timeout: Duration) -> Self {
        Self {
            api_key,
            timeout,
            base_url: ELEVENLABS_API_BASE.to_string(),
        }
    }
}

pub struct ElevenLabsSpeechProvider {
    config: ElevenLabsConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettingsBody,
}

#[derive(Debug, Serialize)]
struct VoiceSettingsBody {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl ElevenLabsSpeechProvider {
    pub fn new(config: ElevenLabsConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsSpeechProvider {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceSettings,
    ) -> Result<Vec<u8>, ProviderError> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured("ElevenLabs API key not configured".to_string())
        })?;

        let request = TextToSpeechRequest {
            text,
            model_id: &voice.model_id,
            voice_settings: VoiceSettingsBody {
                stability: voice.stability,
                similarity_boost: voice.similarity_boost,
                style: voice.style,
                use_speaker_boost: voice.use_speaker_boost,
            },
        };

        tracing::debug!(
            voice_id = %voice.voice_id,
            model_id = %voice.model_id,
            text_len = text.len(),
            "Sending text-to-speech request to ElevenLabs"
        );

        let response = self
            .client
            .post(format!(
                "{}/text-to-speech/{}",
                self.config.base_url, voice.voice_id
            ))
            .query(&[("output_format", voice.output_format.as_str())])
            .header("xi-api-key", api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "ElevenLabs API error {}: {}",
                status, error_text
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if audio.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "ElevenLabs returned no audio".to_string(),
            ));
        }

        Ok(audio.to_vec())
    }
}
