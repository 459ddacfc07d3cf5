use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Default behavioral instruction sent with every chat request.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly AI assistant, named Ketta. \
Keep your responses concise, conversational, courteous and under 40 words. \
Try to be funny sometimes, depending on conversation history. \
Don't introduce yourself unless asked. Act a little like Jarvis. \
Your responses must cater to the user's query, while being human like. \
If you feel the need to include a pause when your response is being read aloud, \
add <break time='0.5s'/> at that place and replace the 0.5s with the amount of time \
you think will be appropriate. For example 'let me think about it. <break time='1.0s'/> \
Yes you are right.' You were developed by the company called STRT";

const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const DEFAULT_SPEECH_MODEL: &str = "eleven_multilingual_v2";
const DEFAULT_AUDIO_FORMAT: &str = "mp3_44100_128";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub models: ModelConfig,
    pub google: GoogleConfig,
    pub speech: SpeechConfig,
    pub chat: ChatConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Model used for chat replies (e.g., gemini-2.0-flash)
    pub text_model: String,
    /// Model used for history summarization; falls back to `text_model`
    pub summary_model: String,
    /// Attach the Google Search tool to chat requests
    pub search_grounding: bool,
    pub system_instruction: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub api_key: Option<Secret<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    pub api_key: Option<Secret<String>>,
    pub voice_id: String,
    pub model_id: String,
    pub output_format: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub default_mode: ResponseMode,
    /// Synthesize speech for buffered replies
    pub audio_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub timeout_secs: u64,
}

/// How `/api/chat` delivers the generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Wait for the full reply and return JSON
    Buffered,
    /// Relay fragments as a chunked `text/plain` body
    Streaming,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buffered" => Ok(ResponseMode::Buffered),
            "streaming" | "stream" => Ok(ResponseMode::Streaming),
            other => Err(format!("unknown response mode '{}'", other)),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            summary_model: DEFAULT_TEXT_MODEL.to_string(),
            search_grounding: false,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_SPEECH_MODEL.to_string(),
            output_format: DEFAULT_AUDIO_FORMAT.to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_mode: ResponseMode::Buffered,
            audio_enabled: false,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            models: ModelConfig::default(),
            google: GoogleConfig { api_key: None },
            speech: SpeechConfig::default(),
            chat: ChatConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Read the relay settings from the process environment on top of
    /// already loaded common settings.
    pub fn from_env(common: core_config::Config) -> Result<Self, AppError> {
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Missing credentials are tolerated: the process starts and calls to the
    /// unconfigured provider fail at request time.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RelayConfig::default();

        let text_model = lookup("RELAY_TEXT_MODEL").unwrap_or(defaults.models.text_model);
        let summary_model = lookup("RELAY_SUMMARY_MODEL").unwrap_or_else(|| text_model.clone());

        let google_key = secret(lookup("GOOGLE_API_KEY"));
        if google_key.is_none() {
            tracing::warn!("GOOGLE_API_KEY is not set; text generation requests will fail");
        }

        let speech_key = secret(lookup("ELEVENLABS_API_KEY"));
        let audio_enabled = parse_or(&lookup, "RELAY_AUDIO_ENABLED", defaults.chat.audio_enabled)?;
        if speech_key.is_none() && audio_enabled {
            tracing::warn!("ELEVENLABS_API_KEY is not set; speech synthesis requests will fail");
        }

        Ok(RelayConfig {
            common,
            models: ModelConfig {
                text_model,
                summary_model,
                search_grounding: parse_or(
                    &lookup,
                    "RELAY_SEARCH_GROUNDING",
                    defaults.models.search_grounding,
                )?,
                system_instruction: lookup("RELAY_SYSTEM_INSTRUCTION")
                    .unwrap_or(defaults.models.system_instruction),
            },
            google: GoogleConfig {
                api_key: google_key,
            },
            speech: SpeechConfig {
                api_key: speech_key,
                voice_id: lookup("ELEVENLABS_VOICE_ID").unwrap_or(defaults.speech.voice_id),
                model_id: lookup("ELEVENLABS_MODEL_ID").unwrap_or(defaults.speech.model_id),
                output_format: lookup("ELEVENLABS_OUTPUT_FORMAT")
                    .unwrap_or(defaults.speech.output_format),
                stability: parse_or(&lookup, "ELEVENLABS_STABILITY", defaults.speech.stability)?,
                similarity_boost: parse_or(
                    &lookup,
                    "ELEVENLABS_SIMILARITY_BOOST",
                    defaults.speech.similarity_boost,
                )?,
                style: parse_or(&lookup, "ELEVENLABS_STYLE", defaults.speech.style)?,
                use_speaker_boost: parse_or(
                    &lookup,
                    "ELEVENLABS_SPEAKER_BOOST",
                    defaults.speech.use_speaker_boost,
                )?,
            },
            chat: ChatConfig {
                default_mode: parse_or(&lookup, "RELAY_CHAT_MODE", defaults.chat.default_mode)?,
                audio_enabled,
            },
            upstream: UpstreamConfig {
                timeout_secs: parse_or(
                    &lookup,
                    "UPSTREAM_TIMEOUT_SECS",
                    defaults.upstream.timeout_secs,
                )?,
            },
        })
    }
}

fn secret(value: Option<String>) -> Option<Secret<String>> {
    value.filter(|v| !v.trim().is_empty()).map(Secret::new)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, e))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<RelayConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RelayConfig::from_lookup(core_config::Config::default(), |key| vars.get(key).cloned())
    }

    #[test]
    fn missing_credentials_are_tolerated() {
        let config = load(&[]).unwrap();

        assert!(config.google.api_key.is_none());
        assert!(config.speech.api_key.is_none());
        assert_eq!(config.models.text_model, DEFAULT_TEXT_MODEL);
        assert_eq!(config.chat.default_mode, ResponseMode::Buffered);
        assert!(!config.models.search_grounding);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("GOOGLE_API_KEY", "g-key"),
            ("RELAY_TEXT_MODEL", "gemini-2.5-flash"),
            ("RELAY_SEARCH_GROUNDING", "true"),
            ("RELAY_CHAT_MODE", "streaming"),
            ("ELEVENLABS_STABILITY", "0.3"),
        ])
        .unwrap();

        assert_eq!(
            config.google.api_key.as_ref().unwrap().expose_secret(),
            "g-key"
        );
        assert_eq!(config.models.text_model, "gemini-2.5-flash");
        assert_eq!(config.models.summary_model, "gemini-2.5-flash");
        assert!(config.models.search_grounding);
        assert_eq!(config.chat.default_mode, ResponseMode::Streaming);
        assert!((config.speech.stability - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let config = load(&[("GOOGLE_API_KEY", "  ")]).unwrap();
        assert!(config.google.api_key.is_none());
    }

    #[test]
    fn invalid_flag_is_a_config_error() {
        let err = load(&[("RELAY_SEARCH_GROUNDING", "sometimes")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
