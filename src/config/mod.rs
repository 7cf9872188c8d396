//! Configuration management for the voice bot
//!
//! Values are layered: built-in defaults, then the optional TOML file, then
//! environment variables. CLI flags are applied on top by the binary.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

pub use file::{VoicebotConfigFile, config_file_path, load_config_file};

/// Groq's OpenAI-compatible chat completions endpoint
pub const DEFAULT_COMPLETION_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default completion model
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Default reply bound in tokens
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Default completion timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const DEFAULT_STT_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEFAULT_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Voice bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Profile document path; `None` uses the embedded profile
    pub profile_path: Option<PathBuf>,

    /// Initial auto-speak preference for the session
    pub auto_speak: bool,

    /// Completion endpoint configuration
    pub completion: CompletionConfig,

    /// Voice configuration
    pub voice: VoiceConfig,
}

/// Completion endpoint configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Chat completions URL
    pub url: String,

    /// Model identifier
    pub model: String,

    /// Maximum reply length in tokens
    pub max_tokens: u32,

    /// Request timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,

    /// Maximum prior turns sent per request; `None` sends the whole session
    pub history_limit: Option<usize>,

    /// Bearer credential; absence surfaces as a completion failure
    pub api_key: Option<SecretString>,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable voice input/output
    pub enabled: bool,

    /// Credential for the STT/TTS endpoints
    pub api_key: Option<SecretString>,

    /// Transcriptions URL
    pub stt_url: String,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// Recognition language hint
    pub language: String,

    /// Speech synthesis URL
    pub tts_url: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// How long a listening session waits for speech
    pub no_speech_timeout: Duration,

    /// Interval between interim transcripts; `None` disables them
    pub interim_interval: Option<Duration>,

    /// Longest utterance kept before it is transcribed as-is
    pub max_utterance: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_COMPLETION_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            history_limit: None,
            api_key: None,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            stt_url: DEFAULT_STT_URL.to_string(),
            stt_model: "whisper-1".to_string(),
            language: "en".to_string(),
            tts_url: DEFAULT_TTS_URL.to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            no_speech_timeout: Duration::from_secs(8),
            interim_interval: Some(Duration::from_secs(2)),
            max_utterance: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// `disable_voice` wins over every other source.
    #[must_use]
    pub fn load_with_options(disable_voice: bool) -> Self {
        let file_path = std::env::var("VOICEBOT_CONFIG").ok().map(PathBuf::from);
        let file = load_config_file(file_path.as_deref());
        let mut config = Self::from_sources(file, |key| std::env::var(key).ok());

        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
            config.voice.enabled = false;
        }

        config
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Environment values win over file values; unparsable numbers fall back
    /// to the next layer with a warning.
    pub fn from_sources(file: VoicebotConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let env_str = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let env_parse = |key: &str| -> Option<u64> {
            let raw = env_str(key)?;
            raw.trim().parse().map_or_else(
                |_| {
                    tracing::warn!(key, value = %raw, "ignoring non-numeric value");
                    None
                },
                Some,
            )
        };
        let env_bool = |key: &str| {
            env_str(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        };
        let secret = |value: Option<String>| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };

        let completion_defaults = CompletionConfig::default();
        let fc = file.completion;

        let timeout_secs = env_parse("VOICEBOT_TIMEOUT_SECS")
            .or(fc.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let completion = CompletionConfig {
            url: env_str("VOICEBOT_API_URL")
                .or(fc.url)
                .unwrap_or(completion_defaults.url),
            model: env_str("VOICEBOT_MODEL")
                .or(fc.model)
                .unwrap_or(completion_defaults.model),
            max_tokens: env_parse("VOICEBOT_MAX_TOKENS")
                .and_then(|v| u32::try_from(v).ok())
                .or(fc.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            history_limit: env_parse("VOICEBOT_HISTORY_LIMIT")
                .and_then(|v| usize::try_from(v).ok())
                .or(fc.history_limit),
            api_key: secret(env_str("GROQ_API_KEY").or(fc.api_key)),
        };

        let voice_defaults = VoiceConfig::default();
        let fv = file.voice;

        let tts_speed = env_str("VOICEBOT_TTS_SPEED")
            .and_then(|v| v.trim().parse::<f32>().ok())
            .or(fv.tts_speed)
            .unwrap_or(voice_defaults.tts_speed)
            .clamp(0.25, 4.0);

        let interim_secs = env_parse("VOICEBOT_INTERIM_SECS").or(fv.interim_secs);

        let voice = VoiceConfig {
            enabled: fv.enabled.unwrap_or(true),
            api_key: secret(env_str("OPENAI_API_KEY").or(fv.api_key)),
            stt_url: env_str("VOICEBOT_STT_URL")
                .or(fv.stt_url)
                .unwrap_or(voice_defaults.stt_url),
            stt_model: env_str("VOICEBOT_STT_MODEL")
                .or(fv.stt_model)
                .unwrap_or(voice_defaults.stt_model),
            language: env_str("VOICEBOT_LANGUAGE")
                .or(fv.language)
                .unwrap_or(voice_defaults.language),
            tts_url: env_str("VOICEBOT_TTS_URL")
                .or(fv.tts_url)
                .unwrap_or(voice_defaults.tts_url),
            tts_model: env_str("VOICEBOT_TTS_MODEL")
                .or(fv.tts_model)
                .unwrap_or(voice_defaults.tts_model),
            tts_voice: env_str("VOICEBOT_TTS_VOICE")
                .or(fv.tts_voice)
                .unwrap_or(voice_defaults.tts_voice),
            tts_speed,
            no_speech_timeout: env_parse("VOICEBOT_NO_SPEECH_SECS")
                .or(fv.no_speech_secs)
                .map_or(voice_defaults.no_speech_timeout, Duration::from_secs),
            interim_interval: match interim_secs {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => voice_defaults.interim_interval,
            },
            max_utterance: env_parse("VOICEBOT_MAX_UTTERANCE_SECS")
                .or(fv.max_utterance_secs)
                .filter(|secs| *secs > 0)
                .map_or(voice_defaults.max_utterance, Duration::from_secs),
        };

        Self {
            profile_path: env_str("VOICEBOT_PROFILE")
                .map(PathBuf::from)
                .or(file.profile),
            auto_speak: env_bool("VOICEBOT_AUTO_SPEAK")
                .or(file.auto_speak)
                .unwrap_or(true),
            completion,
            voice,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(VoicebotConfigFile::default(), env_of(&[]));

        assert_eq!(config.completion.url, DEFAULT_COMPLETION_URL);
        assert_eq!(config.completion.model, "llama-3.3-70b-versatile");
        assert_eq!(config.completion.max_tokens, 500);
        assert_eq!(config.completion.timeout, Some(Duration::from_secs(60)));
        assert!(config.completion.history_limit.is_none());
        assert!(config.completion.api_key.is_none());
        assert!(config.auto_speak);
        assert!(config.voice.enabled);
        assert_eq!(config.voice.tts_voice, "alloy");
        assert!(config.profile_path.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let file: VoicebotConfigFile = toml::from_str(
            r#"
            auto_speak = false
            [completion]
            model = "from-file"
            max_tokens = 200
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            file,
            env_of(&[
                ("VOICEBOT_MODEL", "from-env"),
                ("GROQ_API_KEY", "gsk_test"),
                ("VOICEBOT_AUTO_SPEAK", "true"),
            ]),
        );

        assert_eq!(config.completion.model, "from-env");
        assert_eq!(config.completion.max_tokens, 200);
        assert!(config.auto_speak);
        assert_eq!(
            config.completion.api_key.as_ref().map(|k| k.expose_secret()),
            Some("gsk_test")
        );
    }

    #[test]
    fn test_blank_key_is_absent() {
        let config = Config::from_sources(
            VoicebotConfigFile::default(),
            env_of(&[("GROQ_API_KEY", "   ")]),
        );
        assert!(config.completion.api_key.is_none());
    }

    #[test]
    fn test_zero_disables_timeout_and_interim() {
        let config = Config::from_sources(
            VoicebotConfigFile::default(),
            env_of(&[("VOICEBOT_TIMEOUT_SECS", "0"), ("VOICEBOT_INTERIM_SECS", "0")]),
        );
        assert!(config.completion.timeout.is_none());
        assert!(config.voice.interim_interval.is_none());
    }

    #[test]
    fn test_max_utterance_layers() {
        let file: VoicebotConfigFile = toml::from_str(
            r#"
            [voice]
            max_utterance_secs = 45
            "#,
        )
        .unwrap();
        let config = Config::from_sources(file, env_of(&[]));
        assert_eq!(config.voice.max_utterance, Duration::from_secs(45));

        let config = Config::from_sources(
            VoicebotConfigFile::default(),
            env_of(&[("VOICEBOT_MAX_UTTERANCE_SECS", "0")]),
        );
        assert_eq!(config.voice.max_utterance, Duration::from_secs(30));
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = Config::from_sources(
            VoicebotConfigFile::default(),
            env_of(&[
                ("VOICEBOT_MAX_TOKENS", "lots"),
                ("VOICEBOT_HISTORY_LIMIT", "8"),
                ("VOICEBOT_TTS_SPEED", "9.5"),
            ]),
        );
        assert_eq!(config.completion.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.completion.history_limit, Some(8));
        assert!((config.voice.tts_speed - 4.0).abs() < f32::EPSILON);
    }
}
