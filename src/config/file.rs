//! TOML configuration file loading
//!
//! Supports `~/.config/voicebot/config.toml` (or `$VOICEBOT_CONFIG`) as a
//! persistent config source. All fields are optional; the file is a partial
//! overlay on top of defaults, and environment variables override it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoicebotConfigFile {
    /// Path to the profile document
    #[serde(default)]
    pub profile: Option<PathBuf>,

    /// Speak replies aloud by default
    #[serde(default)]
    pub auto_speak: Option<bool>,

    /// Completion endpoint configuration
    #[serde(default)]
    pub completion: CompletionFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Completion endpoint configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionFileConfig {
    /// Chat completions URL
    pub url: Option<String>,

    /// Model identifier (e.g. "llama-3.3-70b-versatile")
    pub model: Option<String>,

    /// Maximum reply length in tokens
    pub max_tokens: Option<u32>,

    /// Request timeout in seconds (0 disables)
    pub timeout_secs: Option<u64>,

    /// Maximum number of prior turns sent per request
    pub history_limit: Option<usize>,

    /// Bearer credential (prefer `GROQ_API_KEY`)
    pub api_key: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceFileConfig {
    /// Enable voice input/output
    pub enabled: Option<bool>,

    /// Credential for the STT/TTS endpoints (prefer `OPENAI_API_KEY`)
    pub api_key: Option<String>,

    /// Transcriptions URL
    pub stt_url: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Recognition language hint (ISO 639-1)
    pub language: Option<String>,

    /// Speech synthesis URL
    pub tts_url: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Seconds to wait for speech before giving up
    pub no_speech_secs: Option<u64>,

    /// Seconds between interim transcripts while speaking (0 disables)
    pub interim_secs: Option<u64>,

    /// Longest utterance in seconds before it is cut off and transcribed
    pub max_utterance_secs: Option<u64>,
}

/// Load the TOML config file from `path`, or from the standard location
///
/// Returns `VoicebotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> VoicebotConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return VoicebotConfigFile::default();
    };

    if !path.exists() {
        return VoicebotConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoicebotConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoicebotConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voicebot/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "voicebot", "voicebot")
        .map(|d| d.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let config: VoicebotConfigFile = toml::from_str(
            r#"
            auto_speak = false

            [completion]
            model = "llama-3.1-8b-instant"
            history_limit = 12

            [voice]
            tts_voice = "nova"
            "#,
        )
        .unwrap();

        assert_eq!(config.auto_speak, Some(false));
        assert_eq!(config.completion.model.as_deref(), Some("llama-3.1-8b-instant"));
        assert_eq!(config.completion.history_limit, Some(12));
        assert!(config.completion.url.is_none());
        assert_eq!(config.voice.tts_voice.as_deref(), Some("nova"));
        assert!(config.profile.is_none());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config_file(Some(Path::new("/nonexistent/voicebot.toml")));
        assert!(config.completion.model.is_none());
        assert!(config.voice.enabled.is_none());
    }

    #[test]
    fn test_invalid_file_yields_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "completion = [not valid").unwrap();

        let config = load_config_file(Some(file.path()));
        assert!(config.completion.max_tokens.is_none());
    }
}
