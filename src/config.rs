use serde::Deserialize;
use std::path::PathBuf;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub tts: TtsConfig,
    pub stt: SttConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Publicly routable base URL the telephony provider can reach (e.g. https://bridge.example.com).
    pub external_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3333
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// The system's outbound phone number (E.164).
    pub from_number: String,
    /// The human's phone number to dial (E.164).
    pub to_number: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TtsConfig {
    pub api_key: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_voice() -> String {
    "default".to_string()
}

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct SttConfig {
    pub api_key: String,
    #[serde(default = "default_stt_model")]
    pub model: String,
}

fn default_stt_model() -> String {
    "whisper-large-v3-turbo".to_string()
}

impl Config {
    /// Load configuration from `path`, a colocated `.env` file, and environment
    /// overrides for secrets.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let env_path = path
            .parent()
            .map(|p| p.join(".env"))
            .unwrap_or_else(|| PathBuf::from(".env"));
        match dotenvy::from_path(&env_path) {
            Ok(()) => tracing::info!(path = %env_path.display(), "Loaded .env"),
            Err(dotenvy::Error::Io(_)) => {
                tracing::debug!(path = %env_path.display(), "No .env file found, using environment only");
            }
            Err(e) => tracing::warn!("Failed to parse .env: {e}"),
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(v) = std::env::var("CALLBRIDGE_ACCOUNT_SID") {
            config.telephony.account_sid = v;
        }
        if let Ok(v) = std::env::var("CALLBRIDGE_AUTH_TOKEN") {
            config.telephony.auth_token = v;
        }
        if let Ok(v) = std::env::var("CALLBRIDGE_TTS_API_KEY") {
            config.tts.api_key = v;
        }
        if let Ok(v) = std::env::var("CALLBRIDGE_STT_API_KEY") {
            config.stt.api_key = v;
        }
        if let Ok(v) = std::env::var("CALLBRIDGE_EXTERNAL_URL") {
            config.server.external_url = v;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.telephony.account_sid.is_empty() {
            return Err(ConfigError::MissingValue("telephony.account_sid"));
        }
        if self.telephony.auth_token.is_empty() {
            return Err(ConfigError::MissingValue("telephony.auth_token"));
        }
        if self.telephony.from_number.is_empty() {
            return Err(ConfigError::MissingValue("telephony.from_number"));
        }
        if self.telephony.to_number.is_empty() {
            return Err(ConfigError::MissingValue("telephony.to_number"));
        }
        if self.tts.api_key.is_empty() {
            return Err(ConfigError::MissingValue("tts.api_key"));
        }
        if self.stt.api_key.is_empty() {
            return Err(ConfigError::MissingValue("stt.api_key"));
        }
        if self.server.external_url.is_empty() {
            return Err(ConfigError::MissingValue("server.external_url"));
        }
        Ok(())
    }

    /// The authority (host[:port]) of the configured public URL, used to build
    /// the `wss://` media-stream URL in the control descriptor.
    pub fn external_host(&self) -> &str {
        self.server
            .external_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                external_url: "https://bridge.example.com".to_string(),
            },
            telephony: TelephonyConfig {
                account_sid: "AC123".to_string(),
                auth_token: "secret".to_string(),
                from_number: "+15550000000".to_string(),
                to_number: "+15550000001".to_string(),
            },
            tts: TtsConfig {
                api_key: "tts-key".to_string(),
                voice: default_voice(),
                speed: default_speed(),
            },
            stt: SttConfig {
                api_key: "stt-key".to_string(),
                model: default_stt_model(),
            },
        }
    }

    #[test]
    fn external_host_strips_scheme_and_trailing_slash() {
        let config = sample_config();
        assert_eq!(config.external_host(), "bridge.example.com");
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut config = sample_config();
        config.tts.api_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn default_port_is_3333() {
        assert_eq!(default_port(), 3333);
    }
}
