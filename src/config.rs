//! Runtime configuration from environment variables

use crate::agent::DEFAULT_MAX_DIALOGUE_TURNS;
use crate::api::DEFAULT_SESSION_TTL_MINUTES;
use crate::error::AssistantError;
use crate::Result;
use std::path::PathBuf;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_KNOWLEDGE_BASE_PATH: &str = "knowledge_base.json";
pub const DEFAULT_PORT: u16 = 8080;
/// One year
const MAX_SESSION_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// None runs the assistant offline
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub knowledge_base_path: PathBuf,
    pub port: u16,
    pub report_dir: PathBuf,
    pub max_dialogue_turns: usize,
    /// Idle minutes before the HTTP server forgets a chat session
    pub session_ttl_minutes: i64,
}

impl AppConfig {
    /// Read from the process environment (call `dotenv` first)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| AssistantError::Config(format!("Invalid port '{}': {}", raw, e)))?,
            None => DEFAULT_PORT,
        };

        let max_dialogue_turns = match get("MAX_DIALOGUE_TURNS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(turns) if turns > 0 => turns,
                _ => {
                    return Err(AssistantError::Config(format!(
                        "MAX_DIALOGUE_TURNS must be a positive integer, got '{}'",
                        raw
                    )))
                }
            },
            None => DEFAULT_MAX_DIALOGUE_TURNS,
        };

        let session_ttl_minutes = match get("SESSION_TTL_MINUTES") {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(minutes) if (1..=MAX_SESSION_TTL_MINUTES).contains(&minutes) => minutes,
                _ => {
                    return Err(AssistantError::Config(format!(
                        "SESSION_TTL_MINUTES must be between 1 and {}, got '{}'",
                        MAX_SESSION_TTL_MINUTES, raw
                    )))
                }
            },
            None => DEFAULT_SESSION_TTL_MINUTES,
        };

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            knowledge_base_path: get("KNOWLEDGE_BASE_PATH")
                .unwrap_or_else(|| DEFAULT_KNOWLEDGE_BASE_PATH.to_string())
                .into(),
            port,
            report_dir: get("REPORT_DIR").unwrap_or_else(|| ".".to_string()).into(),
            max_dialogue_turns,
            session_ttl_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.knowledge_base_path, PathBuf::from("knowledge_base.json"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.report_dir, PathBuf::from("."));
        assert_eq!(config.max_dialogue_turns, 20);
        assert_eq!(config.session_ttl_minutes, 30);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "secret"),
            ("API_PORT", "9000"),
            ("REPORT_DIR", "/tmp/reports"),
            ("MAX_DIALOGUE_TURNS", "6"),
            ("SESSION_TTL_MINUTES", "90"),
        ])
        .unwrap();

        assert_eq!(config.gemini_api_key.as_deref(), Some("secret"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.report_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.max_dialogue_turns, 6);
        assert_eq!(config.session_ttl_minutes, 90);

        // PORT wins over API_PORT
        let config = config_from(&[("PORT", "3000"), ("API_PORT", "9000")]).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_blank_key_means_offline() {
        let config = config_from(&[("GEMINI_API_KEY", "  ")]).unwrap();
        assert_eq!(config.gemini_api_key, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("PORT", "eighty")]),
            Err(AssistantError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("MAX_DIALOGUE_TURNS", "0")]),
            Err(AssistantError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("SESSION_TTL_MINUTES", "-5")]),
            Err(AssistantError::Config(_))
        ));
    }
}
