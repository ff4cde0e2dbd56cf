//! Language model trait and implementations
//!
//! The model writes prose only. Numbers shown to the user always come from
//! the amortization engine.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub mod gemini;
pub use gemini::GeminiClient;

/// Who said a turn in the model dialogue
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub turns: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl CompletionRequest {
    /// Conversational reply with the assistant persona
    pub fn chat(system: &str, turns: Vec<ChatTurn>) -> Self {
        Self {
            system: Some(system.to_string()),
            turns,
            temperature: 0.7,
            max_output_tokens: 300,
        }
    }

    /// Deterministic single-shot prompt (e.g. JSON extraction)
    pub fn extraction(prompt: String) -> Self {
        Self {
            system: None,
            turns: vec![ChatTurn::user(prompt)],
            temperature: 0.0,
            max_output_tokens: 150,
        }
    }
}

/// Trait for text generation backends
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

pub const OFFLINE_REPLY: &str = "Ahora mismo trabajo sin conexión al asistente conversacional. Puedo simular créditos si me indicas el producto, el monto y el plazo en meses, por ejemplo: \"simular Crédito Personal de $20,000 a 12 meses\".";

/// Model used when no API key is configured.
/// Keeps simulations and reports usable without network access.
pub struct OfflineModel;

#[async_trait]
impl LanguageModel for OfflineModel {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Ok(OFFLINE_REPLY.to_string())
    }
}

/// Gemini when an API key is configured, offline otherwise
pub fn select_model(api_key: Option<String>, model: &str) -> Result<Arc<dyn LanguageModel>> {
    match api_key {
        Some(key) => Ok(Arc::new(GeminiClient::new(key, model)?)),
        None => {
            warn!("GEMINI_API_KEY not set, running without the conversational model");
            Ok(Arc::new(OfflineModel))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_model() {
        let request = CompletionRequest::extraction("hola".to_string());
        let reply = tokio_test::block_on(OfflineModel.complete(&request)).unwrap();
        assert_eq!(reply, OFFLINE_REPLY);
    }

    #[test]
    fn test_request_presets() {
        let chat = CompletionRequest::chat("system", vec![ChatTurn::user("hola")]);
        assert_eq!(chat.max_output_tokens, 300);
        assert_eq!(chat.system.as_deref(), Some("system"));

        let extraction = CompletionRequest::extraction("json please".to_string());
        assert_eq!(extraction.temperature, 0.0);
        assert!(extraction.system.is_none());
        assert_eq!(extraction.turns[0].role, TurnRole::User);
    }

    #[test]
    fn test_select_model() {
        assert_eq!(select_model(None, "gemini-2.0-flash").unwrap().name(), "offline");
        assert_eq!(
            select_model(Some("key".to_string()), "gemini-2.0-flash").unwrap().name(),
            "gemini"
        );
    }
}
