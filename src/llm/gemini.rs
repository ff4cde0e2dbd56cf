//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{ChatTurn, CompletionRequest, LanguageModel, TurnRole};
use crate::error::AssistantError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/{}:generateContent", API_BASE, model),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn complete(&self, request: &CompletionRequest) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(AssistantError::Llm("GEMINI_API_KEY not configured".to_string()));
        }

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let body = GeminiRequest::from(request);

        debug!(turns = request.turns.len(), "Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AssistantError::Llm(format!("Gemini API request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(AssistantError::Llm(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AssistantError::Llm(format!("Gemini parse error: {}", e))
        })?;

        extract_answer(gemini_response)
    }
}

fn extract_answer(response: GeminiResponse) -> crate::Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AssistantError::Llm("No response from Gemini API".to_string()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            warn!(finish_reason = reason, "Gemini response did not finish cleanly");
        }
    }

    let answer: String = candidate
        .content
        .parts
        .into_iter()
        .map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");

    if answer.trim().is_empty() {
        return Err(AssistantError::Llm("Empty response from Gemini".to_string()));
    }

    if let Some(usage) = response.usage_metadata {
        debug!(
            prompt_tokens = usage.prompt_token_count,
            candidate_tokens = usage.candidates_token_count,
            "Gemini response received"
        );
    }

    Ok(answer)
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

impl From<&CompletionRequest> for GeminiRequest {
    fn from(request: &CompletionRequest) -> Self {
        Self {
            contents: request.turns.iter().map(Content::from).collect(),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: request.max_output_tokens,
            },
            system_instruction: request.system.as_ref().map(|text| SystemInstruction {
                parts: vec![Part { text: text.clone() }],
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl From<&ChatTurn> for Content {
    fn from(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Assistant => "model",
        };

        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: turn.content.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i32,
    #[serde(default)]
    candidates_token_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = CompletionRequest::chat(
            "Eres un asistente",
            vec![
                ChatTurn::user("¿Qué es peiGo?"),
                ChatTurn::assistant("Una app financiera."),
            ],
        );

        let json = serde_json::to_value(GeminiRequest::from(&request)).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "¿Qué es peiGo?");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 300);
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "Eres un asistente"
        );
    }

    #[test]
    fn test_extraction_request_has_no_system_instruction() {
        let request = CompletionRequest::extraction("extrae".to_string());
        let json = serde_json::to_value(GeminiRequest::from(&request)).unwrap();
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_extract_answer_joins_parts() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hola, "}, {"text": "¿en qué te ayudo?"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 8}
        }"#;

        let response: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_answer(response).unwrap(), "Hola, ¿en qué te ayudo?");
    }

    #[test]
    fn test_extract_answer_without_candidates() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(extract_answer(response), Err(AssistantError::Llm(_))));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(String::new(), "gemini-2.0-flash").unwrap();
        assert!(client.endpoint().ends_with("gemini-2.0-flash:generateContent"));

        let request = CompletionRequest::extraction("hola".to_string());
        let error = client.complete(&request).await.unwrap_err();
        assert!(error.to_string().to_lowercase().contains("api_key"));
    }
}
