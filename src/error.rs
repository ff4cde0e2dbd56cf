//! Error types for the credit assistant

use crate::amortization::SimulationError;
use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Collaborator Errors
    // =============================

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Knowledge base error: {0}")]
    KnowledgeBase(String),

    #[error("Parameter extraction error: {0}")]
    Extraction(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // Domain + Library Conversions
    // =============================

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
