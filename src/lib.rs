//! Credit Assistant
//!
//! A customer-service assistant for a digital wallet that:
//! - Answers FAQs, products and promotions from a JSON knowledge base
//! - Simulates fixed-rate credits with a deterministic amortization engine
//!   (the language model never produces figures)
//! - Keeps per-session history and an append-only simulation log
//! - Exports each session as a Markdown slide deck
//!
//! FLOW:
//! MESSAGE → CLASSIFY → EXTRACT → SIMULATE → LOG → REPLY

pub mod agent;
pub mod amortization;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extraction;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod report;
pub mod session;

pub use error::Result;

// Re-export common types
pub use amortization::{
    simulate, AmortizationRow, SimulationError, SimulationRequest, SimulationResult,
};
pub use models::CreditProduct;
