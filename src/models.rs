//! Core data models for the knowledge base

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

//
// ================= Credit =================
//

/// A credit product and its eligibility bounds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditProduct {
    pub name: String,
    /// Annual rate as a fraction (0.18 = 18%/year)
    #[serde(alias = "interest_rate")]
    pub annual_interest_rate: f64,
    pub min_amount: f64,
    pub max_amount: f64,
    /// Months
    pub min_term: u32,
    /// Months
    pub max_term: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_fees: BTreeMap<String, String>,
}

impl CreditProduct {
    pub fn new(
        name: impl Into<String>,
        annual_interest_rate: f64,
        amount_bounds: (f64, f64),
        term_bounds: (u32, u32),
    ) -> Self {
        Self {
            name: name.into(),
            annual_interest_rate,
            min_amount: amount_bounds.0,
            max_amount: amount_bounds.1,
            min_term: term_bounds.0,
            max_term: term_bounds.1,
            description: None,
            additional_fees: BTreeMap::new(),
        }
    }

    /// Case-insensitive name comparison (Unicode lowercase)
    pub fn matches_name(&self, query: &str) -> bool {
        self.name.to_lowercase() == query.trim().to_lowercase()
    }
}

//
// ================= Knowledge =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Promotion {
    pub name: String,
    pub description: String,
    pub valid_until: NaiveDate,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
