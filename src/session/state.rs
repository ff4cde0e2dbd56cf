//! Per-session user context and the simulation log

use crate::amortization::{SimulationRequest, SimulationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successful simulation, as shown to the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationRecord {
    pub recorded_at: DateTime<Utc>,
    pub request: SimulationRequest,
    pub annual_interest_rate: f64,
    pub result: SimulationResult,
}

impl SimulationRecord {
    pub fn new(request: SimulationRequest, annual_interest_rate: f64, result: SimulationResult) -> Self {
        Self {
            recorded_at: Utc::now(),
            request,
            annual_interest_rate,
            result,
        }
    }
}

/// Append-only log of the simulations of a session.
/// The engine never sees it; callers append what they showed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SimulationLog {
    records: Vec<SimulationRecord>,
}

impl SimulationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: SimulationRecord) {
        self.records.push(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimulationRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&SimulationRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What the assistant knows about the user in this session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub user_name: Option<String>,
    /// Products the user asked about
    interests: Vec<String>,
    /// Products named in assistant replies
    products_discussed: Vec<String>,
    pub simulations: SimulationLog,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interests(&self) -> &[String] {
        &self.interests
    }

    pub fn products_discussed(&self) -> &[String] {
        &self.products_discussed
    }

    /// Returns false if already recorded
    pub fn add_interest(&mut self, product_name: &str) -> bool {
        push_unique(&mut self.interests, product_name)
    }

    /// Returns false if already recorded
    pub fn mark_product_discussed(&mut self, product_name: &str) -> bool {
        push_unique(&mut self.products_discussed, product_name)
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|existing| existing == value) {
        return false;
    }
    list.push(value.to_string());
    true
}
