//! Credit amortization engine
//!
//! Fixed-rate, fixed-term loans repaid with the French (annuity) method:
//! a constant installment whose interest share shrinks every period.
//!
//! The engine is a pure function of its inputs. It reads a catalog snapshot,
//! never logs, never touches session state. Callers own the result and decide
//! whether to keep it (see `session::SimulationLog`).
//!
//! Rounding to cents happens only when a row is emitted; the running balance
//! stays unrounded so long schedules do not accumulate drift.

use crate::models::CreditProduct;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

//
// ================= Types =================
//

/// A credit simulation request (product, principal, months)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationRequest {
    pub product_name: String,
    pub amount: f64,
    pub term: u32,
}

/// One period of the amortization table, rounded to cents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AmortizationRow {
    /// 1-based
    pub period: u32,
    pub payment: f64,
    pub principal_component: f64,
    pub interest_component: f64,
    pub remaining_balance: f64,
}

/// Outcome of a successful simulation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    pub monthly_payment: f64,
    pub total_payment: f64,
    pub total_interest: f64,
    pub amortization_table: Vec<AmortizationRow>,
}

impl SimulationResult {
    pub fn term(&self) -> u32 {
        self.amortization_table.len() as u32
    }

    pub fn final_balance(&self) -> f64 {
        self.amortization_table
            .last()
            .map(|row| row.remaining_balance)
            .unwrap_or(0.0)
    }
}

/// Currency amount displayed with two decimals and thousands separators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct Currency(pub f64);

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_currency(self.0))
    }
}

//
// ================= Errors =================
//

/// Input-validation failures. All are recoverable: the caller corrects and retries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("credit product '{product_name}' was not found")]
    ProductNotFound { product_name: String },

    #[error("amount {amount} is out of range: it must be between {min} and {max}")]
    AmountOutOfRange {
        amount: Currency,
        min: Currency,
        max: Currency,
    },

    #[error("term of {term} months is out of range: it must be between {min} and {max} months")]
    TermOutOfRange { term: u32, min: u32, max: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimulationErrorKind {
    ProductNotFound,
    AmountOutOfRange,
    TermOutOfRange,
    InvalidInput,
}

/// Boundary form of a failed simulation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationFailure {
    pub error_kind: SimulationErrorKind,
    pub message: String,
}

impl SimulationError {
    pub fn kind(&self) -> SimulationErrorKind {
        match self {
            SimulationError::ProductNotFound { .. } => SimulationErrorKind::ProductNotFound,
            SimulationError::AmountOutOfRange { .. } => SimulationErrorKind::AmountOutOfRange,
            SimulationError::TermOutOfRange { .. } => SimulationErrorKind::TermOutOfRange,
            SimulationError::InvalidInput(_) => SimulationErrorKind::InvalidInput,
        }
    }

    pub fn to_failure(&self) -> SimulationFailure {
        SimulationFailure {
            error_kind: self.kind(),
            message: self.to_string(),
        }
    }
}

//
// ================= Engine =================
//

/// Stateless engine bound to a catalog snapshot
#[derive(Debug, Clone, Copy)]
pub struct AmortizationEngine<'a> {
    catalog: &'a [CreditProduct],
}

impl<'a> AmortizationEngine<'a> {
    pub fn new(catalog: &'a [CreditProduct]) -> Self {
        Self { catalog }
    }

    pub fn find_product(&self, product_name: &str) -> Option<&'a CreditProduct> {
        find_product(self.catalog, product_name)
    }

    pub fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult, SimulationError> {
        simulate(self.catalog, &request.product_name, request.amount, request.term)
    }
}

/// First catalog entry whose name matches case-insensitively
pub fn find_product<'a>(catalog: &'a [CreditProduct], product_name: &str) -> Option<&'a CreditProduct> {
    catalog.iter().find(|product| product.matches_name(product_name))
}

/// Validate a request against the product's bounds and build its schedule.
///
/// Checks run in a fixed order and the first failure is returned:
/// malformed amount, unknown product, unusable product terms, amount bounds, term bounds.
pub fn simulate(
    catalog: &[CreditProduct],
    product_name: &str,
    amount: f64,
    term: u32,
) -> Result<SimulationResult, SimulationError> {
    if !amount.is_finite() {
        return Err(SimulationError::InvalidInput(format!(
            "amount must be a finite number, got {}",
            amount
        )));
    }

    let product = find_product(catalog, product_name).ok_or_else(|| {
        SimulationError::ProductNotFound {
            product_name: product_name.trim().to_string(),
        }
    })?;

    check_product_terms(product)?;

    if amount < product.min_amount || amount > product.max_amount {
        return Err(SimulationError::AmountOutOfRange {
            amount: Currency(amount),
            min: Currency(product.min_amount),
            max: Currency(product.max_amount),
        });
    }

    if term < product.min_term || term > product.max_term {
        return Err(SimulationError::TermOutOfRange {
            term,
            min: product.min_term,
            max: product.max_term,
        });
    }

    build_schedule(amount, product, term)
}

/// Unrounded level installment. `term` must be at least 1.
pub fn monthly_payment(amount: f64, annual_rate: f64, term: u32) -> f64 {
    let monthly_rate = annual_rate / 12.0;

    // Zero rate: the annuity factor degenerates to 0/0
    if monthly_rate == 0.0 {
        return amount / f64::from(term);
    }

    // Negative exponent: the discount factor underflows toward 0 on long
    // schedules, so the payment tends to amount * rate instead of inf/inf
    let discount = (1.0 + monthly_rate).powf(-f64::from(term));
    amount * monthly_rate / (1.0 - discount)
}

fn check_product_terms(product: &CreditProduct) -> Result<(), SimulationError> {
    let rate = product.annual_interest_rate;
    if !rate.is_finite() || rate < 0.0 {
        return Err(SimulationError::InvalidInput(format!(
            "product '{}' has an invalid annual interest rate ({})",
            product.name, rate
        )));
    }

    if product.min_term == 0 {
        return Err(SimulationError::InvalidInput(format!(
            "product '{}' allows a term of zero months",
            product.name
        )));
    }

    Ok(())
}

fn build_schedule(
    amount: f64,
    product: &CreditProduct,
    term: u32,
) -> Result<SimulationResult, SimulationError> {
    let monthly_rate = product.annual_interest_rate / 12.0;
    let payment = monthly_payment(amount, product.annual_interest_rate, term);
    if !payment.is_finite() {
        return Err(SimulationError::InvalidInput(format!(
            "product '{}' yields a non-finite installment for {} over {} months",
            product.name,
            Currency(amount),
            term
        )));
    }

    let mut remaining = amount;
    let mut amortization_table = Vec::with_capacity(term as usize);

    for period in 1..=term {
        let interest = remaining * monthly_rate;
        let principal = payment - interest;
        remaining = (remaining - principal).max(0.0);

        amortization_table.push(AmortizationRow {
            period,
            payment: round_currency(payment),
            principal_component: round_currency(principal),
            interest_component: round_currency(interest),
            remaining_balance: round_currency(remaining),
        });
    }

    let total_payment = round_currency(payment * f64::from(term));

    Ok(SimulationResult {
        monthly_payment: round_currency(payment),
        total_payment,
        total_interest: round_currency(total_payment - amount),
        amortization_table,
    })
}

//
// ================= Currency Helpers =================
//

/// Round to cents, normalizing negative zero
pub fn round_currency(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// `$1,234.56` style formatting
pub fn format_currency(value: f64) -> String {
    let rounded = round_currency(value);
    let cents = (rounded.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}
