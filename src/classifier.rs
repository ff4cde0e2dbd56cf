//! Intent classifier
//!
//! Classifies user messages as either:
//! - CreditSimulation: the user wants a loan quote ("simular un crédito de 20 mil a 12 meses")
//! - General: FAQs, products, promotions, small talk

use crate::extraction::fold_accents;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CreditSimulation,
    General,
}

/// Matched against the lowercased, accent-folded message
const SIMULATION_KEYWORDS: &[&str] = &[
    // Spanish
    "simular", "simulacion", "calcular", "cotizar",
    "prestamo", "credito",
    "mensualidad", "cuota",
    // English
    "simulate", "loan", "installment",
];

const FAREWELL_WORDS: &[&str] = &["salir", "adiós", "adios", "chao", "hasta luego", "exit", "quit"];

pub fn classify(message: &str) -> Intent {
    classify_excluding::<&str>(message, &[])
}

/// Like `classify`, but mentions of `excluded` names (cards and other
/// non-credit products) are removed before keyword matching, so
/// "tarjeta de crédito" alone does not read as a loan request
pub fn classify_excluding<S: AsRef<str>>(message: &str, excluded: &[S]) -> Intent {
    let mut text = fold_accents(message);
    for name in excluded {
        let name = fold_accents(name.as_ref());
        if !name.trim().is_empty() {
            text = text.replace(name.as_str(), " ");
        }
    }

    if SIMULATION_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        Intent::CreditSimulation
    } else {
        Intent::General
    }
}

/// True when the whole message is an exit word
pub fn is_farewell(message: &str) -> bool {
    let text = message.trim().to_lowercase();
    FAREWELL_WORDS.contains(&text.as_str())
}
