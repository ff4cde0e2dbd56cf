//! Simulation parameter extraction
//!
//! Pulls (product, amount, term) out of free text. The language model is asked
//! for a small JSON object first; anything it misses or gets wrong is filled
//! by a local heuristic so simulations keep working offline.

use crate::amortization::SimulationRequest;
use crate::error::AssistantError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::models::CreditProduct;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Partially known simulation request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulationParameters {
    pub product_name: Option<String>,
    pub amount: Option<f64>,
    pub term: Option<u32>,
}

impl SimulationParameters {
    pub fn is_complete(&self) -> bool {
        self.product_name.is_some() && self.amount.is_some() && self.term.is_some()
    }

    /// Keep known fields, take the missing ones from `other`
    pub fn or(self, other: SimulationParameters) -> SimulationParameters {
        SimulationParameters {
            product_name: self.product_name.or(other.product_name),
            amount: self.amount.or(other.amount),
            term: self.term.or(other.term),
        }
    }

    pub fn to_request(&self) -> Option<SimulationRequest> {
        Some(SimulationRequest {
            product_name: self.product_name.clone()?,
            amount: self.amount?,
            term: self.term?,
        })
    }

    /// Spanish labels of the fields still unknown
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.product_name.is_none() {
            missing.push("producto");
        }
        if self.amount.is_none() {
            missing.push("monto");
        }
        if self.term.is_none() {
            missing.push("plazo en meses");
        }
        missing
    }
}

//
// ================= Model extraction =================
//

pub async fn extract_parameters(
    model: &dyn LanguageModel,
    message: &str,
    catalog: &[CreditProduct],
) -> SimulationParameters {
    let request = CompletionRequest::extraction(extraction_prompt(message, catalog));

    let from_model = match model.complete(&request).await {
        Ok(reply) => match parse_model_reply(&reply) {
            Ok(params) => Some(params),
            Err(e) => {
                warn!(model = model.name(), error = %e, "Unusable extraction reply, using heuristic");
                None
            }
        },
        Err(e) => {
            warn!(model = model.name(), error = %e, "Extraction call failed, using heuristic");
            None
        }
    };

    let heuristic = extract_heuristic(message, catalog);
    let mut params = match from_model {
        Some(params) => params.or(heuristic),
        None => heuristic,
    };

    // Resolve the model's spelling to the catalog's
    if let Some(name) = params.product_name.as_deref() {
        if let Some(product) = match_product(&fold_accents(name), catalog) {
            params.product_name = Some(product.name.clone());
        }
    }

    debug!(
        product = ?params.product_name,
        amount = ?params.amount,
        term = ?params.term,
        "Simulation parameters extracted"
    );

    params
}

fn extraction_prompt(message: &str, catalog: &[CreditProduct]) -> String {
    let names: Vec<&str> = catalog.iter().map(|p| p.name.as_str()).collect();

    format!(
        "Extrae los parámetros de simulación de crédito del siguiente mensaje.\n\
         Productos disponibles: {}\n\n\
         Mensaje: \"{}\"\n\n\
         Responde SOLO con un objeto JSON con las claves \"product_name\" (nombre exacto del producto), \
         \"amount\" (número, sin símbolos) y \"term\" (plazo en meses, número entero). \
         Usa null para los datos que no se mencionen.",
        names.join(", "),
        message
    )
}

/// Parse the JSON object embedded in a model reply
pub fn parse_model_reply(reply: &str) -> Result<SimulationParameters> {
    let (start, end) = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(AssistantError::Extraction(
                "No JSON object in model reply".to_string(),
            ))
        }
    };

    let value: Value = serde_json::from_str(&reply[start..=end])
        .map_err(|e| AssistantError::Extraction(format!("Invalid JSON in model reply: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| AssistantError::Extraction("Model reply is not a JSON object".to_string()))?;

    Ok(SimulationParameters {
        product_name: object.get("product_name").and_then(text_field),
        amount: object.get("amount").and_then(number_field),
        term: object
            .get("term")
            .and_then(number_field)
            .and_then(whole_months),
    })
}

fn text_field(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(text.to_string())
    }
}

fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn whole_months(value: f64) -> Option<u32> {
    if value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) {
        Some(value as u32)
    } else {
        None
    }
}

//
// ================= Heuristic extraction =================
//

#[derive(Debug, Clone, Copy, PartialEq)]
enum TermUnit {
    Months,
    Years,
}

#[derive(Debug, Clone, Copy)]
struct NumberToken {
    value: f64,
    dollar: bool,
    unit: Option<TermUnit>,
}

/// Best-effort extraction without a language model
pub fn extract_heuristic(message: &str, catalog: &[CreditProduct]) -> SimulationParameters {
    let text = fold_accents(message);
    let tokens = scan_numbers(&text);

    let term = tokens.iter().find_map(|token| match token.unit {
        Some(TermUnit::Months) => whole_months(token.value.round()),
        Some(TermUnit::Years) => whole_months((token.value * 12.0).round()),
        None => None,
    });

    let amounts = tokens.iter().filter(|token| token.unit.is_none());
    let amount = amounts
        .clone()
        .find(|token| token.dollar)
        .or_else(|| amounts.max_by(|a, b| a.value.total_cmp(&b.value)))
        .map(|token| token.value);

    SimulationParameters {
        product_name: match_product(&text, catalog).map(|p| p.name.clone()),
        amount,
        term,
    }
}

/// Lowercase and strip Spanish diacritics
pub fn fold_accents(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Full product name first, then a word only that product uses
fn match_product<'a>(folded_text: &str, catalog: &'a [CreditProduct]) -> Option<&'a CreditProduct> {
    if let Some(product) = catalog
        .iter()
        .find(|p| folded_text.contains(&fold_accents(&p.name)))
    {
        return Some(product);
    }

    catalog.iter().enumerate().find_map(|(index, product)| {
        let name = fold_accents(&product.name);
        let distinctive = name.split_whitespace().filter(|word| word.len() > 3).any(|word| {
            let shared = catalog
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != index)
                .any(|(_, other)| fold_accents(&other.name).split_whitespace().any(|w| w == word));
            !shared && mentions(folded_text, word)
        });
        distinctive.then_some(product)
    })
}

/// "hipotecario" also matches "hipotecaria"
fn mentions(folded_text: &str, word: &str) -> bool {
    let stem = word
        .strip_suffix('o')
        .or_else(|| word.strip_suffix('a'))
        .filter(|stem| stem.len() >= 5);

    folded_text
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word || stem.is_some_and(|stem| token.starts_with(stem)))
}

fn scan_numbers(text: &str) -> Vec<NumberToken> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == ',' || chars[i] == '.') {
            i += 1;
        }

        let raw: String = chars[start..i].iter().collect();
        let Some(mut value) = parse_number(raw.trim_end_matches(|c: char| c == ',' || c == '.')) else {
            continue;
        };

        // Percentages are rates, not amounts
        if chars.get(i) == Some(&'%') {
            continue;
        }

        let dollar = chars[..start].iter().rev().find(|c| !c.is_whitespace()) == Some(&'$');

        if chars.get(i) == Some(&'k') && !chars.get(i + 1).is_some_and(|c| c.is_alphanumeric()) {
            value *= 1_000.0;
            i += 1;
        }

        let rest: String = chars[i..].iter().collect();
        let mut words = rest
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()));

        let mut next = words.next();
        match next {
            Some("mil") => {
                value *= 1_000.0;
                next = words.next();
            }
            Some("millon") | Some("millones") => {
                value *= 1_000_000.0;
                next = words.next();
            }
            _ => {}
        }

        let unit = next.and_then(|word| match word {
            "mes" | "meses" | "mensualidades" | "month" | "months" => Some(TermUnit::Months),
            "ano" | "anos" | "year" | "years" => Some(TermUnit::Years),
            _ => None,
        });

        tokens.push(NumberToken { value, dollar, unit });
    }

    tokens
}

/// Parse "20,000", "$20.000", "1.250.000", "12,5" or "1.5"
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // The separator that comes last is the decimal one
        (Some(comma), Some(dot)) if dot > comma => cleaned.replace(',', ""),
        (Some(_), Some(_)) => cleaned.replace('.', "").replace(',', "."),
        (Some(_), None) => join_groups(&cleaned, ','),
        (None, Some(_)) => join_groups(&cleaned, '.'),
        (None, None) => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn join_groups(text: &str, separator: char) -> String {
    let groups: Vec<&str> = text.split(separator).collect();
    let thousands = groups.len() > 2 || groups[1..].iter().all(|g| g.len() == 3);

    if thousands {
        groups.concat()
    } else {
        text.replacen(separator, ".", 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;
    use crate::llm::OfflineModel;
    use async_trait::async_trait;

    struct FixedReply(&'static str);

    #[async_trait]
    impl LanguageModel for FixedReply {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn catalog() -> Vec<CreditProduct> {
        KnowledgeBase::sample().credit_products
    }

    #[test]
    fn test_heuristic_reference_message() {
        let params = extract_heuristic("Quiero un crédito personal de $20,000 a 12 meses", &catalog());

        assert_eq!(params.product_name.as_deref(), Some("Crédito Personal"));
        assert_eq!(params.amount, Some(20_000.0));
        assert_eq!(params.term, Some(12));
        assert!(params.is_complete());
    }

    #[test]
    fn test_heuristic_years_and_multipliers() {
        let params = extract_heuristic("un hipotecario de 1.5 millones a 20 años", &catalog());
        assert_eq!(params.product_name.as_deref(), Some("Crédito Hipotecario"));
        assert_eq!(params.amount, Some(1_500_000.0));
        assert_eq!(params.term, Some(240));

        let params = extract_heuristic("simular vehicular por 80k a 2 años", &catalog());
        assert_eq!(params.product_name.as_deref(), Some("Crédito Vehicular"));
        assert_eq!(params.amount, Some(80_000.0));
        assert_eq!(params.term, Some(24));

        let params = extract_heuristic("préstamo de 30 mil", &catalog());
        assert_eq!(params.amount, Some(30_000.0));
        assert_eq!(params.term, None);
        assert_eq!(params.product_name, None);
    }

    #[test]
    fn test_heuristic_stem_match() {
        let params = extract_heuristic("me interesa una hipotecaria", &catalog());
        assert_eq!(params.product_name.as_deref(), Some("Crédito Hipotecario"));
    }

    #[test]
    fn test_heuristic_ignores_rates() {
        let params = extract_heuristic("al 18% por 40000 a 24 meses", &catalog());
        assert_eq!(params.amount, Some(40_000.0));
        assert_eq!(params.term, Some(24));
    }

    #[test]
    fn test_parse_number_formats() {
        let cases = vec![
            ("20,000", 20_000.0),
            ("$20.000", 20_000.0),
            ("1.250.000", 1_250_000.0),
            ("1,250,000.50", 1_250_000.5),
            ("1.250,50", 1_250.5),
            ("12,5", 12.5),
            ("1.5", 1.5),
            ("500", 500.0),
        ];

        for (raw, expected) in cases {
            assert_eq!(parse_number(raw), Some(expected), "{}", raw);
        }

        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("$"), None);
    }

    #[test]
    fn test_parse_model_reply() {
        let reply = "Claro: {\"product_name\": \"Crédito Vehicular\", \"amount\": \"150,000\", \"term\": 36} listo";
        let params = parse_model_reply(reply).unwrap();

        assert_eq!(params.product_name.as_deref(), Some("Crédito Vehicular"));
        assert_eq!(params.amount, Some(150_000.0));
        assert_eq!(params.term, Some(36));

        let params = parse_model_reply(r#"{"product_name": null, "amount": 5000, "term": null}"#).unwrap();
        assert_eq!(params.product_name, None);
        assert_eq!(params.amount, Some(5_000.0));
        assert_eq!(params.term, None);
        assert_eq!(params.missing_fields(), vec!["producto", "plazo en meses"]);
    }

    #[test]
    fn test_parse_model_reply_errors() {
        assert!(matches!(
            parse_model_reply("no tengo datos"),
            Err(AssistantError::Extraction(_))
        ));
        assert!(matches!(
            parse_model_reply("{ roto }"),
            Err(AssistantError::Extraction(_))
        ));
        assert!(matches!(
            parse_model_reply("[1, 2]{"),
            Err(AssistantError::Extraction(_))
        ));
    }

    #[tokio::test]
    async fn test_model_fields_filled_by_heuristic() {
        let model = FixedReply(r#"{"product_name": "credito personal", "amount": null, "term": 18}"#);
        let params = extract_parameters(&model, "personal por $10,000 a 12 meses", &catalog()).await;

        // Model wins where it answered; the catalog spelling is restored
        assert_eq!(params.product_name.as_deref(), Some("Crédito Personal"));
        assert_eq!(params.term, Some(18));
        assert_eq!(params.amount, Some(10_000.0));
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_heuristic() {
        let params = extract_parameters(
            &OfflineModel,
            "simular crédito vehicular de $120,000 a 48 meses",
            &catalog(),
        )
        .await;

        let request = params.to_request().unwrap();
        assert_eq!(request.product_name, "Crédito Vehicular");
        assert_eq!(request.amount, 120_000.0);
        assert_eq!(request.term, 48);
    }
}
