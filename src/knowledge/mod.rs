//! Knowledge base: FAQs, products, promotions and the credit catalog
//!
//! Stored as a single JSON document. When no file exists the built-in
//! sample catalog is used instead.

pub mod prompt;

use crate::error::AssistantError;
use crate::models::{CreditProduct, Faq, Product, Promotion};
use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

pub use prompt::build_system_prompt;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub promotions: Vec<Promotion>,
    #[serde(default)]
    pub credit_products: Vec<CreditProduct>,
}

impl KnowledgeBase {
    /// Load from `path`, falling back to the sample catalog when the file is missing
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match read_if_present(path).await? {
            Some(raw) => Self::from_json(&raw),
            None => {
                warn!(path = %path.display(), "Knowledge base not found, using sample catalog");
                Ok(Self::sample())
            }
        }
    }

    /// Like `load`, but writes the sample catalog to `path` when it is missing
    pub async fn load_or_seed(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(raw) = read_if_present(path).await? {
            return Self::from_json(&raw);
        }

        let knowledge = Self::sample();
        knowledge.save(path).await?;
        info!(path = %path.display(), "Seeded knowledge base with sample catalog");
        Ok(knowledge)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let knowledge: Self = serde_json::from_str(raw).map_err(|e| {
            AssistantError::KnowledgeBase(format!("Invalid knowledge base JSON: {}", e))
        })?;

        knowledge.validate()?;

        info!(
            faqs = knowledge.faqs.len(),
            products = knowledge.products.len(),
            promotions = knowledge.promotions.len(),
            credit_products = knowledge.credit_products.len(),
            "Knowledge base loaded"
        );

        Ok(knowledge)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).await?;
        Ok(())
    }

    /// Reject credit products the amortization engine could not honor
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.credit_products.len());

        for product in &self.credit_products {
            let name = &product.name;

            if name.trim().is_empty() {
                return Err(invalid("credit product with an empty name".to_string()));
            }

            if !seen.insert(name.to_lowercase()) {
                return Err(invalid(format!("duplicate credit product '{}'", name)));
            }

            let rate = product.annual_interest_rate;
            if !rate.is_finite() || rate < 0.0 {
                return Err(invalid(format!("'{}' has an invalid interest rate {}", name, rate)));
            }

            if !(product.min_amount > 0.0 && product.min_amount <= product.max_amount)
                || !product.max_amount.is_finite()
            {
                return Err(invalid(format!(
                    "'{}' has invalid amount bounds [{}, {}]",
                    name, product.min_amount, product.max_amount
                )));
            }

            if product.min_term == 0 || product.min_term > product.max_term {
                return Err(invalid(format!(
                    "'{}' has invalid term bounds [{}, {}]",
                    name, product.min_term, product.max_term
                )));
            }
        }

        Ok(())
    }

    pub fn find_credit_product(&self, name: &str) -> Option<&CreditProduct> {
        crate::amortization::find_product(&self.credit_products, name)
    }

    pub fn find_product(&self, name: &str) -> Option<&Product> {
        let wanted = name.trim().to_lowercase();
        self.products.iter().find(|p| p.name.to_lowercase() == wanted)
    }

    /// Demo catalog for a digital wallet with credit products
    pub fn sample() -> Self {
        Self {
            faqs: vec![
                faq(
                    "¿Qué es peiGo y cómo funciona?",
                    "peiGo es una aplicación para gestionar tu dinero de forma fácil y segura: abres una cuenta en minutos, obtienes una tarjeta Visa Débito, envías y pides dinero, recargas, pagas servicios y pagas con QR. Está respaldada por Banco Guayaquil.",
                ),
                faq(
                    "¿Dónde está alojado mi dinero?",
                    "En una cuenta de ahorros básica alojada y respaldada por Banco Guayaquil.",
                ),
                faq(
                    "¿Cómo puedo dividir gastos con peiGo?",
                    "En la sección de actividad elige el movimiento, toca 'Dividir este gasto', selecciona tus contactos y confirma.",
                ),
                faq(
                    "¿Qué tipo de servicios puedo pagar en peiGo?",
                    "Recargas de celular, agua, luz, TV paga, internet, juegos, almacenes y servicios como IESS, SRI y Registro Civil.",
                ),
                faq(
                    "¿Qué es la tarjeta Mastercard peiGo?",
                    "Una tarjeta de débito virtual vinculada a tu saldo peiGo para compras en línea y pagos con Google Pay y Apple Pay.",
                ),
                faq(
                    "¿Cómo funciona la mecánica de referidos en peiGo?",
                    "Invita amigos con tu link de referido: ganas $1 cuando crean su cuenta y $1 adicional con su primera transacción.",
                ),
                faq(
                    "¿Cómo me registro en peiGo?",
                    "Descarga la app desde AppStore o Google Play y crea tu cuenta con tu documento de identidad y un número de celular ecuatorianos.",
                ),
                faq(
                    "¿Es seguro usar Google Pay con mi tarjeta Visa peiGo?",
                    "Sí. Google Pay usa tokenización y nunca comparte el número real de tu tarjeta con los comercios.",
                ),
            ],
            products: vec![
                product(
                    "Recarga Dinero",
                    "Recarga rápido y sin costo con tarjeta de débito, cajero, Bancos del Barrio o cuentas bancarias.",
                ),
                product(
                    "Envía y recibe dinero",
                    "Envía y recibe dinero al instante desde tu celular.",
                ),
                product(
                    "Retira dinero",
                    "Retira tu dinero cuando lo necesites en los puntos autorizados de todo Ecuador.",
                ),
                product(
                    "Divide Gastos",
                    "Paga la cuenta y divide el gasto entre tus amigos desde la app.",
                ),
                product(
                    "Pago de Servicios",
                    "Paga agua, luz, internet, TV y recargas de celular o juegos directamente desde la app.",
                ),
                product(
                    "Tarjeta de Débito",
                    "Tarjeta de débito virtual para compras nacionales e internacionales en línea y suscripciones. Se activa gratis en minutos.",
                ),
                product(
                    "Tarjeta de Crédito",
                    "Tarjeta de crédito virtual para compras nacionales e internacionales en línea y suscripciones. Se activa gratis en minutos.",
                ),
            ],
            promotions: vec![
                Promotion {
                    name: "Bienvenida 2025".to_string(),
                    description: "50% de descuento en comisiones para nuevos usuarios durante los primeros 3 meses".to_string(),
                    valid_until: date(2025, 6, 30),
                    code: "BIENVENIDA2025".to_string(),
                    details: Some("El descuento se aplica al usar el código durante el registro.".to_string()),
                },
                Promotion {
                    name: "Referidos Premium".to_string(),
                    description: "Recibe $500 por cada amigo que apruebe un crédito usando tu código de referido".to_string(),
                    valid_until: date(2025, 12, 31),
                    code: "AMIGO500".to_string(),
                    details: Some("Tu amigo debe obtener la aprobación de un crédito mínimo de $5,000. El bono se deposita 30 días después.".to_string()),
                },
            ],
            credit_products: vec![
                credit(
                    "Crédito Personal",
                    0.18,
                    (5_000.0, 50_000.0),
                    (6, 36),
                    "Ideal para gastos personales, vacaciones o imprevistos. Aprobación rápida y requisitos mínimos.",
                    &[("apertura", "2%"), ("seguro", "$250 mensual")],
                ),
                credit(
                    "Crédito Vehicular",
                    0.12,
                    (50_000.0, 500_000.0),
                    (12, 60),
                    "Financiamiento para vehículos nuevos o seminuevos con tasas preferenciales.",
                    &[("apertura", "1.5%"), ("seguro", "Obligatorio, cotizado por separado")],
                ),
                credit(
                    "Crédito Hipotecario",
                    0.09,
                    (500_000.0, 5_000_000.0),
                    (60, 240),
                    "Para adquirir tu vivienda con tasas competitivas y plazos extendidos.",
                    &[("apertura", "1%"), ("avalúo", "$5,000"), ("seguro", "0.3% anual sobre saldo")],
                ),
            ],
        }
    }
}

fn invalid(message: String) -> AssistantError {
    AssistantError::KnowledgeBase(message)
}

fn faq(question: &str, answer: &str) -> Faq {
    Faq {
        question: question.to_string(),
        answer: answer.to_string(),
    }
}

fn product(name: &str, description: &str) -> Product {
    Product {
        name: name.to_string(),
        description: description.to_string(),
    }
}

fn credit(
    name: &str,
    rate: f64,
    amount_bounds: (f64, f64),
    term_bounds: (u32, u32),
    description: &str,
    fees: &[(&str, &str)],
) -> CreditProduct {
    let mut product = CreditProduct::new(name, rate, amount_bounds, term_bounds);
    product.description = Some(description.to_string());
    product.additional_fees = fees
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>();
    product
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

async fn read_if_present(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sample_is_valid() {
        let kb = KnowledgeBase::sample();
        assert!(kb.validate().is_ok());
        assert_eq!(kb.credit_products.len(), 3);
        assert!(kb.find_credit_product("crédito hipotecario").is_some());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_sample() {
        let dir = tempdir().unwrap();
        let kb = KnowledgeBase::load(dir.path().join("missing.json")).await.unwrap();
        assert_eq!(kb, KnowledgeBase::sample());
        assert!(!dir.path().join("missing.json").exists());
    }

    #[tokio::test]
    async fn test_seed_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kb.json");

        let seeded = KnowledgeBase::load_or_seed(&path).await.unwrap();
        assert!(path.exists());

        let loaded = KnowledgeBase::load(&path).await.unwrap();
        assert_eq!(seeded, loaded);

        // A second call reads the seeded file instead of overwriting it
        let mut edited = seeded.clone();
        edited.credit_products.truncate(1);
        edited.save(&path).await.unwrap();
        assert_eq!(KnowledgeBase::load_or_seed(&path).await.unwrap(), edited);
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            KnowledgeBase::load_or_seed(&path).await,
            Err(AssistantError::KnowledgeBase(_))
        ));
    }

    #[test]
    fn test_interest_rate_key_without_products() {
        let raw = r#"{
            "faqs": [{"question": "¿Qué es?", "answer": "Una app."}],
            "credit_products": [{
                "name": "Crédito Personal",
                "interest_rate": 0.18,
                "min_amount": 5000,
                "max_amount": 50000,
                "min_term": 6,
                "max_term": 36,
                "additional_fees": {"apertura": "2%"}
            }]
        }"#;

        let kb = KnowledgeBase::from_json(raw).unwrap();
        assert!(kb.products.is_empty());
        assert_eq!(kb.credit_products[0].additional_fees["apertura"], "2%");
    }

    #[test]
    fn test_validation_rejects_bad_catalogs() {
        let mut kb = KnowledgeBase::sample();
        kb.credit_products[1].name = "CRÉDITO PERSONAL".to_string();
        assert!(matches!(kb.validate(), Err(AssistantError::KnowledgeBase(_))));

        let mut kb = KnowledgeBase::sample();
        kb.credit_products[0].min_amount = 60_000.0;
        assert!(kb.validate().is_err());

        let mut kb = KnowledgeBase::sample();
        kb.credit_products[0].min_term = 0;
        assert!(kb.validate().is_err());

        let mut kb = KnowledgeBase::sample();
        kb.credit_products[0].annual_interest_rate = -0.01;
        assert!(kb.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let err = KnowledgeBase::from_json("{ not json").unwrap_err();
        assert!(err.to_string().contains("Invalid knowledge base JSON"));
    }
}
