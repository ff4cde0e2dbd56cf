//! System prompt construction
//!
//! Renders the knowledge base as plain text so the language model can answer
//! FAQs and describe products. Figures for simulations never come from here:
//! the model only narrates results the amortization engine produced.

use super::KnowledgeBase;
use crate::amortization::format_currency;
use std::fmt::Write;

const ROLE: &str = "Eres el asistente virtual de atención al cliente de peiGo, una plataforma financiera digital que ofrece cuentas, pagos y créditos.";

const MISSION: &str = r#"Tu trabajo:
1. Responder preguntas usando únicamente la información de este documento.
2. Asesorar comercialmente, destacando los productos que encajan con lo que el cliente necesita.
3. Informar sobre las promociones vigentes.
4. Explicar los productos de crédito y ofrecer simulaciones."#;

const BEHAVIOR: &str = r#"Comportamiento:
- Sé amable, profesional y empático.
- Usa lenguaje claro; evita tecnicismos salvo que el cliente los pida.
- Si el cliente muestra interés en un crédito, ofrécele una simulación.
- Si no conoces una respuesta, dilo y ofrece contacto con un agente humano.
- No inventes información que no esté en este documento.
- Puedes usar algún emoji ocasional sin perder la formalidad."#;

const SIMULATION_CHECKLIST: &str = r#"Al hablar de una simulación de crédito menciona siempre:
- Monto del préstamo
- Tasa de interés aplicada
- Plazo
- Cuota mensual estimada
- Total a pagar
- Total de intereses"#;

/// Build the system instruction sent with every chat turn
pub fn build_system_prompt(knowledge: &KnowledgeBase) -> String {
    let mut prompt = String::with_capacity(4096);

    prompt.push_str(ROLE);
    prompt.push_str("\n\n");
    prompt.push_str(MISSION);
    prompt.push_str("\n\n## PREGUNTAS FRECUENTES\n");

    for faq in &knowledge.faqs {
        let _ = writeln!(prompt, "Pregunta: {}\nRespuesta: {}", faq.question, faq.answer);
    }

    prompt.push_str("\n## PRODUCTOS\n");
    for product in &knowledge.products {
        let _ = writeln!(prompt, "- {}: {}", product.name, product.description);
    }

    prompt.push_str("\n## PROMOCIONES\n");
    for promo in &knowledge.promotions {
        let _ = writeln!(
            prompt,
            "- {} (código {}, válida hasta {}): {}",
            promo.name,
            promo.code,
            promo.valid_until.format("%Y-%m-%d"),
            promo.description
        );
        if let Some(details) = &promo.details {
            let _ = writeln!(prompt, "  Detalles: {}", details);
        }
    }

    prompt.push_str("\n## PRODUCTOS DE CRÉDITO\n");
    for credit in &knowledge.credit_products {
        let _ = writeln!(prompt, "Producto de crédito: {}", credit.name);
        if let Some(description) = &credit.description {
            let _ = writeln!(prompt, "Descripción: {}", description);
        }
        let _ = writeln!(
            prompt,
            "Tasa de interés anual: {}%",
            format_rate(credit.annual_interest_rate)
        );
        let _ = writeln!(
            prompt,
            "Monto: entre {} y {}",
            format_currency(credit.min_amount),
            format_currency(credit.max_amount)
        );
        let _ = writeln!(
            prompt,
            "Plazo: entre {} y {} meses",
            credit.min_term, credit.max_term
        );
        if !credit.additional_fees.is_empty() {
            prompt.push_str("Comisiones adicionales:\n");
            for (fee, value) in &credit.additional_fees {
                let _ = writeln!(prompt, "- {}: {}", capitalize(fee), value);
            }
        }
        prompt.push('\n');
    }

    prompt.push_str(BEHAVIOR);
    prompt.push_str("\n\n");
    prompt.push_str(SIMULATION_CHECKLIST);
    prompt.push('\n');

    prompt
}

/// 0.18 -> "18", 0.125 -> "12.5"
pub fn format_rate(annual_rate: f64) -> String {
    let percent = (annual_rate * 10_000.0).round() / 100.0;
    let text = format!("{:.2}", percent);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_catalog() {
        let kb = KnowledgeBase::sample();
        let prompt = build_system_prompt(&kb);

        assert!(prompt.contains("Crédito Hipotecario"));
        assert!(prompt.contains("Tasa de interés anual: 18%"));
        assert!(prompt.contains("Plazo: entre 60 y 240 meses"));
        assert!(prompt.contains("Monto: entre $5,000.00 y $50,000.00"));
        assert!(prompt.contains("código AMIGO500"));
        assert!(prompt.contains("- Avalúo: $5,000"));
        assert!(prompt.contains("Cuota mensual estimada"));
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(0.18), "18");
        assert_eq!(format_rate(0.125), "12.5");
        assert_eq!(format_rate(0.0), "0");
        assert_eq!(format_rate(0.0975), "9.75");
    }

    #[test]
    fn test_empty_knowledge_base() {
        let prompt = build_system_prompt(&KnowledgeBase::default());
        assert!(prompt.starts_with(ROLE));
        assert!(prompt.contains("## PRODUCTOS DE CRÉDITO"));
    }
}
