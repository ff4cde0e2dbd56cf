//! Session report export
//!
//! Renders a session as a Marp Markdown slide deck: summary, one slide per
//! simulation, products of interest, conversation analysis and contact data.

pub mod digest;

pub use digest::simulation_log_digest;

use crate::amortization::format_currency;
use crate::error::AssistantError;
use crate::knowledge::{prompt::format_rate, KnowledgeBase};
use crate::session::{Session, SimulationRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const SCHEDULE_PREVIEW_ROWS: usize = 12;
const MAX_QUESTIONS: usize = 3;
const TOPICS: &[&str] = &["crédito", "productos", "promociones", "requisitos", "pagos"];

const SLIDE_BREAK: &str = "\n---\n\n";

pub struct SessionReport<'a> {
    session: &'a Session,
    knowledge: &'a KnowledgeBase,
    generated_at: DateTime<Utc>,
}

impl<'a> SessionReport<'a> {
    pub fn new(session: &'a Session, knowledge: &'a KnowledgeBase) -> Self {
        Self {
            session,
            knowledge,
            generated_at: Utc::now(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "session_report_{}.md",
            self.generated_at.format("%Y%m%d_%H%M%S")
        )
    }

    pub fn render(&self) -> Result<String> {
        let mut deck = String::with_capacity(8192);
        deck.push_str("---\nmarp: true\ntheme: default\npaginate: true\n---\n\n");

        self.title_slide(&mut deck);
        deck.push_str(SLIDE_BREAK);
        self.summary_slide(&mut deck);

        for (index, record) in self.session.state.simulations.iter().enumerate() {
            deck.push_str(SLIDE_BREAK);
            simulation_slide(&mut deck, index + 1, record);
        }

        if !self.products_of_interest().is_empty() {
            deck.push_str(SLIDE_BREAK);
            self.products_slide(&mut deck);
        }

        deck.push_str(SLIDE_BREAK);
        self.analysis_slide(&mut deck);
        deck.push_str(SLIDE_BREAK);
        self.closing_slide(&mut deck)?;

        Ok(deck)
    }

    /// Write the deck into `dir` and return its path
    pub async fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let deck = self.render()?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        tokio::fs::write(&path, deck.as_bytes()).await.map_err(|e| {
            AssistantError::Report(format!("Failed to write {}: {}", path.display(), e))
        })?;

        info!(
            session_id = %self.session.session_id,
            path = %path.display(),
            simulations = self.session.state.simulations.len(),
            "Session report written"
        );

        Ok(path)
    }

    fn title_slide(&self, deck: &mut String) {
        deck.push_str("# Reporte de sesión peiGo\n\n");
        deck.push_str("Asistente virtual de atención al cliente\n\n");
        if let Some(name) = &self.session.state.user_name {
            let _ = writeln!(deck, "Cliente: **{}**\n", name);
        }
        let _ = writeln!(
            deck,
            "Generado el {}",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    fn summary_slide(&self, deck: &mut String) {
        let history = &self.session.history;
        let state = &self.session.state;
        let minutes = history.duration().num_milliseconds() as f64 / 60_000.0;

        deck.push_str("## Resumen de la sesión\n\n");
        let _ = writeln!(deck, "- Duración: {:.1} minutos", minutes);
        let _ = writeln!(
            deck,
            "- Mensajes intercambiados: {}",
            history.message_count() / 2
        );
        let _ = writeln!(
            deck,
            "- Productos consultados: {}",
            state.products_discussed().len()
        );
        let _ = writeln!(deck, "- Simulaciones de crédito: {}", state.simulations.len());

        if let Some(last) = state.simulations.last() {
            let _ = writeln!(
                deck,
                "\n**Última simulación:** {} por {} a {} meses, mensualidad de {} e interés total de {}",
                last.request.product_name,
                format_currency(last.request.amount),
                last.request.term,
                format_currency(last.result.monthly_payment),
                format_currency(last.result.total_interest)
            );
        }
    }

    /// Products named in replies first, then those the user asked about
    fn products_of_interest(&self) -> Vec<&str> {
        let state = &self.session.state;
        let mut names: Vec<&str> = Vec::new();
        for name in state.products_discussed().iter().chain(state.interests()) {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    fn products_slide(&self, deck: &mut String) {
        deck.push_str("## Productos de interés\n\n");

        for name in self.products_of_interest() {
            let _ = writeln!(deck, "### {}\n", name);

            if let Some(credit) = self.knowledge.find_credit_product(name) {
                if let Some(description) = &credit.description {
                    let _ = writeln!(deck, "{}\n", description);
                }
                let _ = writeln!(
                    deck,
                    "- Tasa anual: {}%\n- Monto: {} a {}\n- Plazo: {} a {} meses\n",
                    format_rate(credit.annual_interest_rate),
                    format_currency(credit.min_amount),
                    format_currency(credit.max_amount),
                    credit.min_term,
                    credit.max_term
                );
            } else if let Some(product) = self.knowledge.find_product(name) {
                let _ = writeln!(deck, "{}\n", product.description);
            }
        }
    }

    fn analysis_slide(&self, deck: &mut String) {
        deck.push_str("## Análisis de la conversación\n\n");

        let topics = topic_mentions(self.session);
        if topics.is_empty() {
            deck.push_str("Sin temas destacados.\n");
        } else {
            deck.push_str("**Temas mencionados:**\n\n");
            for (topic, count) in topics {
                let _ = writeln!(deck, "- {}: {} {}", capitalize(topic), count, times(count));
            }
        }

        let questions = user_questions(self.session);
        if !questions.is_empty() {
            deck.push_str("\n**Preguntas del cliente:**\n\n");
            for question in questions {
                let _ = writeln!(deck, "> {}\n", question);
            }
        }
    }

    fn closing_slide(&self, deck: &mut String) -> Result<()> {
        let digest = simulation_log_digest(&self.session.state.simulations)?;

        deck.push_str("# ¡Gracias por considerar a peiGo!\n\n");
        deck.push_str("**Información de contacto**\n\n");
        deck.push_str("- Teléfono: 01-800-PEIGO-01\n");
        deck.push_str("- Email: contacto@peigo.com\n");
        deck.push_str("- Sitio web: www.peigo.com\n\n");
        let _ = writeln!(deck, "<!-- session: {} -->", self.session.session_id);
        let _ = writeln!(deck, "<!-- simulations-sha256: {} -->", digest);
        Ok(())
    }
}

fn simulation_slide(deck: &mut String, number: usize, record: &SimulationRecord) {
    let request = &record.request;
    let result = &record.result;

    let _ = writeln!(deck, "## Simulación {}: {}\n", number, request.product_name);
    deck.push_str("| Parámetro | Valor |\n|---|---|\n");
    let _ = writeln!(deck, "| Monto del crédito | {} |", format_currency(request.amount));
    let _ = writeln!(
        deck,
        "| Tasa anual | {}% |",
        format_rate(record.annual_interest_rate)
    );
    let _ = writeln!(deck, "| Plazo | {} meses |", request.term);
    let _ = writeln!(deck, "| Pago mensual | {} |", format_currency(result.monthly_payment));
    let _ = writeln!(deck, "| Total a pagar | {} |", format_currency(result.total_payment));
    let _ = writeln!(
        deck,
        "| Total de intereses | {} |",
        format_currency(result.total_interest)
    );

    let (principal_share, interest_share) = if result.total_payment > 0.0 {
        (
            request.amount / result.total_payment * 100.0,
            result.total_interest / result.total_payment * 100.0,
        )
    } else {
        (0.0, 0.0)
    };
    let _ = writeln!(
        deck,
        "\n**Distribución:** capital {} ({:.1}%), interés {} ({:.1}%)\n",
        format_currency(request.amount),
        principal_share,
        format_currency(result.total_interest),
        interest_share
    );

    deck.push_str("| Mes | Cuota | Capital | Interés | Saldo |\n|---|---|---|---|---|\n");
    for row in result.amortization_table.iter().take(SCHEDULE_PREVIEW_ROWS) {
        let _ = writeln!(
            deck,
            "| {} | {} | {} | {} | {} |",
            row.period,
            format_currency(row.payment),
            format_currency(row.principal_component),
            format_currency(row.interest_component),
            format_currency(row.remaining_balance)
        );
    }

    let remaining = result.amortization_table.len().saturating_sub(SCHEDULE_PREVIEW_ROWS);
    if remaining > 0 {
        let _ = writeln!(deck, "\n_... y {} pagos más hasta saldar el crédito._", remaining);
    }
}

/// Messages mentioning each topic; unmentioned topics are left out
fn topic_mentions(session: &Session) -> Vec<(&'static str, usize)> {
    TOPICS
        .iter()
        .map(|topic| {
            let count = session
                .history
                .messages()
                .filter(|m| m.content.to_lowercase().contains(topic))
                .count();
            (*topic, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}

/// Interrogative sentences the user wrote, longest-enough first three
fn user_questions(session: &Session) -> Vec<String> {
    session
        .history
        .user_messages()
        .filter(|m| m.content.contains('?'))
        .flat_map(|m| {
            m.content
                .split('.')
                .filter(|sentence| sentence.contains('?'))
                .map(|sentence| sentence.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|question| question.chars().count() > 10)
        .take(MAX_QUESTIONS)
        .collect()
}

fn times(count: usize) -> &'static str {
    if count == 1 {
        "vez"
    } else {
        "veces"
    }
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
    use crate::amortization::{simulate, SimulationRequest};

    fn session_with_simulations(simulations: &[(&str, f64, u32)]) -> Session {
        let kb = KnowledgeBase::sample();
        let mut session = Session::new();

        session.history.add_user_message("Hola, ¿qué es peiGo?");
        session.history.add_assistant_message("peiGo es una plataforma financiera digital.");
        session
            .history
            .add_user_message("¿Qué requisitos pide el crédito personal? Quiero simular.");
        session.history.add_assistant_message("Te muestro la simulación del Crédito Personal.");

        for &(product, amount, term) in simulations {
            let credit = kb.find_credit_product(product).unwrap();
            let result = simulate(&kb.credit_products, product, amount, term).unwrap();
            let request = SimulationRequest {
                product_name: credit.name.clone(),
                amount,
                term,
            };
            session
                .state
                .simulations
                .append(SimulationRecord::new(request, credit.annual_interest_rate, result));
        }

        session.state.mark_product_discussed("Crédito Personal");
        session.state.add_interest("Tarjeta de Débito");
        session
    }

    #[test]
    fn test_one_slide_per_simulation() {
        let kb = KnowledgeBase::sample();
        let session = session_with_simulations(&[
            ("Crédito Personal", 20_000.0, 12),
            ("Crédito Hipotecario", 1_000_000.0, 240),
        ]);

        let deck = SessionReport::new(&session, &kb).render().unwrap();

        assert!(deck.starts_with("---\nmarp: true"));
        assert!(deck.contains("## Simulación 1: Crédito Personal"));
        assert!(deck.contains("## Simulación 2: Crédito Hipotecario"));
        assert!(!deck.contains("## Simulación 3"));
        assert!(deck.contains("| Pago mensual | $1,833.60 |"));
        assert!(deck.contains("_... y 228 pagos más hasta saldar el crédito._"));
        assert!(deck.contains("- Simulaciones de crédito: 2"));
        assert!(deck.contains("- Mensajes intercambiados: 2"));
    }

    #[test]
    fn test_digest_is_embedded_and_stable() {
        let kb = KnowledgeBase::sample();
        let first = session_with_simulations(&[("Crédito Vehicular", 80_000.0, 36)]);
        let second = session_with_simulations(&[("Crédito Vehicular", 80_000.0, 36)]);

        let digest = simulation_log_digest(&first.state.simulations).unwrap();
        assert_eq!(digest, simulation_log_digest(&second.state.simulations).unwrap());

        let deck = SessionReport::new(&first, &kb).render().unwrap();
        assert!(deck.contains(&format!("<!-- simulations-sha256: {} -->", digest)));
    }

    #[test]
    fn test_products_and_analysis() {
        let kb = KnowledgeBase::sample();
        let session = session_with_simulations(&[]);

        let deck = SessionReport::new(&session, &kb).render().unwrap();

        assert!(deck.contains("## Productos de interés"));
        assert!(deck.contains("### Crédito Personal"));
        assert!(deck.contains("- Plazo: 6 a 36 meses"));
        assert!(deck.contains("### Tarjeta de Débito"));
        assert!(deck.contains("- Requisitos: 1 vez"));
        assert!(deck.contains("> Hola, ¿qué es peiGo?"));
        assert!(deck.contains("> ¿Qué requisitos pide el crédito personal?"));
        assert!(!deck.contains("**Última simulación:**"));
        assert!(deck.contains("contacto@peigo.com"));
    }

    #[test]
    fn test_topic_mentions_skip_unmentioned() {
        let session = session_with_simulations(&[]);
        let topics = topic_mentions(&session);

        assert!(topics.iter().any(|(topic, _)| *topic == "crédito"));
        assert!(!topics.iter().any(|(topic, _)| *topic == "promociones"));
    }

    #[tokio::test]
    async fn test_write_to_dir() {
        let kb = KnowledgeBase::sample();
        let session = session_with_simulations(&[("Crédito Personal", 20_000.0, 12)]);
        let dir = tempfile::tempdir().unwrap();

        let report = SessionReport::new(&session, &kb);
        let path = report.write_to_dir(dir.path().join("reports")).await.unwrap();

        assert_eq!(path.file_name().unwrap().to_str().unwrap(), report.file_name());
        assert!(report.file_name().starts_with("session_report_"));

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.contains("## Simulación 1: Crédito Personal"));
    }
}
