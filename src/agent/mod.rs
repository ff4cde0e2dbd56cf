//! Conversational assistant
//!
//! MESSAGE → CLASSIFY → (EXTRACT → SIMULATE → LOG) | CHAT → RECORD
//!
//! Figures in replies come from the amortization engine; the language model
//! only writes the surrounding prose.

use crate::amortization::{
    format_currency, AmortizationEngine, SimulationError, SimulationRequest, SimulationResult,
};
use crate::classifier::{classify_excluding, Intent};
use crate::extraction::{extract_parameters, fold_accents, SimulationParameters};
use crate::knowledge::{build_system_prompt, prompt::format_rate, KnowledgeBase};
use crate::llm::{ChatTurn, CompletionRequest, LanguageModel};
use crate::report::SessionReport;
use crate::session::{MessageRole, Session, SimulationRecord};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_DIALOGUE_TURNS: usize = 20;

pub const FALLBACK_REPLY: &str =
    "Lo siento, tuve un problema procesando tu mensaje. ¿Podrías intentarlo de nuevo?";

const DEFAULT_GREETING: &str =
    "¡Hola! Soy el asistente virtual de peiGo. Puedo resolver tus dudas, contarte sobre nuestros productos y promociones, o simular un crédito. ¿En qué te ayudo?";

const DEFAULT_FAREWELL: &str =
    "¡Gracias por conversar con peiGo! Que tengas un excelente día.";

pub struct Assistant {
    knowledge: Arc<KnowledgeBase>,
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
    max_dialogue_turns: usize,
    session: Session,
}

impl Assistant {
    pub fn new(knowledge: Arc<KnowledgeBase>, model: Arc<dyn LanguageModel>) -> Self {
        let system_prompt = build_system_prompt(&knowledge);

        info!(
            model = model.name(),
            prompt_chars = system_prompt.len(),
            "Assistant initialized"
        );

        Self {
            knowledge,
            model,
            system_prompt,
            max_dialogue_turns: DEFAULT_MAX_DIALOGUE_TURNS,
            session: Session::new(),
        }
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn with_max_dialogue_turns(mut self, turns: usize) -> Self {
        self.max_dialogue_turns = turns.max(1);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn last_simulation(&self) -> Option<&SimulationRecord> {
        self.session.state.simulations.last()
    }

    pub fn report(&self) -> SessionReport<'_> {
        SessionReport::new(&self.session, &self.knowledge)
    }

    pub async fn greeting(&self) -> String {
        let instruction = "Saluda brevemente al cliente (máximo dos oraciones), preséntate como el asistente virtual de peiGo y menciona que puedes resolver dudas, informar promociones y simular créditos.";
        self.ask(instruction, DEFAULT_GREETING).await
    }

    pub async fn farewell(&self) -> String {
        let instruction = match &self.session.state.user_name {
            Some(name) => format!(
                "Despídete brevemente y con calidez de {}, agradeciendo la conversación.",
                name
            ),
            None => "Despídete brevemente y con calidez del cliente, agradeciendo la conversación."
                .to_string(),
        };
        self.ask(&instruction, DEFAULT_FAREWELL).await
    }

    /// Handle one user message and return the reply shown to the user
    pub async fn process_message(&mut self, text: &str) -> String {
        let text = text.trim();
        self.session.history.add_user_message(text);
        self.note_mentions(text, MessageRole::User);

        let non_credit: Vec<&str> = self
            .knowledge
            .products
            .iter()
            .map(|product| product.name.as_str())
            .collect();
        let intent = classify_excluding(text, &non_credit);
        debug!(?intent, "Message classified");

        let reply = match intent {
            Intent::CreditSimulation => self.handle_simulation(text).await,
            Intent::General => self.chat_reply().await,
        };

        self.note_mentions(&reply, MessageRole::Assistant);
        self.session.history.add_assistant_message(reply.clone());

        info!(
            session_id = %self.session.session_id,
            ?intent,
            messages = self.session.history.message_count(),
            simulations = self.session.state.simulations.len(),
            "Message processed"
        );

        reply
    }

    /// Run the engine and log the simulation on success
    pub fn simulate(
        &mut self,
        product_name: &str,
        amount: f64,
        term: u32,
    ) -> Result<SimulationRecord, SimulationError> {
        let engine = AmortizationEngine::new(&self.knowledge.credit_products);
        let request = SimulationRequest {
            product_name: product_name.to_string(),
            amount,
            term,
        };

        let result = engine.simulate(&request)?;
        let product = engine
            .find_product(product_name)
            .ok_or_else(|| SimulationError::ProductNotFound {
                product_name: product_name.trim().to_string(),
            })?;

        let record = SimulationRecord::new(
            SimulationRequest {
                product_name: product.name.clone(),
                ..request
            },
            product.annual_interest_rate,
            result,
        );

        info!(
            product = %product.name,
            amount,
            term,
            monthly_payment = record.result.monthly_payment,
            "Simulation recorded"
        );

        self.session.state.simulations.append(record.clone());
        Ok(record)
    }

    /// Recompute a logged simulation and have the model present it
    pub async fn explain_simulation(&self, record: &SimulationRecord) -> String {
        let engine = AmortizationEngine::new(&self.knowledge.credit_products);
        let result = match engine.simulate(&record.request) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Logged simulation no longer valid for the catalog");
                return format!("No pude recalcular la simulación: {}.", e);
            }
        };

        let summary = simulation_summary(&record.request, record.annual_interest_rate, &result);
        let instruction = format!(
            "Explica al cliente, en lenguaje sencillo y en no más de un párrafo, esta simulación de crédito. Usa exactamente estas cifras y no calcules otras:\n{}",
            summary
        );

        self.ask(&instruction, &summary).await
    }

    async fn handle_simulation(&mut self, text: &str) -> String {
        let params =
            extract_parameters(self.model.as_ref(), text, &self.knowledge.credit_products).await;

        let Some(request) = params.to_request() else {
            return self.request_missing(&params).await;
        };

        match self.simulate(&request.product_name, request.amount, request.term) {
            Ok(record) => {
                let mut reply =
                    simulation_summary(&record.request, record.annual_interest_rate, &record.result);
                reply.push_str(
                    "\n\n¿Quieres ver la tabla de amortización completa o simular con otros valores?",
                );
                reply
            }
            Err(e) => {
                warn!(kind = ?e.kind(), error = %e, "Simulation rejected");
                let instruction = format!(
                    "El cliente pidió una simulación de crédito que no se puede realizar: {}. Explícale el motivo con amabilidad y sugiérele valores válidos.",
                    e
                );
                let fallback = format!("No pude realizar la simulación: {}.", e);
                self.ask(&instruction, &fallback).await
            }
        }
    }

    async fn request_missing(&self, params: &SimulationParameters) -> String {
        let mut understood = Vec::new();
        if let Some(product) = &params.product_name {
            understood.push(format!("producto: {}", product));
        }
        if let Some(amount) = params.amount {
            understood.push(format!("monto: {}", format_currency(amount)));
        }
        if let Some(term) = params.term {
            understood.push(format!("plazo: {} meses", term));
        }

        let missing = params.missing_fields().join(", ");
        let products: Vec<&str> = self
            .knowledge
            .credit_products
            .iter()
            .map(|p| p.name.as_str())
            .collect();

        let instruction = format!(
            "El cliente quiere simular un crédito. Datos entendidos: {}. Faltan: {}. Pídele amablemente los datos faltantes. Productos disponibles: {}.",
            if understood.is_empty() {
                "ninguno".to_string()
            } else {
                understood.join(", ")
            },
            missing,
            products.join(", ")
        );
        let fallback = format!(
            "Para simular tu crédito necesito: {}. Productos disponibles: {}.",
            missing,
            products.join(", ")
        );

        self.ask(&instruction, &fallback).await
    }

    async fn chat_reply(&self) -> String {
        let turns: Vec<ChatTurn> = self
            .session
            .history
            .recent_messages(self.max_dialogue_turns)
            .skip_while(|m| m.role == MessageRole::Assistant)
            .map(|m| match m.role {
                MessageRole::User => ChatTurn::user(m.content.clone()),
                MessageRole::Assistant => ChatTurn::assistant(m.content.clone()),
            })
            .collect();

        let request = CompletionRequest::chat(&self.system_prompt, turns);
        match self.model.complete(&request).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                error!(model = self.model.name(), error = %e, "Chat completion failed");
                FALLBACK_REPLY.to_string()
            }
        }
    }

    /// One-off instruction with the assistant persona
    async fn ask(&self, instruction: &str, fallback: &str) -> String {
        let request = CompletionRequest::chat(&self.system_prompt, vec![ChatTurn::user(instruction)]);
        match self.model.complete(&request).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                error!(model = self.model.name(), error = %e, "Completion failed, using fallback text");
                fallback.to_string()
            }
        }
    }

    /// Catalog products named in `text`: interests for user text, discussed for replies
    fn note_mentions(&mut self, text: &str, role: MessageRole) {
        let folded = fold_accents(text);
        let names = self
            .knowledge
            .credit_products
            .iter()
            .map(|p| &p.name)
            .chain(self.knowledge.products.iter().map(|p| &p.name));

        for name in names {
            if !folded.contains(&fold_accents(name)) {
                continue;
            }
            let added = match role {
                MessageRole::User => self.session.state.add_interest(name),
                MessageRole::Assistant => self.session.state.mark_product_discussed(name),
            };
            if added {
                debug!(product = %name, ?role, "Product mention recorded");
            }
        }
    }
}

/// Deterministic description of a simulation
pub fn simulation_summary(
    request: &SimulationRequest,
    annual_interest_rate: f64,
    result: &SimulationResult,
) -> String {
    format!(
        "Simulación de {}\n\
         - Monto solicitado: {}\n\
         - Tasa de interés anual: {}%\n\
         - Plazo: {} meses\n\
         - Cuota mensual: {}\n\
         - Total a pagar: {}\n\
         - Total de intereses: {}",
        request.product_name,
        format_currency(request.amount),
        format_rate(annual_interest_rate),
        request.term,
        format_currency(result.monthly_payment),
        format_currency(result.total_payment),
        format_currency(result.total_interest),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use crate::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers extraction prompts with a fixed JSON and chat prompts with fixed text
    struct ScriptedModel {
        extraction: &'static str,
        chat: Option<&'static str>,
        last_turns: Mutex<usize>,
    }

    impl ScriptedModel {
        fn new(extraction: &'static str, chat: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                extraction,
                chat,
                last_turns: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if request.system.is_none() {
                return Ok(self.extraction.to_string());
            }
            *self.last_turns.lock().unwrap() = request.turns.len();
            self.chat
                .map(str::to_string)
                .ok_or_else(|| AssistantError::Llm("scripted failure".to_string()))
        }
    }

    fn assistant(model: Arc<ScriptedModel>) -> Assistant {
        Assistant::new(Arc::new(KnowledgeBase::sample()), model)
    }

    #[tokio::test]
    async fn test_successful_simulation_is_logged_once() {
        let model = ScriptedModel::new(
            r#"{"product_name": "Crédito Personal", "amount": 20000, "term": 12}"#,
            Some("respuesta"),
        );
        let mut assistant = assistant(model);

        let reply = assistant
            .process_message("Quiero simular un crédito personal de $20,000 a 12 meses")
            .await;

        assert!(reply.contains("Cuota mensual: $1,833.60"));
        assert!(reply.contains("Total a pagar: $22,003.20"));
        assert!(reply.contains("Tasa de interés anual: 18%"));

        let log = &assistant.session().state.simulations;
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().request.term, 12);
        assert_eq!(assistant.session().history.message_count(), 2);
        assert_eq!(
            assistant.session().state.products_discussed(),
            ["Crédito Personal"]
        );
    }

    #[tokio::test]
    async fn test_rejected_simulation_is_not_logged() {
        let model = ScriptedModel::new(
            r#"{"product_name": "Crédito Personal", "amount": 1000, "term": 12}"#,
            Some("Ese monto está fuera del rango permitido."),
        );
        let mut assistant = assistant(model);

        let reply = assistant
            .process_message("simular crédito personal de $1,000 a 12 meses")
            .await;

        assert_eq!(reply, "Ese monto está fuera del rango permitido.");
        assert!(assistant.session().state.simulations.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_simulation_fallback_keeps_bounds() {
        let model = ScriptedModel::new(
            r#"{"product_name": "Crédito Personal", "amount": 20000, "term": 48}"#,
            None,
        );
        let mut assistant = assistant(model);

        let reply = assistant.process_message("simular crédito personal").await;

        assert!(reply.contains("between 6 and 36 months"));
        assert!(assistant.session().state.simulations.is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_request_asks_for_data() {
        let model = ScriptedModel::new("{}", None);
        let mut assistant = assistant(model);

        let reply = assistant.process_message("quiero un préstamo").await;

        assert!(reply.contains("producto"));
        assert!(reply.contains("plazo en meses"));
        assert!(reply.contains("Crédito Vehicular"));
        assert!(assistant.session().state.simulations.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_returns_apology() {
        let model = ScriptedModel::new("{}", None);
        let mut assistant = assistant(model);

        let reply = assistant.process_message("¿Qué es peiGo?").await;

        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(assistant.session().history.message_count(), 2);
    }

    #[tokio::test]
    async fn test_mentions_are_tracked() {
        let model = ScriptedModel::new("{}", Some("Te recomiendo la Tarjeta de Débito de peiGo."));
        let mut assistant = assistant(model);

        assistant
            .process_message("¿Cómo funciona el pago de servicios?")
            .await;

        assert_eq!(assistant.session().state.interests(), ["Pago de Servicios"]);
        assert_eq!(
            assistant.session().state.products_discussed(),
            ["Tarjeta de Débito"]
        );
    }

    #[tokio::test]
    async fn test_card_question_is_not_a_simulation() {
        let model = ScriptedModel::new("{}", Some("Se activa gratis desde la app."));
        let mut assistant = assistant(model);

        let reply = assistant
            .process_message("¿Cómo activo mi Tarjeta de Crédito?")
            .await;

        assert_eq!(reply, "Se activa gratis desde la app.");
        assert!(assistant.session().state.simulations.is_empty());
    }

    #[tokio::test]
    async fn test_dialogue_window() {
        let model = ScriptedModel::new("{}", Some("ok"));
        let mut assistant = assistant(model.clone()).with_max_dialogue_turns(4);

        for i in 0..5 {
            assistant.process_message(&format!("pregunta {}", i)).await;
        }

        // Window of 4 starts on an assistant turn, which is dropped
        assert_eq!(*model.last_turns.lock().unwrap(), 3);
        assert_eq!(assistant.session().history.message_count(), 10);
    }

    #[tokio::test]
    async fn test_explain_simulation_falls_back_to_figures() {
        let model = ScriptedModel::new("{}", None);
        let mut assistant = assistant(model);

        let record = assistant
            .simulate("crédito vehicular", 100_000.0, 24)
            .unwrap();
        assert_eq!(record.request.product_name, "Crédito Vehicular");

        let explanation = assistant.explain_simulation(&record).await;
        assert!(explanation.contains("Simulación de Crédito Vehicular"));
        assert!(explanation.contains(&format_currency(record.result.monthly_payment)));
    }

    #[tokio::test]
    async fn test_greeting_fallback() {
        let model = ScriptedModel::new("{}", None);
        let assistant = assistant(model);
        assert_eq!(assistant.greeting().await, DEFAULT_GREETING);
        assert_eq!(assistant.farewell().await, DEFAULT_FAREWELL);
    }
}
