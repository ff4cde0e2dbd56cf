use credit_assistant::{
    api::{start_server, ApiState},
    config::AppConfig,
    knowledge::KnowledgeBase,
    llm::select_model,
};
use chrono::Duration;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Credit Assistant - API Server");
    info!("📍 Port: {}", config.port);

    let knowledge = Arc::new(KnowledgeBase::load_or_seed(&config.knowledge_base_path).await?);
    let model = select_model(config.gemini_api_key.clone(), &config.gemini_model)?;

    info!(
        model = model.name(),
        credit_products = knowledge.credit_products.len(),
        "✅ Assistant components initialized"
    );

    let state = ApiState::new(knowledge, model, config.max_dialogue_turns)
        .with_session_ttl(Duration::minutes(config.session_ttl_minutes));
    start_server(state, config.port).await?;

    Ok(())
}
