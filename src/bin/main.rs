use clap::Parser;
use credit_assistant::{
    agent::{simulation_summary, Assistant},
    amortization::{format_currency, SimulationResult},
    classifier::is_farewell,
    config::AppConfig,
    knowledge::{prompt::format_rate, KnowledgeBase},
    llm::select_model,
    models::CreditProduct,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Terminal chat with the peiGo virtual assistant
#[derive(Parser, Debug)]
#[command(name = "assistant", version, about)]
struct Cli {
    /// Gemini API key (overrides GEMINI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Knowledge base JSON (created with sample data if missing)
    #[arg(long)]
    knowledge_base: Option<PathBuf>,

    /// Directory for session reports
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Customer name used in the farewell and the report
    #[arg(long)]
    name: Option<String>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so they do not interleave with the chat
    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::from_env()?;
    if let Some(key) = cli.api_key {
        config.gemini_api_key = Some(key);
    }
    if let Some(path) = cli.knowledge_base {
        config.knowledge_base_path = path;
    }
    if let Some(dir) = cli.report_dir {
        config.report_dir = dir;
    }
    debug!(
        knowledge_base = ?config.knowledge_base_path,
        report_dir = ?config.report_dir,
        "Configuration resolved"
    );

    let knowledge = Arc::new(KnowledgeBase::load_or_seed(&config.knowledge_base_path).await?);
    let model = select_model(config.gemini_api_key.clone(), &config.gemini_model)?;

    let mut assistant =
        Assistant::new(knowledge, model).with_max_dialogue_turns(config.max_dialogue_turns);
    assistant.session_mut().state.user_name = cli.name;

    info!(session_id = %assistant.session().session_id, "Terminal session started");

    println!("==============================================");
    println!("  peiGo - Asistente Virtual");
    println!("  Escribe 'salir' para terminar la conversación");
    println!("==============================================\n");
    println!("peiGo: {}\n", assistant.greeting().await);

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = prompt(&mut input, "Tú: ").await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        if is_farewell(message) {
            println!("\npeiGo: {}\n", assistant.farewell().await);
            offer_report(&assistant, &config.report_dir, &mut input).await?;
            break;
        }

        let simulations_before = assistant.session().state.simulations.len();
        let reply = assistant.process_message(message).await;
        println!("\npeiGo: {}\n", reply);

        if assistant.session().state.simulations.len() > simulations_before {
            simulation_menu(&mut assistant, &mut input).await?;
        }
    }

    Ok(())
}

async fn prompt(input: &mut Input, label: &str) -> std::io::Result<Option<String>> {
    print!("{}", label);
    std::io::stdout().flush()?;
    input.next_line().await
}

/// Follow-up options after a successful simulation
async fn simulation_menu(assistant: &mut Assistant, input: &mut Input) -> std::io::Result<()> {
    println!("¿Qué deseas hacer?");
    println!("  1. Ver la tabla de amortización completa");
    println!("  2. Modificar los parámetros de la simulación");
    println!("  3. Continuar con la conversación");

    let Some(choice) = prompt(input, "Opción: ").await? else {
        return Ok(());
    };

    let Some(last) = assistant.last_simulation().cloned() else {
        return Ok(());
    };

    match choice.trim() {
        "1" => print_table(&last.result),
        "2" => {
            let products = &assistant.knowledge().credit_products;
            println!("\nProductos disponibles:");
            for (i, product) in products.iter().enumerate() {
                println!(
                    "  {}. {} ({}% anual)",
                    i + 1,
                    product.name,
                    format_rate(product.annual_interest_rate)
                );
            }

            let product_label = format!(
                "Selecciona un producto (número) [{}]: ",
                last.request.product_name
            );
            let raw = prompt(input, &product_label).await?.unwrap_or_default();
            let Some(product_name) = choose_product(products, &raw, &last.request.product_name)
            else {
                println!("Producto no válido.\n");
                return Ok(());
            };

            let amount_label = format!("Nuevo monto [{}]: ", format_currency(last.request.amount));
            let amount = match prompt(input, &amount_label).await? {
                Some(raw) if !raw.trim().is_empty() => match parse_amount(&raw) {
                    Some(amount) => amount,
                    None => {
                        println!("Monto no válido.\n");
                        return Ok(());
                    }
                },
                _ => last.request.amount,
            };

            let term_label = format!("Nuevo plazo en meses [{}]: ", last.request.term);
            let term = match prompt(input, &term_label).await? {
                Some(raw) if !raw.trim().is_empty() => match raw.trim().parse::<u32>() {
                    Ok(term) => term,
                    Err(_) => {
                        println!("Plazo no válido.\n");
                        return Ok(());
                    }
                },
                _ => last.request.term,
            };

            match assistant.simulate(&product_name, amount, term) {
                Ok(record) => {
                    println!(
                        "\n{}\n",
                        simulation_summary(&record.request, record.annual_interest_rate, &record.result)
                    );
                    println!("peiGo: {}\n", assistant.explain_simulation(&record).await);
                }
                Err(e) => println!("\nNo pude realizar la simulación: {}\n", e),
            }
        }
        _ => println!(),
    }

    Ok(())
}

async fn offer_report(
    assistant: &Assistant,
    report_dir: &Path,
    input: &mut Input,
) -> Result<(), Box<dyn std::error::Error>> {
    let answer = prompt(input, "¿Deseas generar un reporte de esta sesión? (s/n): ").await?;
    let wants_report = answer
        .map(|a| a.trim().to_lowercase().starts_with('s'))
        .unwrap_or(false);

    if wants_report {
        let path = assistant.report().write_to_dir(report_dir).await?;
        println!("Reporte generado: {}", path.display());
    }

    Ok(())
}

fn print_table(result: &SimulationResult) {
    println!(
        "\n{:>5} {:>15} {:>15} {:>15} {:>17}",
        "Mes", "Cuota", "Capital", "Interés", "Saldo"
    );
    for row in &result.amortization_table {
        println!(
            "{:>5} {:>15} {:>15} {:>15} {:>17}",
            row.period,
            format_currency(row.payment),
            format_currency(row.principal_component),
            format_currency(row.interest_component),
            format_currency(row.remaining_balance)
        );
    }
    println!(
        "\nTotal a pagar: {}  |  Total de intereses: {}\n",
        format_currency(result.total_payment),
        format_currency(result.total_interest)
    );
}

/// 1-based menu choice; blank input keeps the current product
fn choose_product(products: &[CreditProduct], raw: &str, current: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(current.to_string());
    }

    let index = raw.parse::<usize>().ok()?;
    index
        .checked_sub(1)
        .and_then(|i| products.get(i))
        .map(|product| product.name.clone())
}

fn parse_amount(raw: &str) -> Option<f64> {
    let digits: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    digits.parse::<f64>().ok().filter(|amount| amount.is_finite())
}
