use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use leadflow::classify::{CascadeClassifier, EncoderClassifier, TermModel};
use leadflow::config::PipelineConfig;
use leadflow::dedup::{DuplicateDetector, HashEmbedder};
use leadflow::dispatch::{TelegramDispatcher, TemplateComposer};
use leadflow::gateway::{GatewayConfig, OllamaBackend, ResilientGateway, RigBackend};
use leadflow::pipeline::{Candidate, LeadPipeline};
use leadflow::ratelimit::{DispatchLimiter, RateLimitConfig};
use leadflow::store::{LeadStore, LibSqlStore};
use leadflow::strategy::{StrategyConfig, StrategySelector};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let model = std::env::var("LEADFLOW_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
    let ollama_url = std::env::var("LEADFLOW_OLLAMA_URL")
        .unwrap_or_else(|_| "http://localhost:11434".to_string());
    let ollama_model =
        std::env::var("LEADFLOW_OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1".to_string());
    let db_path =
        std::env::var("LEADFLOW_DB_PATH").unwrap_or_else(|_| "./data/leadflow.db".to_string());
    let topic = std::env::var("LEADFLOW_TOPIC").unwrap_or_else(|_| "seo".to_string());

    eprintln!("leadflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {db_path}");
    eprintln!("   Paste a candidate message and press Enter. Ctrl-D to exit.\n");

    // ── Store ───────────────────────────────────────────────────────
    let store: Arc<dyn LeadStore> =
        Arc::new(LibSqlStore::new_local(std::path::Path::new(&db_path)).await?);

    // ── Model gateway ───────────────────────────────────────────────
    // Without an API key the pipeline still runs; borderline candidates
    // get the conservative verdict instead of deep analysis.
    let gateway = match std::env::var("ANTHROPIC_API_KEY") {
        Ok(api_key) => {
            let primary = RigBackend::new(&secrecy::SecretString::from(api_key), &model)?;
            let secondary = OllamaBackend::new(&ollama_url, &ollama_model);
            eprintln!("   Primary model: {model}");
            eprintln!("   Secondary model: {ollama_model} @ {ollama_url}");
            Some(Arc::new(ResilientGateway::new(
                Arc::new(primary),
                Arc::new(secondary),
                GatewayConfig::default(),
            )))
        }
        Err(_) => {
            eprintln!("   ANTHROPIC_API_KEY not set — deep analysis disabled");
            None
        }
    };

    // ── Pipeline services ───────────────────────────────────────────
    let config = PipelineConfig::default();
    let embedder = Arc::new(HashEmbedder::default());

    let detector = DuplicateDetector::new(
        Arc::clone(&store),
        embedder.clone(),
        config.dedup.clone(),
    );
    let classifier = CascadeClassifier::new(
        &config,
        TermModel::with_default_terms(),
        EncoderClassifier::new(embedder),
        gateway.clone(),
    )?;
    let selector = StrategySelector::load(Arc::clone(&store), StrategyConfig::default()).await?;
    let limiter = DispatchLimiter::new(RateLimitConfig::default());

    let dispatcher = match std::env::var("LEADFLOW_BOT_TOKEN") {
        Ok(token) => {
            eprintln!("   Dispatch: telegram");
            Some(Arc::new(TelegramDispatcher::new(token)) as Arc<dyn leadflow::dispatch::MessageDispatcher>)
        }
        Err(_) => {
            eprintln!("   LEADFLOW_BOT_TOKEN not set — dispatch disabled");
            None
        }
    };

    let pipeline = LeadPipeline::new(
        detector,
        classifier,
        selector,
        limiter,
        Arc::new(TemplateComposer),
        dispatcher,
        store,
        gateway,
        config.max_concurrent_sources,
    );

    // ── Interactive intake loop ─────────────────────────────────────
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let candidate = Candidate::new(text, "cli").with_topic(&topic);
        match pipeline.process(candidate).await {
            Ok(outcome) => {
                println!("{}", serde_json::to_string_pretty(&outcome.verdict)?);
            }
            Err(e) => {
                eprintln!("error: {e}");
            }
        }
    }

    Ok(())
}
