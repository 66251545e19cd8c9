//! Main Entrypoint for the Systrack Bot Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Loading the curriculum, the locale catalogs and the transition table.
//! 4. Wiring the LLM client, the search backends and the states.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use sqlx::PgPool;
use std::sync::Arc;
use systrack_bot::{
    config::Config,
    db::Db,
    router::create_router,
    state::{AppState, Components},
};
use systrack_core::{
    curriculum::Curriculum,
    i18n::Catalog,
    llm_client::{LLMClient, OpenAICompatibleClient},
    planner::LlmTopicPlanner,
    retrieval::{RetrievalConfig, RetrievalEngine},
    search::{McpSearchClient, SearchBackend},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = ?e, "Failed to listen for Ctrl+C");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

fn search_backend(
    url: Option<&String>,
    build: impl FnOnce(String) -> McpSearchClient,
) -> Option<Arc<dyn SearchBackend>> {
    url.map(|url| Arc::new(build(url.clone())) as Arc<dyn SearchBackend>)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(config.log_level).into())
                .from_env_lossy(),
        )
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let db = Arc::new(Db::new(pool));
    db.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Load Declarative Data ---
    let curriculum = Arc::new(Curriculum::load(&config.curriculum_path)?);
    let catalog = Catalog::load_dir(&config.locales_path)?;

    // --- 5. Initialize Shared Services ---
    let api_key = config
        .api_key()
        .context("No API key for the configured provider")?;
    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(config.provider.api_base());
    let llm: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.chat_model.clone(),
    ));

    let guides = search_backend(config.guides_search_url.as_ref(), |url| {
        McpSearchClient::guides(url).with_lang(config.guides_lang.clone())
    });
    let knowledge = search_backend(config.knowledge_search_url.as_ref(), |url| {
        McpSearchClient::knowledge(url)
    });
    if guides.is_none() && knowledge.is_none() {
        warn!("No search backends configured; answers will use no retrieved context");
    }
    let retrieval = Arc::new(RetrievalEngine::new(
        guides,
        knowledge,
        RetrievalConfig {
            backend_timeout: config.search_timeout,
            ..RetrievalConfig::default()
        },
    ));

    let app_state = AppState::assemble(Components {
        users: db.clone(),
        qa: db.clone(),
        answers: db.clone(),
        activity: db.clone(),
        llm: llm.clone(),
        retrieval,
        planner: Arc::new(LlmTopicPlanner::new(llm)),
        localizer: Arc::new(catalog),
        curriculum,
        features: config.features,
    });

    // --- 6. Load the Transition Table ---
    let report = app_state
        .machine
        .load_transitions(&config.transitions_path)
        .await
        .with_context(|| {
            format!(
                "Failed to load transitions from {}",
                config.transitions_path.display()
            )
        })?;
    if config.strict_transitions {
        app_state.machine.validate_strict().await?;
    } else if !report.is_clean() {
        warn!(?report, "Transition table has unresolved references");
    }

    // --- 7. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(Arc::new(app_state)).layer(cors);

    // --- 8. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
