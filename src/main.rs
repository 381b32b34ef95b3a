use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod db;
mod export;
mod llm;
mod storage;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs, StorageBackend};
use crate::llm::providers::disabled::DisabledProvider;
use crate::llm::LlmManager;
use crate::storage::duckdb_store::DuckDbStorage;
use crate::storage::memory::MemStorage;
use crate::storage::Storage;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Initializing DuckDB connection pool");
    let pool = db::open_pool(&config.database)?;

    // Initialize LLM manager; without one, translation still works off the fallback patterns
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = match LlmManager::new(&config.llm) {
        Ok(manager) => manager,
        Err(e) => {
            warn!("{}; continuing with the language model disabled", e);
            LlmManager::with_model(Box::new(DisabledProvider))
        }
    };

    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemStorage::new()),
        StorageBackend::Duckdb => Arc::new(DuckDbStorage::new(pool.clone())?),
    };
    info!("Using {:?} storage backend", config.storage.backend);

    let app_state = Arc::new(AppState::new(config.clone(), pool, llm_manager, storage)?);

    // Start the web server
    info!("Starting NL query server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
