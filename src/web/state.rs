use crate::config::AppConfig;
use crate::db::executor::QueryExecutor;
use crate::db::DbPool;
use crate::llm::translator::Translator;
use crate::llm::LlmManager;
use crate::storage::Storage;
use minijinja::Environment;
use std::sync::Arc;

use super::templates::init_templates;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub executor: QueryExecutor,
    pub translator: Translator,
    pub llm_manager: Arc<LlmManager>,
    pub storage: Arc<dyn Storage>,
    pub template_env: Environment<'static>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db_pool: DbPool,
        llm_manager: LlmManager,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, minijinja::Error> {
        let llm_manager = Arc::new(llm_manager);

        Ok(Self {
            config,
            executor: QueryExecutor::new(db_pool.clone()),
            translator: Translator::new(Arc::clone(&llm_manager)),
            db_pool,
            llm_manager,
            storage,
            template_env: init_templates()?,
        })
    }
}
