use sqlx::SqlitePool;
use std::sync::Arc;

use crate::application::services::WebhookPeriodicalChecker;
use crate::config::{AgentConfig, EnvFeatureFlags};
use crate::infrastructure::database::{
    SqliteAuthDataRepository, SqliteConnectionRepository, SqliteVcsRootRepository,
};
use crate::infrastructure::logging::BoundaryLogger;
use crate::webhooks::WebHooksStorage;

pub type SqliteWebhookChecker = WebhookPeriodicalChecker<
    SqliteAuthDataRepository,
    SqliteVcsRootRepository,
    SqliteConnectionRepository,
    EnvFeatureFlags,
>;

/// AppContext - wires storages, repositories and services together
#[derive(Clone)]
pub struct AppContext {
    // Services (Application Layer)
    pub webhook_checker: Arc<SqliteWebhookChecker>,

    // Storage
    pub webhooks: Arc<WebHooksStorage>,

    // Repositories (Infrastructure Layer)
    pub auth_repo: Arc<SqliteAuthDataRepository>,
    pub vcs_root_repo: Arc<SqliteVcsRootRepository>,
    pub connection_repo: Arc<SqliteConnectionRepository>,

    // Infrastructure
    pub logger: Arc<BoundaryLogger>,

    // Config
    pub config: Arc<AgentConfig>,
}

impl AppContext {
    /// Create a new AppContext with all dependencies wired up
    pub fn new(pool: SqlitePool, config: AgentConfig) -> Self {
        // 1. Create Repositories
        let auth_repo = Arc::new(SqliteAuthDataRepository::new(pool.clone()));
        let vcs_root_repo = Arc::new(SqliteVcsRootRepository::new(pool.clone()));
        let connection_repo = Arc::new(SqliteConnectionRepository::new(pool));

        // 2. Create Infrastructure components
        let logger = Arc::new(BoundaryLogger::new());
        let webhooks = Arc::new(WebHooksStorage::in_data_dir(&config.data_dir));

        // 3. Create Services with dependency injection
        let webhook_checker = Arc::new(WebhookPeriodicalChecker::new(
            webhooks.clone(),
            auth_repo.clone(),
            vcs_root_repo.clone(),
            connection_repo.clone(),
            Arc::new(EnvFeatureFlags),
            logger.clone(),
        ));

        Self {
            webhook_checker,
            webhooks,
            auth_repo,
            vcs_root_repo,
            connection_repo,
            logger,
            config: Arc::new(config),
        }
    }
}
