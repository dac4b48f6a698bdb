use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use saathi_core::config::{AppConfig, ConfigError, LoadOptions};
use saathi_db::{connect_from_config, migrations, CallRecordRepository, DbPool};
use saathi_db::SqlCallRecordRepository;
use saathi_kb::HttpKbClient;
use saathi_telephony::HttpTelephonyAdapter;

use crate::orchestrator::CallOrchestrator;
use crate::vapi::VapiState;
use crate::{admin, health, vapi};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub records: Arc<dyn CallRecordRepository>,
    pub vapi_state: VapiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let records: Arc<dyn CallRecordRepository> =
        Arc::new(SqlCallRecordRepository::new(db_pool.clone()));
    let kb = Arc::new(HttpKbClient::new(
        config.kb.url.clone(),
        Duration::from_secs(config.kb.timeout_secs),
    ));
    let telephony = Arc::new(HttpTelephonyAdapter::new(
        config.telephony.base_url.clone(),
        config.telephony.api_key.clone(),
    ));
    let orchestrator = Arc::new(CallOrchestrator::new(
        kb,
        telephony,
        Arc::clone(&records),
        config.telephony.hotline_number.clone(),
        config.kb.max_passages,
    ));
    let vapi_state = VapiState::new(orchestrator, config.telephony.webhook_secret.clone());

    Ok(Application { config, db_pool, records, vapi_state })
}

impl Application {
    /// Full route table: vendor ingress, admin read-side, and health.
    pub fn router(&self) -> axum::Router {
        vapi::router(self.vapi_state.clone())
            .merge(admin::router(Arc::clone(&self.records)))
            .merge(health::router(self.db_pool.clone()))
    }
}
