use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::repository::listings::ListingDirectory;
use crate::services::batch::BatchTracker;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub http_client: reqwest::Client,
    pub listing_directory: Arc<ListingDirectory>,
    pub batch: Arc<BatchTracker>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = match &config.database_url {
            Some(url) => Some(
                PgPoolOptions::new()
                    .max_connections(config.db_pool_max_connections)
                    .min_connections(config.db_pool_min_connections)
                    .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
                    .connect_lazy(url)?,
            ),
            None => None,
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_seconds))
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            http_client,
            listing_directory: Arc::new(ListingDirectory::new()),
            batch: Arc::new(BatchTracker::new()),
        })
    }

    pub fn db(&self) -> Result<&PgPool, crate::error::AppError> {
        self.db_pool.as_ref().ok_or_else(|| {
            crate::error::AppError::Dependency(
                "Database is not configured. Set DATABASE_URL.".to_string(),
            )
        })
    }
}
