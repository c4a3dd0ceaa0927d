use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub internal_api_key: Option<String>,
    // External collaborators.
    pub booking_provider_base_url: Option<String>,
    pub booking_provider_api_key: Option<String>,
    pub accounting_provider_base_url: Option<String>,
    pub accounting_provider_api_key: Option<String>,
    pub payment_provider_secret_key: Option<String>,
    pub payment_webhook_secret: Option<String>,
    pub email_api_key: Option<String>,
    pub email_webhook_secret: Option<String>,
    pub email_from_address: String,
    pub provider_timeout_seconds: u64,
    // Anomaly thresholds.
    pub cleaning_mismatch_threshold: f64,
    pub duplicate_payout_tolerance: f64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "OwnerLedger API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            trusted_hosts: parse_csv(&env_or("TRUSTED_HOSTS", "localhost,127.0.0.1")),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            internal_api_key: env_opt("INTERNAL_API_KEY"),
            booking_provider_base_url: env_opt("BOOKING_PROVIDER_BASE_URL"),
            booking_provider_api_key: env_opt("BOOKING_PROVIDER_API_KEY"),
            accounting_provider_base_url: env_opt("ACCOUNTING_PROVIDER_BASE_URL"),
            accounting_provider_api_key: env_opt("ACCOUNTING_PROVIDER_API_KEY"),
            payment_provider_secret_key: env_opt("PAYMENT_PROVIDER_SECRET_KEY"),
            payment_webhook_secret: env_opt("PAYMENT_WEBHOOK_SECRET"),
            email_api_key: env_opt("EMAIL_API_KEY"),
            email_webhook_secret: env_opt("EMAIL_WEBHOOK_SECRET"),
            email_from_address: env_or("EMAIL_FROM_ADDRESS", "statements@ownerledger.app"),
            provider_timeout_seconds: env_parse_or("PROVIDER_TIMEOUT_SECONDS", 15),
            cleaning_mismatch_threshold: env_parse_or("CLEANING_MISMATCH_THRESHOLD", 0.10),
            duplicate_payout_tolerance: env_parse_or("DUPLICATE_PAYOUT_TOLERANCE", 0.0),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}
