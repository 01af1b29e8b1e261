// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    // Payment provider configurations
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    pub payout_currency: String,
    // Retry and reconciliation
    pub db_retry_max_attempts: u32,
    pub db_retry_base_delay_ms: u64,
    pub transfer_stale_after_secs: u64,
    pub reconcile_interval_secs: u64,
    pub cors_allowed_origins: Vec<String>,
    pub rust_log_level: String,
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|value| value.parse::<T>().ok()).unwrap_or(default)
}

impl Config {
    pub fn init() -> anyhow::Result<Config> {
        Config::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `init` reads the process env.
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
        let required = |key: &str| get(key).ok_or_else(|| anyhow::anyhow!("{} must be set", key));

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET_KEY")?;
        let stripe_secret_key = required("STRIPE_SECRET_KEY")?;

        let stripe_api_base = get("STRIPE_API_BASE")
            .unwrap_or_else(|| "https://api.stripe.com".to_string());
        let payout_currency = get("PAYOUT_CURRENCY")
            .unwrap_or_else(|| "usd".to_string());

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173,http://localhost:8000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Config {
            database_url,
            jwt_secret,
            port: parse_or(get("PORT"), 8000),
            stripe_secret_key,
            stripe_api_base,
            payout_currency,
            db_retry_max_attempts: parse_or(get("DB_RETRY_MAX_ATTEMPTS"), 4),
            db_retry_base_delay_ms: parse_or(get("DB_RETRY_BASE_DELAY_MS"), 50),
            transfer_stale_after_secs: parse_or(get("TRANSFER_STALE_AFTER_SECS"), 900),
            reconcile_interval_secs: parse_or(get("RECONCILE_INTERVAL_SECS"), 300).max(1),
            cors_allowed_origins,
            rust_log_level: get("RUST_LOG_LEVEL").unwrap_or_else(|| "debug".to_string()),
        })
    }
}
