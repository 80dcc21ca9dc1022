//! Service configuration.

use std::path::Path;

use serde::Deserialize;

use catwatch_core::{default_plans, Plan, PlanCatalog};

use crate::stripe::client::DEFAULT_BASE_URL;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string. The in-memory store is used when unset.
    pub database_url: Option<String>,

    /// Maximum PostgreSQL connections.
    pub database_max_connections: u32,

    /// Stripe secret API key (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe API root.
    pub stripe_api_base: String,

    /// Timeout for each Stripe request in seconds.
    pub stripe_timeout_seconds: u64,

    /// HS256 secret used to verify user tokens.
    pub jwt_secret: Option<String>,

    /// Key expected in `X-Admin-Key`.
    pub admin_api_key: Option<String>,

    /// Plan catalog.
    pub plans: PlanCatalog,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Cron expression for the card and coupon sweeps.
    pub sweep_schedule: String,

    /// Cron expression for the gateway reconciliation sweep.
    pub reconcile_schedule: String,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    api_base: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (stripe_api_key, stripe_api_base) = load_stripe_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            stripe_api_key,
            stripe_api_base: stripe_api_base.unwrap_or(defaults.stripe_api_base),
            stripe_timeout_seconds: env_parse("STRIPE_TIMEOUT_SECONDS")
                .unwrap_or(defaults.stripe_timeout_seconds),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            plans: load_plans(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            sweep_schedule: std::env::var("SWEEP_SCHEDULE").unwrap_or(defaults.sweep_schedule),
            reconcile_schedule: std::env::var("RECONCILE_SCHEDULE")
                .unwrap_or(defaults.reconcile_schedule),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_json_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.api_key), secrets.api_base);
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_API_BASE").ok(),
    )
}

/// Load the plan catalog from `PLANS_FILE`, falling back to the stock plans.
fn load_plans() -> PlanCatalog {
    if let Ok(path) = std::env::var("PLANS_FILE") {
        match load_json_file::<Vec<Plan>>(&path) {
            Ok(plans) => {
                tracing::info!(path = %path, count = plans.len(), "Loaded plan catalog");
                return PlanCatalog::new(plans);
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Failed to load plan catalog, using defaults");
            }
        }
    }
    PlanCatalog::new(default_plans())
}

/// Load a JSON file.
fn load_json_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 10,
            stripe_api_key: None,
            stripe_api_base: DEFAULT_BASE_URL.into(),
            stripe_timeout_seconds: 30,
            jwt_secret: None,
            admin_api_key: None,
            plans: PlanCatalog::new(default_plans()),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            // Seconds first: 12:01 every day.
            sweep_schedule: "0 1 12 * * *".into(),
            reconcile_schedule: "0 30 3 * * *".into(),
        }
    }
}
