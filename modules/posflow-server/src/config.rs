use std::time::Duration;

use anyhow::{Context, Result};

/// Server configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // HTTP
    pub http_host: String,
    pub http_port: u16,

    // Dispatch
    pub max_dispatch_depth: usize,
    pub dispatch_timeout: Option<Duration>,

    // Broker / consumer
    pub broker_capacity: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,

    // Plugins
    pub active_plugins: Vec<String>,
    pub recommendation_refresh: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from any key lookup. `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let parse = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().parse::<u64>().with_context(|| format!("{key} must be a non-negative integer, got {v:?}")))
                .transpose()
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").context("DATABASE_URL is required")?,
            database_max_connections: match parse("DATABASE_MAX_CONNECTIONS")? {
                Some(n) => u32::try_from(n).context("DATABASE_MAX_CONNECTIONS out of range")?,
                None => 10,
            },
            http_host: lookup("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: match parse("HTTP_PORT")? {
                Some(port) => u16::try_from(port).context("HTTP_PORT out of range")?,
                None => 8080,
            },
            max_dispatch_depth: parse("MAX_DISPATCH_DEPTH")?
                .map(|d| d as usize)
                .unwrap_or(posflow_engine::dispatcher::DEFAULT_MAX_DEPTH),
            dispatch_timeout: parse("DISPATCH_TIMEOUT_MS")?.map(Duration::from_millis),
            broker_capacity: parse("BROKER_CAPACITY")?.unwrap_or(1024) as usize,
            retry_attempts: match parse("RETRY_ATTEMPTS")? {
                Some(n) => u32::try_from(n).context("RETRY_ATTEMPTS out of range")?,
                None => 3,
            },
            retry_delay: Duration::from_millis(parse("RETRY_DELAY_MS")?.unwrap_or(5000)),
            active_plugins: lookup("ACTIVE_PLUGINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            recommendation_refresh: parse("RECOMMENDATION_REFRESH_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(12).collect();
            format!("{}...({} chars)", head, val.chars().count())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  HTTP: {}", self.bind_addr());
        tracing::info!("  MAX_DISPATCH_DEPTH: {}", self.max_dispatch_depth);
        tracing::info!("  BROKER_CAPACITY: {}", self.broker_capacity);
        tracing::info!(
            "  RETRY: {} attempts, {}ms delay",
            self.retry_attempts,
            self.retry_delay.as_millis()
        );
        tracing::info!("  ACTIVE_PLUGINS: {:?}", self.active_plugins);
    }
}
