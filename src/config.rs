use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub workspace: WorkspaceConfig,
    pub poller: PollerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    pub preview_rows: usize,
    pub compare_preview_rows: usize,
    pub notification_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    pub interval_ms: u64,
    pub aggressive_interval_ms: u64,
    pub aggressive_duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    pub log_dir: Option<String>,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn aggressive_interval(&self) -> Duration {
        Duration::from_millis(self.aggressive_interval_ms)
    }

    pub fn aggressive_duration(&self) -> Duration {
        Duration::from_millis(self.aggressive_duration_ms)
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                base_url: "http://localhost:8000".to_string(),
                api_token: None,
                request_timeout_secs: 30,
            },
            workspace: WorkspaceConfig {
                preview_rows: 50,
                compare_preview_rows: 50,
                notification_capacity: 100,
            },
            poller: PollerConfig {
                interval_ms: 5_000,
                aggressive_interval_ms: 1_000,
                aggressive_duration_ms: 10_000,
            },
            logging: LoggingConfig {
                filter: "insightflow=info".to_string(),
                log_dir: None,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            gateway: GatewayConfig {
                base_url: env::var("INSIGHTFLOW_API_URL")
                    .unwrap_or(defaults.gateway.base_url)
                    .trim_end_matches('/')
                    .to_string(),
                api_token: env::var("INSIGHTFLOW_API_TOKEN").ok().filter(|t| !t.is_empty()),
                request_timeout_secs: env::var("INSIGHTFLOW_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
            },
            workspace: WorkspaceConfig {
                preview_rows: env::var("INSIGHTFLOW_PREVIEW_ROWS")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()?,
                compare_preview_rows: env::var("INSIGHTFLOW_COMPARE_PREVIEW_ROWS")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()?,
                notification_capacity: env::var("INSIGHTFLOW_NOTIFICATION_CAPACITY")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()?,
            },
            poller: PollerConfig {
                interval_ms: env::var("INSIGHTFLOW_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()?,
                aggressive_interval_ms: env::var("INSIGHTFLOW_AGGRESSIVE_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?,
                aggressive_duration_ms: env::var("INSIGHTFLOW_AGGRESSIVE_DURATION_MS")
                    .unwrap_or_else(|_| "10000".to_string())
                    .parse()?,
            },
            logging: LoggingConfig {
                filter: env::var("RUST_LOG").unwrap_or(defaults.logging.filter),
                log_dir: env::var("LOG_DIR").ok(),
            },
        };

        if config.poller.aggressive_interval_ms == 0 || config.poller.interval_ms == 0 {
            anyhow::bail!("poll intervals must be greater than zero");
        }

        Ok(config)
    }
}
