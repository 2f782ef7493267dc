use garde::Validate;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080"). Unused by the worker.
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// Address the worker serves its Prometheus scrape endpoint on
    #[serde(default = "default_worker_metrics_addr")]
    #[garde(length(min = 1))]
    pub worker_metrics_addr: String,

    /// PostgreSQL connection string
    #[garde(length(min = 1))]
    pub database_url: String,

    /// Redis connection string for the job queue
    #[garde(length(min = 1))]
    pub redis_url: String,

    /// Redis list key holding pending job IDs
    #[serde(default = "default_queue_name")]
    #[garde(length(min = 1, max = 128))]
    pub queue_name: String,

    /// Directory uploaded photos are written to
    #[serde(default = "default_photo_storage_path")]
    #[garde(length(min = 1))]
    pub photo_storage_path: String,

    /// Analyzer program and leading arguments, whitespace separated.
    /// The photo path is appended as the final argument.
    #[serde(default = "default_analyzer_command")]
    #[garde(length(min = 1))]
    pub analyzer_command: String,

    /// Number of deliveries the worker processes concurrently
    #[serde(default = "default_worker_concurrency")]
    #[garde(range(min = 1, max = 64))]
    pub worker_concurrency: usize,

    /// Upper bound on a single store or queue call
    #[serde(default = "default_store_timeout_ms")]
    #[garde(range(min = 1))]
    pub store_timeout_ms: u64,

    /// Upper bound on a single analyzer run
    #[serde(default = "default_analysis_timeout_ms")]
    #[garde(range(min = 1))]
    pub analysis_timeout_ms: u64,

    /// How long one blocking receive waits before re-checking for shutdown
    #[serde(default = "default_receive_wait_secs")]
    #[garde(range(min = 1, max = 300))]
    pub receive_wait_secs: u64,

    /// Connection attempts for PostgreSQL and Redis at startup
    #[serde(default = "default_startup_retries")]
    #[garde(range(min = 1, max = 100))]
    pub startup_retries: u32,

    /// Base backoff between startup attempts, doubled each retry
    #[serde(default = "default_startup_backoff_ms")]
    #[garde(skip)]
    pub startup_backoff_ms: u64,

    /// Maximum accepted request body size
    #[serde(default = "default_max_upload_bytes")]
    #[garde(range(min = 1024))]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}

fn default_queue_name() -> String {
    "face_detection".to_string()
}

fn default_photo_storage_path() -> String {
    "./photos".to_string()
}

fn default_analyzer_command() -> String {
    "detect-faces".to_string()
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

fn default_analysis_timeout_ms() -> u64 {
    60_000
}

fn default_receive_wait_secs() -> u64 {
    5
}

fn default_startup_retries() -> u32 {
    5
}

fn default_startup_backoff_ms() -> u64 {
    500
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    /// Load from the process environment (and `.env` if present), then validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Same as [`AppConfig::from_env`] but from explicit key/value pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn receive_wait(&self) -> Duration {
        Duration::from_secs(self.receive_wait_secs)
    }

    pub fn worker_metrics_socket(&self) -> Result<SocketAddr, AddrParseError> {
        self.worker_metrics_addr.parse()
    }

    pub fn startup_backoff(&self) -> Duration {
        Duration::from_millis(self.startup_backoff_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(extra: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut v = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/photos".to_string()),
            ("REDIS_URL".to_string(), "redis://localhost".to_string()),
        ];
        v.extend(extra.iter().map(|(k, val)| (k.to_string(), val.to_string())));
        v
    }

    #[test]
    fn test_defaults_apply() {
        let config = AppConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.queue_name, "face_detection");
        assert_eq!(config.worker_concurrency, 1);
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.receive_wait(), Duration::from_secs(5));
        assert_eq!(
            config.worker_metrics_socket().unwrap(),
            "0.0.0.0:9091".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_bad_worker_metrics_addr_fails_to_parse() {
        let config = AppConfig::from_vars(vars(&[("WORKER_METRICS_ADDR", "not-an-addr")])).unwrap();
        assert!(config.worker_metrics_socket().is_err());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = AppConfig::from_vars(vars(&[
            ("WORKER_CONCURRENCY", "4"),
            ("QUEUE_NAME", "photos"),
            ("STORE_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.queue_name, "photos");
        assert_eq!(config.store_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_database_url_is_rejected() {
        let result = AppConfig::from_vars(vec![(
            "REDIS_URL".to_string(),
            "redis://localhost".to_string(),
        )]);
        assert!(matches!(result, Err(ConfigError::Env(_))));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result = AppConfig::from_vars(vars(&[("WORKER_CONCURRENCY", "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
