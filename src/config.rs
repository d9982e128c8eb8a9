use std::time::Duration;

use clap::Args;

use crate::lms::ClientSettings;
use crate::sync::DEFAULT_MAX_CONCURRENCY;

/// Connection and tuning settings, read from flags or the environment.
#[derive(Debug, Clone, Args)]
pub struct Config {
    #[arg(long, env = "LMS_BASE_URL", default_value = "https://rest.myabsorb.com")]
    pub lms_base_url: String,

    #[arg(long, env = "LMS_API_KEY", default_value = "", hide_env_values = true)]
    pub lms_api_key: String,

    #[arg(long, env = "LMS_TOKEN", default_value = "", hide_env_values = true)]
    pub lms_token: String,

    #[arg(long, env = "LMS_TIMEOUT_SECS", default_value_t = 30)]
    pub lms_timeout_secs: u64,

    /// Timeout for department listing pages, which can be slow for large departments.
    #[arg(long, env = "LMS_LISTING_TIMEOUT_SECS", default_value_t = 120)]
    pub lms_listing_timeout_secs: u64,

    #[arg(long, env = "LMS_MAX_RETRIES", default_value_t = 2)]
    pub lms_max_retries: u32,

    #[arg(long, env = "LMS_RETRY_BACKOFF_MS", default_value_t = 500)]
    pub lms_retry_backoff_ms: u64,

    #[arg(long, env = "LMS_MAX_CONCURRENCY", default_value_t = DEFAULT_MAX_CONCURRENCY)]
    pub lms_max_concurrency: usize,

    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 300)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,
}

impl Config {
    pub fn client_settings(&self) -> ClientSettings {
        let mut settings = ClientSettings::new(&self.lms_base_url, &self.lms_api_key, &self.lms_token);
        settings.timeout = Duration::from_secs(self.lms_timeout_secs);
        settings.listing_timeout = Duration::from_secs(self.lms_listing_timeout_secs);
        settings.max_retries = self.lms_max_retries;
        settings.retry_backoff = Duration::from_millis(self.lms_retry_backoff_ms);
        settings.max_idle_connections = self.lms_max_concurrency.max(1);
        settings
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
