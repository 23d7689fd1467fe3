use std::env;
use chrono_tz::Tz;
use tracing::warn;

pub const DEFAULT_RETRY_LIMIT: u32 = 5;
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::London;
pub const DEFAULT_RETRY_QUEUE_NAME: &str = "notifications-message-batch-retries";
pub const DEFAULT_STATUS_QUEUE_NAME: &str = "notifications-message-status-updates";
pub const DEFAULT_LOGGER_NAME: &str = "manbrs-notifications";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub redis_url: Option<String>,
    pub notify_api_base_url: String,
    pub notify_api_key: String,
    pub blob_container_name: String,
    pub blob_storage_path: Option<String>,
    pub environment: String,
    pub batch_retry_limit: u32,
    pub timezone: Tz,
    pub retry_queue_name: String,
    pub status_queue_name: String,
    pub insights_logger_name: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok(),
            notify_api_base_url: env::var("NOTIFY_API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("NOTIFY_API_BASE_URL not set, using empty value");
                    String::new()
                }),
            notify_api_key: env::var("NOTIFY_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("NOTIFY_API_KEY not set, using empty value");
                    String::new()
                }),
            blob_container_name: env::var("BLOB_CONTAINER_NAME").unwrap_or_default(),
            blob_storage_path: env::var("BLOB_STORAGE_PATH").ok(),
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| {
                    warn!("ENVIRONMENT not set, using default");
                    "local".to_string()
                }),
            batch_retry_limit: parse_retry_limit(env::var("NOTIFICATIONS_BATCH_RETRY_LIMIT").ok()),
            timezone: parse_timezone(env::var("NOTIFICATIONS_TIMEZONE").ok()),
            retry_queue_name: env::var("RETRY_QUEUE_NAME")
                .unwrap_or_else(|_| DEFAULT_RETRY_QUEUE_NAME.to_string()),
            status_queue_name: env::var("STATUS_QUEUE_NAME")
                .unwrap_or_else(|_| DEFAULT_STATUS_QUEUE_NAME.to_string()),
            insights_logger_name: env::var("APPLICATIONINSIGHTS_LOGGER_NAME")
                .unwrap_or_else(|_| DEFAULT_LOGGER_NAME.to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_key.is_empty()
            && !self.notify_api_base_url.is_empty()
    }

    pub fn is_blob_storage_configured(&self) -> bool {
        self.blob_storage_path.is_some() || !self.blob_container_name.is_empty()
    }
}

fn parse_retry_limit(value: Option<String>) -> u32 {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("NOTIFICATIONS_BATCH_RETRY_LIMIT '{}' is not a number, using {}", raw, DEFAULT_RETRY_LIMIT);
            DEFAULT_RETRY_LIMIT
        }),
        None => DEFAULT_RETRY_LIMIT,
    }
}

fn parse_timezone(value: Option<String>) -> Tz {
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("NOTIFICATIONS_TIMEZONE '{}' is not a known timezone, using {}", raw, DEFAULT_TIMEZONE);
            DEFAULT_TIMEZONE
        }),
        None => DEFAULT_TIMEZONE,
    }
}
