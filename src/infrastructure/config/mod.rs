use crate::domain::feed::model::InvalidFeedKey;
use crate::domain::feed::FeedKey;
use crate::domain::refresh::{DEFAULT_FAILURE_THRESHOLD, DEFAULT_RETRY_AFTER_SECONDS};
use serde::Deserialize;
use std::env;

pub const DEFAULT_WPCOM_API_BASE: &str = "https://public-api.wordpress.com/rest/v1.2";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    // WordPress.com API
    pub wpcom_api_base: String,
    pub wpcom_access_token: Option<String>,
    /// Signed-in user performing like actions; 0 means anonymous.
    pub wpcom_user_id: i64,
    pub http_timeout_seconds: u64,
    // Feeds
    pub feeds: Vec<FeedKey>,
    pub page_size: u32,
    pub refresh_max_age_minutes: i64,
    pub poll_interval_seconds: u64,
    pub mailbox_capacity: usize,
    /// Consecutive transport failures before background refreshes pause.
    pub connectivity_failure_threshold: u32,
    pub connectivity_retry_seconds: u64,
    // Cache
    pub cache_backend: CacheBackend,
    pub memory_cache_capacity: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Sqlite,
    Memory,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let environment = match env::var("ENVIRONMENT").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };
        // Production logs are JSON unless asked otherwise.
        let log_format = match (env::var("LOG_FORMAT").as_deref(), &environment) {
            (Ok("json"), _) => LogFormat::Json,
            (Ok("pretty"), _) => LogFormat::Pretty,
            (_, Environment::Production) => LogFormat::Json,
            (_, Environment::Development) => LogFormat::Pretty,
        };

        let config = Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://feedsync.db".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            environment,
            log_format,
            wpcom_api_base: env::var("WPCOM_API_BASE")
                .unwrap_or_else(|_| DEFAULT_WPCOM_API_BASE.to_string()),
            wpcom_access_token: env::var("WPCOM_ACCESS_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            wpcom_user_id: env::var("WPCOM_USER_ID")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,
            http_timeout_seconds: env::var("HTTP_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            feeds: parse_feed_keys(
                &env::var("FEEDS").unwrap_or_else(|_| "discover,followed".to_string()),
            )?,
            page_size: env::var("PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
            refresh_max_age_minutes: env::var("REFRESH_MAX_AGE_MINUTES")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            poll_interval_seconds: env::var("POLL_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            mailbox_capacity: env::var("MAILBOX_CAPACITY")
                .unwrap_or_else(|_| "64".to_string())
                .parse()?,
            connectivity_failure_threshold: env::var("CONNECTIVITY_FAILURE_THRESHOLD")
                .unwrap_or_else(|_| DEFAULT_FAILURE_THRESHOLD.to_string())
                .parse()?,
            connectivity_retry_seconds: env::var("CONNECTIVITY_RETRY_SECONDS")
                .unwrap_or_else(|_| DEFAULT_RETRY_AFTER_SECONDS.to_string())
                .parse()?,
            cache_backend: match env::var("CACHE_BACKEND").as_deref() {
                Ok("memory") => CacheBackend::Memory,
                _ => CacheBackend::Sqlite,
            },
            memory_cache_capacity: env::var("MEMORY_CACHE_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()?,
        };

        Ok(config)
    }
}

/// Parses a comma separated list such as `discover,tag:rust,site:42`.
/// Duplicates are dropped, keeping the first occurrence.
pub fn parse_feed_keys(raw: &str) -> Result<Vec<FeedKey>, InvalidFeedKey> {
    let mut keys: Vec<FeedKey> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let key: FeedKey = part.parse()?;
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}
