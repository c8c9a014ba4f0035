use std::time::Duration;

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.0-flash", "gemini-1.5-flash"];
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STATIC_DIR: &str = "public";

/// Process-wide settings, read once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` keeps the server up; generation requests then fail with 500.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Fallback order. The first entry is tried first.
    pub models: Vec<String>,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub bind_addr: String,
    pub static_dir: String,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let models = match get("GEMINI_MODELS") {
            Some(raw) => parse_model_list(&raw),
            None => DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        };
        if models.is_empty() {
            return Err(anyhow!("GEMINI_MODELS must name at least one model"));
        }

        let max_attempts = match get("GEMINI_MAX_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("invalid GEMINI_MAX_ATTEMPTS: {raw}"))?,
            None => DEFAULT_MAX_ATTEMPTS,
        };
        if max_attempts == 0 {
            return Err(anyhow!("GEMINI_MAX_ATTEMPTS must be at least 1"));
        }

        let retry_delay_ms = match get("GEMINI_RETRY_DELAY_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid GEMINI_RETRY_DELAY_MS: {raw}"))?,
            None => DEFAULT_RETRY_DELAY_MS,
        };

        let timeout_secs = match get("GEMINI_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid GEMINI_TIMEOUT_SECS: {raw}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key: get("GEMINI_API_KEY"),
            base_url: get("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            models,
            max_attempts,
            retry_delay: Duration::from_millis(retry_delay_ms),
            request_timeout: Duration::from_secs(timeout_secs),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            static_dir: get("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
        })
    }
}

fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}
