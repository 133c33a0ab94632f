use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Endpoints and secrets loaded from environment variables.
/// Tunables (sample sizes, delays, scoring cutoffs) live in the TOML FileConfig.
#[derive(Debug, Clone)]
pub struct Config {
    // Browser
    pub browserless_url: String,
    pub browserless_token: Option<String>,

    // Pre-authenticated session cookie forwarded to the browser.
    pub session_cookie: Option<String>,

    // Optional path to the TOML tunables file.
    pub config_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            browserless_url: required_env("BROWSERLESS_URL")?,
            browserless_token: optional_env("BROWSERLESS_TOKEN"),
            session_cookie: optional_env("FOLLOWCHECK_SESSION_COOKIE"),
            config_path: optional_env("FOLLOWCHECK_CONFIG").map(PathBuf::from),
        })
    }

    pub fn log_redacted(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  BROWSERLESS_URL: {}", self.browserless_url);
        tracing::info!("  BROWSERLESS_TOKEN: {}", preview_opt(&self.browserless_token));
        tracing::info!(
            "  FOLLOWCHECK_SESSION_COOKIE: {}",
            preview_opt(&self.session_cookie)
        );
        tracing::info!(
            "  FOLLOWCHECK_CONFIG: {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<defaults>".to_string())
        );
    }
}

fn required_env(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingEnv(key))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn preview(val: &str) -> String {
    let n = val.chars().count().min(5);
    let head: String = val.chars().take(n).collect();
    format!("{head}...({} chars)", val.len())
}

fn preview_opt(val: &Option<String>) -> String {
    match val {
        Some(v) if !v.is_empty() => preview(v),
        _ => "<not set>".to_string(),
    }
}
