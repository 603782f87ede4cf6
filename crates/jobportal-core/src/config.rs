//! Application configuration management.
//!
//! Configuration is read from `~/.config/jobportal/config.json` when the
//! file exists, then overridden by environment variables. Loading a `.env`
//! file into the environment is left to the binary:
//!
//! - `JOBPORTAL_API_URL`: backend base URL
//! - `JOBPORTAL_SESSION_SECRET`: HMAC key for the session cookie
//! - `JOBPORTAL_ENV`: `production` turns on `Secure` cookies
//! - `JOBPORTAL_REQUEST_TIMEOUT_SECS`: HTTP client timeout

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for the config directory path
const APP_NAME: &str = "jobportal";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when nothing is configured (local development server).
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Signing key used when no secret is configured.
/// Development only; production deployments must override it.
pub const DEV_SESSION_SECRET: &str = "jobportal-dev-secret-change-me";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ENV_API_URL: &str = "JOBPORTAL_API_URL";
const ENV_SESSION_SECRET: &str = "JOBPORTAL_SESSION_SECRET";
const ENV_ENVIRONMENT: &str = "JOBPORTAL_ENV";
const ENV_REQUEST_TIMEOUT: &str = "JOBPORTAL_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub session_secret: Option<String>,
    #[serde(default)]
    pub environment: Environment,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                serde_json::from_str(&contents).context("Failed to parse config file")?
            }
            _ => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_url = Some(url);
        }
        if let Some(secret) = lookup(ENV_SESSION_SECRET) {
            self.session_secret = Some(secret);
        }
        if let Some(env) = lookup(ENV_ENVIRONMENT) {
            self.environment = Environment::parse(&env);
        }
        if let Some(timeout) = lookup(ENV_REQUEST_TIMEOUT) {
            let secs = timeout
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a number of seconds", ENV_REQUEST_TIMEOUT))?;
            self.request_timeout_secs = Some(secs);
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// Session signing key, falling back to the development secret.
    pub fn session_secret(&self) -> &str {
        match self.session_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                if self.is_production() {
                    warn!("No session secret configured in production, using development fallback");
                }
                DEV_SESSION_SECRET
            }
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}
