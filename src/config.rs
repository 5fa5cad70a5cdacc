use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::info;

/// Runtime settings, resolved from the environment (a `.env` file is loaded
/// by the binary before this runs).
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub headless: bool,
    pub element_timeout: Duration,
    pub screenshot_dir: PathBuf,
    pub auto_retry: bool,
    pub max_retries: u32,
    pub log_dir: PathBuf,
    pub save_logs: bool,
    pub report_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| anyhow!("OPENROUTER_API_KEY not set in environment"))?;

        Ok(Self {
            api_key,
            model: env_or("OPENROUTER_MODEL", "openai/gpt-4-turbo"),
            headless: env_bool("HEADLESS", false),
            element_timeout: Duration::from_secs(env_u64("ELEMENT_TIMEOUT_SECS", 10)),
            screenshot_dir: env_or("SCREENSHOT_DIR", "./screenshots").into(),
            auto_retry: env_bool("AUTO_RETRY", true),
            max_retries: env_u64("MAX_RETRIES", 2) as u32,
            log_dir: env_or("LOG_DIR", "./logs").into(),
            save_logs: env_bool("SAVE_LOGS", true),
            report_dir: env_or("REPORT_DIR", "./reports").into(),
        })
    }

    /// Report directory alone. Report regeneration from a saved log needs no
    /// API key, so it must not go through `from_env`.
    pub fn report_dir_from_env() -> PathBuf {
        env_or("REPORT_DIR", "./reports").into()
    }

    pub fn log_settings(&self) {
        info!(
            model = %self.model,
            headless = self.headless,
            element_timeout_secs = self.element_timeout.as_secs(),
            auto_retry = self.auto_retry,
            max_retries = self.max_retries,
            screenshot_dir = %self.screenshot_dir.display(),
            log_dir = %self.log_dir.display(),
            report_dir = %self.report_dir.display(),
            "configuration"
        );
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => parse_bool(&raw),
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_is_case_insensitive_and_strict() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" True "));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool("1"));
        assert!(!parse_bool(""));
    }
}
