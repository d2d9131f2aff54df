//! Configuration module for the 9Anime resolver
//!
//! Handles loading environment variables and application configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{defaults, mirrors};
use crate::scraper::ScraperConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Site origin every request is made against
    pub base_url: String,
    /// Origins of old links that are rewritten to `base_url`
    pub legacy_origins: Vec<String>,
    /// Script bundle the sandbox loads on wake
    pub sandbox_script_url: String,
    /// Bundle function that signs a VRF input
    pub vrf_entry: String,
    /// Bundle function that returns the player request URL
    pub player_entry: String,
    /// Mirror server ids tried per episode, in priority order
    pub mirrors: Vec<String>,
    pub fetch_timeout: Duration,
    pub interceptor_timeout: Duration,
    pub sandbox_timeout: Duration,
    /// Whether to rotate user agents
    pub rotate_user_agent: bool,
}

impl Default for Config {
    fn default() -> Self {
        let base_url = defaults::BASE_URL.to_string();
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            sandbox_script_url: defaults::script_url(&base_url),
            base_url,
            legacy_origins: vec![defaults::LEGACY_ORIGIN.to_string()],
            vrf_entry: defaults::VRF_ENTRY.to_string(),
            player_entry: defaults::PLAYER_ENTRY.to_string(),
            mirrors: vec![mirrors::VIDSTREAM.to_string()],
            fetch_timeout: Duration::from_secs(30),
            interceptor_timeout: Duration::from_secs(45),
            sandbox_timeout: Duration::from_secs(10),
            rotate_user_agent: true,
        }
    }
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn list_or(name: &str, default: Vec<String>) -> Vec<String> {
    match env::var(name) {
        Ok(raw) => {
            let items = split_list(&raw);
            if items.is_empty() {
                default
            } else {
                items
            }
        }
        Err(_) => default,
    }
}

/// Comma separated list, blanks dropped
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparseable variables fall back to their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        let base_url = env::var("BASE_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: var_or("PORT", defaults.port),
            sandbox_script_url: env::var("SANDBOX_SCRIPT_URL")
                .unwrap_or_else(|_| defaults::script_url(&base_url)),
            base_url,
            legacy_origins: list_or("LEGACY_ORIGINS", defaults.legacy_origins),
            vrf_entry: env::var("VRF_ENTRY").unwrap_or(defaults.vrf_entry),
            player_entry: env::var("PLAYER_ENTRY").unwrap_or(defaults.player_entry),
            mirrors: list_or("MIRRORS", defaults.mirrors),
            fetch_timeout: Duration::from_secs(var_or("FETCH_TIMEOUT_SECS", 30)),
            interceptor_timeout: Duration::from_secs(var_or("INTERCEPTOR_TIMEOUT_SECS", 45)),
            sandbox_timeout: Duration::from_secs(var_or("SANDBOX_TIMEOUT_SECS", 10)),
            rotate_user_agent: var_or("ROTATE_USER_AGENT", defaults.rotate_user_agent),
        }
    }

    pub fn scraper_config(&self) -> ScraperConfig {
        ScraperConfig {
            timeout: self.fetch_timeout,
            rotate_user_agent: self.rotate_user_agent,
            ..ScraperConfig::default()
        }
    }

    /// Rewrite a link on a legacy origin to the configured base
    ///
    /// Only a whole origin matches: `https://9anime.to.example` is left
    /// alone.
    pub fn canonical_url(&self, url: &str) -> String {
        self.legacy_origins
            .iter()
            .filter_map(|origin| url.strip_prefix(origin.trim_end_matches('/')))
            .find(|rest| rest.is_empty() || rest.starts_with(['/', '?', '#']))
            .map(|rest| format!("{}{}", self.base_url, rest))
            .unwrap_or_else(|| url.to_string())
    }
}
