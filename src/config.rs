//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved once at startup; no component reads ambient global state.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;

use crate::settle::PayoutTable;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub runner: RunnerConfig,
    pub extraction: ExtractionConfig,
    pub payouts: PayoutsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Primary provider: "cloudflare" | "gemini".
    pub provider: String,
    /// Optional fallback provider, tried once when the primary fails.
    #[serde(default)]
    pub fallback_provider: Option<String>,
    /// Path to the prompt template file ({{text}} marks the insertion point).
    pub prompt_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub cloudflare: Option<CloudflareConfig>,
    pub gemini: Option<GeminiConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CloudflareConfig {
    pub account_id: String,
    pub api_token_env: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_key_env: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Payout multipliers as configured. Domain data supplied by the
/// operator; multipliers are decimal strings in the TOML.
#[derive(Debug, Deserialize, Clone)]
pub struct PayoutsConfig {
    /// Direct wagers: matched count (as a TOML key) → multiplier.
    pub direct: BTreeMap<String, Decimal>,
    pub color: Decimal,
    pub zodiac: Decimal,
}

impl PayoutsConfig {
    /// Build the settlement engine's payout table, validating the
    /// matched-count keys.
    pub fn to_table(&self) -> Result<PayoutTable> {
        let mut direct = BTreeMap::new();
        for (key, multiplier) in &self.direct {
            let count: u32 = key
                .parse()
                .with_context(|| format!("Invalid matched-count key in [payouts.direct]: {key}"))?;
            direct.insert(count, *multiplier);
        }
        Ok(PayoutTable {
            direct,
            color: self.color,
            zodiac: self.zodiac,
        })
    }
}

fn default_batch_size() -> u32 {
    8
}

fn default_lock_path() -> String {
    "tally.lock".to_string()
}

fn default_timeout_secs() -> u64 {
    40
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    fn parse_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its (secret) value.
    pub fn resolve_env(env_name: &str) -> Result<SecretString> {
        let value = std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))?;
        Ok(SecretString::new(value))
    }
}
