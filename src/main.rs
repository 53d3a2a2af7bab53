//! TALLY — Autonomous Lottery Wager Settlement Pipeline
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the rule table, extraction providers, store, and settlement
//! engine, then executes exactly one batch run. Intended to be invoked
//! periodically by an external scheduler; exits 0 on any completed run
//! (including lock contention), non-zero only on startup failure.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use tally::config::{AppConfig, ExtractionConfig};
use tally::extract::cloudflare::CloudflareClient;
use tally::extract::gemini::GeminiClient;
use tally::extract::BetExtractor;
use tally::runner::{JobRunner, RunOutcome};
use tally::rules::RuleTable;
use tally::settle::SettlementEngine;
use tally::store::Store;

const BANNER: &str = r#"
 _____  _    _     _  __   __
|_   _|/ \  | |   | | \ \ / /
  | | / _ \ | |   | |  \ V /
  | |/ ___ \| |___| |___| |
  |_/_/   \_\_____|_____|_|

  Lottery Wager Settlement Pipeline
  v0.1.0 — Batch Runner
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        provider = %cfg.extraction.provider,
        fallback = ?cfg.extraction.fallback_provider,
        batch_size = cfg.runner.batch_size,
        "TALLY starting up"
    );

    // -- Systemic preconditions: fail the run before claiming anything ---

    let prompt_template = std::fs::read_to_string(&cfg.extraction.prompt_path)
        .with_context(|| format!("Failed to read prompt template: {}", cfg.extraction.prompt_path))?;

    let store = Store::connect(&cfg.store.database_url).await?;

    // -- Wire components --------------------------------------------------

    let engine = SettlementEngine::new(RuleTable::new(), cfg.payouts.to_table()?);

    let primary = build_extractor(&cfg.extraction.provider, &cfg.extraction, &prompt_template)?;
    let fallback = cfg
        .extraction
        .fallback_provider
        .as_deref()
        .map(|name| build_extractor(name, &cfg.extraction, &prompt_template))
        .transpose()?;

    let runner = JobRunner::new(
        store,
        engine,
        primary,
        fallback,
        cfg.runner.batch_size,
        PathBuf::from(&cfg.runner.lock_path),
    );

    // -- Run one batch -----------------------------------------------------

    match runner.run().await? {
        RunOutcome::Completed(report) => {
            info!(%report, "TALLY run complete");
        }
        RunOutcome::LockHeld => {
            info!("TALLY exiting: another runner holds the lock");
        }
    }

    Ok(())
}

/// Construct a provider client by explicit identity.
fn build_extractor(
    name: &str,
    cfg: &ExtractionConfig,
    prompt_template: &str,
) -> Result<Box<dyn BetExtractor>> {
    match name {
        "cloudflare" => {
            let cf = cfg
                .cloudflare
                .as_ref()
                .context("[extraction.cloudflare] section missing")?;
            let token = AppConfig::resolve_env(&cf.api_token_env)?;
            Ok(Box::new(CloudflareClient::new(
                cf.account_id.clone(),
                token,
                cf.model.clone(),
                prompt_template.to_string(),
                cfg.timeout_secs,
            )?))
        }
        "gemini" => {
            let gm = cfg
                .gemini
                .as_ref()
                .context("[extraction.gemini] section missing")?;
            let key = AppConfig::resolve_env(&gm.api_key_env)?;
            Ok(Box::new(GeminiClient::new(
                key,
                gm.model.clone(),
                prompt_template.to_string(),
                cfg.timeout_secs,
            )?))
        }
        other => anyhow::bail!("Unknown extraction provider: {other}"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tally=info"));

    let json_logging = std::env::var("TALLY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
