//! Extraction provider integrations.
//!
//! Defines the `BetExtractor` trait and provides implementations for
//! Cloudflare Workers AI and Google Gemini. Providers are
//! interchangeable: the runner talks to the trait and fails over from
//! the primary to the fallback on any `ExtractionFailure`.

pub mod cloudflare;
pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

/// Why an extraction attempt failed. Always a value — provider clients
/// never panic or leak transport errors past this boundary.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    #[error("network error: {detail}")]
    Network { detail: String },
    #[error("provider error (HTTP {status}): {detail}")]
    Provider { status: u16, detail: String },
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("malformed provider response: {detail}")]
    MalformedResponse { detail: String },
}

impl ExtractionFailure {
    /// Classify a transport-level reqwest error.
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ExtractionFailure::Timeout {
                seconds: timeout_secs,
            }
        } else {
            ExtractionFailure::Network {
                detail: err.to_string(),
            }
        }
    }
}

/// Abstraction over text-extraction providers.
///
/// Implementors send the prompt-wrapped notification text to an AI
/// service and return its textual payload. Schema validation of that
/// payload is the caller's concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BetExtractor: Send + Sync {
    /// Extract structured wager text from a raw notification body.
    async fn extract(&self, raw_text: &str) -> Result<String, ExtractionFailure>;

    /// Provider name for logging and failover reporting.
    fn name(&self) -> &str;
}

/// Substitute the raw notification text into the prompt template.
/// The template marks the insertion point with `{{text}}`; a template
/// without the marker gets the text appended.
pub fn build_prompt(template: &str, raw_text: &str) -> String {
    if template.contains("{{text}}") {
        template.replace("{{text}}", raw_text)
    } else {
        format!("{template}\n\n{raw_text}")
    }
}

/// Strip a surrounding markdown code fence from a model payload.
/// Models frequently wrap their JSON in ```json fences despite being
/// told not to.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Bound error details carried into settlement rows and logs.
pub(crate) fn truncate_detail(s: &str) -> String {
    const MAX: usize = 300;
    if s.len() <= MAX {
        return s.trim().to_string();
    }
    let mut end = MAX;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &s[..end].trim())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
