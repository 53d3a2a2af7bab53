//! Google Gemini extraction provider.
//!
//! Implements the `BetExtractor` trait against the `generateContent`
//! endpoint. Auth is a key query parameter rather than a header, and
//! the payload sits under `candidates[].content.parts[].text` — a
//! different envelope from Cloudflare, normalized here and only here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_prompt, strip_code_fence, truncate_detail, BetExtractor, ExtractionFailure};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    http: Client,
    api_key: SecretString,
    model: String,
    prompt_template: String,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(
        api_key: SecretString,
        model: Option<String>,
        prompt_template: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build Gemini HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            prompt_template,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.model,
            urlencoding::encode(self.api_key.expose_secret()),
        )
    }

    /// Normalize a generateContent response body into the textual payload.
    fn normalize(body: &str) -> Result<String, ExtractionFailure> {
        let parsed: GenerateResponse =
            serde_json::from_str(body).map_err(|e| ExtractionFailure::MalformedResponse {
                detail: format!("invalid JSON envelope: {e}"),
            })?;

        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ExtractionFailure::MalformedResponse {
                detail: "no candidate text in response".to_string(),
            });
        }

        Ok(strip_code_fence(&text).to_string())
    }
}

#[async_trait]
impl BetExtractor for GeminiClient {
    async fn extract(&self, raw_text: &str) -> Result<String, ExtractionFailure> {
        let prompt = build_prompt(&self.prompt_template, raw_text);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
        };

        debug!(model = %self.model, "Requesting Gemini extraction");

        let response = self
            .http
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionFailure::from_reqwest(e, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExtractionFailure::from_reqwest(e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(ExtractionFailure::Provider {
                status: status.as_u16(),
                detail: truncate_detail(&body),
            });
        }

        Self::normalize(&body)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::new(
            SecretString::new("key+with/chars".into()),
            None,
            "Extract: {{text}}".into(),
            40,
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_encodes_key() {
        let c = client();
        let endpoint = c.endpoint();
        assert!(endpoint.starts_with(API_BASE));
        assert!(endpoint.contains("gemini-1.5-flash:generateContent"));
        // The raw key must not appear unencoded in the URL.
        assert!(!endpoint.contains("key+with/chars"));
        assert!(endpoint.contains("key%2Bwith%2Fchars"));
        assert_eq!(c.name(), "gemini");
    }

    #[test]
    fn test_normalize_success() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"issue_number\":\"1\"}"}]}}]}"#;
        assert_eq!(
            GeminiClient::normalize(body).unwrap(),
            r#"{"issue_number":"1"}"#,
        );
    }

    #[test]
    fn test_normalize_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        assert_eq!(GeminiClient::normalize(body).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_normalize_strips_fence() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"```json\n{\"a\":1}\n```"}]}}]}"#;
        assert_eq!(GeminiClient::normalize(body).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_normalize_empty_candidates() {
        for body in [
            r#"{"candidates":[]}"#,
            r#"{}"#,
            r#"{"candidates":[{"content":{"parts":[]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#,
        ] {
            let err = GeminiClient::normalize(body).unwrap_err();
            assert!(
                matches!(err, ExtractionFailure::MalformedResponse { .. }),
                "expected malformed for {body}",
            );
        }
    }

    #[test]
    fn test_normalize_invalid_json() {
        let err = GeminiClient::normalize("not json").unwrap_err();
        assert!(matches!(err, ExtractionFailure::MalformedResponse { .. }));
    }
}
