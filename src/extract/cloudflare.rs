//! Cloudflare Workers AI extraction provider.
//!
//! Implements the `BetExtractor` trait against the Workers AI REST API
//! (`/accounts/{account}/ai/run/{model}`), bearer-token auth. The
//! response envelope carries `success`, `result.response`, and an
//! `errors` array; normalization is specific to this shape.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{build_prompt, strip_code_fence, truncate_detail, BetExtractor, ExtractionFailure};

const API_BASE: &str = "https://api.cloudflare.com/client/v4/accounts";
const DEFAULT_MODEL: &str = "@cf/meta/llama-3.1-8b-instruct";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    messages: Vec<RunMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RunMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunResult {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CloudflareClient {
    http: Client,
    account_id: String,
    api_token: SecretString,
    model: String,
    prompt_template: String,
    timeout_secs: u64,
}

impl CloudflareClient {
    pub fn new(
        account_id: String,
        api_token: SecretString,
        model: Option<String>,
        prompt_template: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build Cloudflare HTTP client")?;

        Ok(Self {
            http,
            account_id,
            api_token,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            prompt_template,
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{API_BASE}/{}/ai/run/{}", self.account_id, self.model)
    }

    /// Normalize a Workers AI response body into the textual payload.
    fn normalize(body: &str) -> Result<String, ExtractionFailure> {
        let parsed: RunResponse =
            serde_json::from_str(body).map_err(|e| ExtractionFailure::MalformedResponse {
                detail: format!("invalid JSON envelope: {e}"),
            })?;

        if !parsed.success {
            let detail = parsed
                .errors
                .first()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .unwrap_or_else(|| "provider reported failure".to_string());
            return Err(ExtractionFailure::Provider { status: 200, detail });
        }

        let text = parsed
            .result
            .and_then(|r| r.response)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ExtractionFailure::MalformedResponse {
                detail: "response payload missing".to_string(),
            })?;

        Ok(strip_code_fence(&text).to_string())
    }
}

#[async_trait]
impl BetExtractor for CloudflareClient {
    async fn extract(&self, raw_text: &str) -> Result<String, ExtractionFailure> {
        let prompt = build_prompt(&self.prompt_template, raw_text);
        let request = RunRequest {
            messages: vec![RunMessage {
                role: "user",
                content: &prompt,
            }],
        };

        debug!(model = %self.model, "Requesting Cloudflare extraction");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_token.expose_secret())
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
        "cloudflare"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CloudflareClient {
        CloudflareClient::new(
            "acct-123".into(),
            SecretString::new("token".into()),
            None,
            "Extract: {{text}}".into(),
            40,
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_includes_account_and_model() {
        let c = client();
        assert_eq!(
            c.endpoint(),
            format!("{API_BASE}/acct-123/ai/run/{DEFAULT_MODEL}"),
        );
        assert_eq!(c.name(), "cloudflare");
    }

    #[test]
    fn test_normalize_success() {
        let body = r#"{"success":true,"result":{"response":"{\"issue_number\":\"1\"}"},"errors":[]}"#;
        let text = CloudflareClient::normalize(body).unwrap();
        assert_eq!(text, r#"{"issue_number":"1"}"#);
    }

    #[test]
    fn test_normalize_strips_fence() {
        let body = r#"{"success":true,"result":{"response":"```json\n{\"a\":1}\n```"}}"#;
        assert_eq!(CloudflareClient::normalize(body).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_normalize_reported_failure() {
        let body = r#"{"success":false,"errors":[{"code":10000,"message":"Authentication error"}]}"#;
        let err = CloudflareClient::normalize(body).unwrap_err();
        assert!(matches!(
            err,
            ExtractionFailure::Provider { ref detail, .. }
                if detail.contains("Authentication error")
        ));
    }

    #[test]
    fn test_normalize_missing_payload() {
        for body in [
            r#"{"success":true}"#,
            r#"{"success":true,"result":{}}"#,
            r#"{"success":true,"result":{"response":"  "}}"#,
        ] {
            let err = CloudflareClient::normalize(body).unwrap_err();
            assert!(
                matches!(err, ExtractionFailure::MalformedResponse { .. }),
                "expected malformed for {body}",
            );
        }
    }

    #[test]
    fn test_normalize_invalid_json() {
        let err = CloudflareClient::normalize("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ExtractionFailure::MalformedResponse { .. }));
    }

    #[test]
    fn test_custom_model() {
        let c = CloudflareClient::new(
            "acct".into(),
            SecretString::new("t".into()),
            Some("@cf/qwen/qwen1.5-14b-chat-awq".into()),
            String::new(),
            40,
        )
        .unwrap();
        assert!(c.endpoint().ends_with("qwen1.5-14b-chat-awq"));
    }
}
