//! Outbound connectivity test against an AI provider endpoint.
//!
//! One minimal request per check, classified by HTTP status only. Nothing
//! here touches panel state.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use deck_types::config::ApiFormat;
use deck_types::probe::{ProbeOutcome, ProbeRequest};

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
const BODY_EXCERPT_CHARS: usize = 200;

const ANTHROPIC_BASE: &str = "https://api.anthropic.com";
const OPENAI_BASE: &str = "https://api.openai.com";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";
const ZHIPU_BASE: &str = "https://open.bigmodel.cn";

#[derive(Debug, Clone)]
pub struct ConnectivityProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn check(&self, request: &ProbeRequest) -> ProbeOutcome {
        let key = request.api_key.as_str();
        let base = |default: &str| -> String {
            let base = request.base_url.trim().trim_end_matches('/');
            if base.is_empty() {
                default.to_string()
            } else {
                base.to_string()
            }
        };

        let builder = match &request.api_format {
            ApiFormat::AnthropicMessages => self
                .client
                .post(format!("{}/v1/messages", base(ANTHROPIC_BASE)))
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01")
                .json(&minimal_chat("claude-sonnet-4-5")),
            ApiFormat::OpenaiResponses | ApiFormat::OpenaiChat => self
                .client
                .post(format!("{}/v1/chat/completions", base(OPENAI_BASE)))
                .bearer_auth(key)
                .json(&minimal_chat("gpt-4.1")),
            ApiFormat::Gemini => self
                .client
                .get(format!("{}/v1beta/models", base(GEMINI_BASE)))
                .query(&[("key", key)]),
            ApiFormat::Zhipu => self
                .client
                .post(format!("{}/api/paas/v4/chat/completions", base(ZHIPU_BASE)))
                .bearer_auth(key)
                .json(&minimal_chat("glm-4-flash")),
            ApiFormat::Other(tag) => {
                return ProbeOutcome::UnsupportedFormat {
                    format: tag.clone(),
                }
            }
        };

        debug!(format = %request.api_format, "Probing provider endpoint");
        let response = match builder.timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                info!(format = %request.api_format, "Probe failed: {e}");
                return ProbeOutcome::Network {
                    message: describe(&e, self.timeout),
                };
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let outcome = classify(status, &body);
        info!(format = %request.api_format, status, success = outcome.is_success(), "Probe finished");
        outcome
    }
}

impl Default for ConnectivityProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn minimal_chat(model: &str) -> serde_json::Value {
    json!({
        "model": model,
        "max_tokens": 1,
        "messages": [{ "role": "user", "content": "hi" }],
    })
}

fn describe(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("request timed out after {}s", timeout.as_secs())
    } else {
        err.to_string()
    }
}

/// Map an HTTP status (and body, for the error excerpt) to an outcome.
pub fn classify(status: u16, body: &str) -> ProbeOutcome {
    match status {
        200 | 201 => ProbeOutcome::Reachable,
        400 => ProbeOutcome::ReachableWithCaveat {
            note: "API reachable; key format accepted".to_string(),
        },
        401 | 403 => ProbeOutcome::CredentialRejected { status },
        _ => ProbeOutcome::HttpError {
            status,
            body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
        },
    }
}
