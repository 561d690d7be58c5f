//! Claude adapter for the fit analysis — the only module that talks to
//! the Anthropic Messages API. It renders the CV-vs-JD prompt, calls
//! the model with retry, and decodes the completion into a normalized
//! `AnalysisReport`.

mod prompts;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::report::{self, AnalysisReport, ReportError};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
/// Pinned so every report is produced by the same model.
pub const MODEL: &str = "claude-sonnet-4-5";
/// Fit reports carry per-metric notes and rewrite examples; they need
/// more room than a typical structured completion.
const MAX_TOKENS: u32 = 6000;
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned no text content")]
    EmptyCompletion,

    #[error("completion is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),

    #[error(transparent)]
    BadReport(#[from] ReportError),

    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// 429 and 5xx are worth another attempt; everything else is final.
fn retryable(e: &LlmError) -> bool {
    match e {
        LlmError::Http(_) => true,
        LlmError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Runs the full CV-vs-JD analysis and returns the normalized
    /// report. Inputs are truncated to the prompt budget inside.
    pub async fn analyze_fit(
        &self,
        cv_text: &str,
        jd_text: &str,
    ) -> Result<AnalysisReport, LlmError> {
        let prompt = prompts::fit_prompt(cv_text, jd_text);
        let completion = self.complete(&prompt, prompts::FIT_SYSTEM).await?;
        decode_report(&completion)
    }

    /// One prompt in, the first text block out, with exponential
    /// backoff between attempts.
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                // 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 << (attempt - 1));
                warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying model call");
                tokio::time::sleep(delay).await;
            }

            match self.send(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if retryable(&e) => {
                    warn!(error = %e, "model call failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or(LlmError::Exhausted {
            attempts: MAX_ATTEMPTS,
        }))
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: MessagesResponse = response.json().await?;
        debug!(
            input_tokens = decoded.usage.input_tokens,
            output_tokens = decoded.usage.output_tokens,
            "model call succeeded"
        );
        decoded
            .content
            .iter()
            .find(|b| b.kind == "text")
            .and_then(|b| b.text.clone())
            .ok_or(LlmError::EmptyCompletion)
    }
}

/// Decodes a completion into a report: strips any markdown fence the
/// model wrapped the JSON in, parses, and normalizes the scores.
fn decode_report(completion: &str) -> Result<AnalysisReport, LlmError> {
    let payload = strip_fences(completion);
    let value: Value = serde_json::from_str(payload)?;
    Ok(report::from_value(value)?)
}

fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let body = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    body.strip_suffix("```").unwrap_or(body).trim()
}
