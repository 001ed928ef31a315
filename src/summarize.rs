//! Bedrock summarization adapter.
//!
//! Calls the Bedrock runtime `InvokeModel` REST endpoint directly with SigV4
//! signing — no AWS SDK. Summarization is on the critical path: failures are
//! propagated (the HTTP layer surfaces them as 5xx), unlike the diagram
//! stages which degrade silently.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (throttled) and 5xx → retry with exponential backoff
//! - HTTP 4xx (not 429) → fail immediately
//! - Network errors → retry
//! - At most `summarizer.max_attempts` attempts (default 3)
//!
//! Timeouts are asymmetric: connecting is bounded at 60s, reading at 600s —
//! long documents render slowly. A read timeout is reported distinctly so
//! operators can tell "model too slow" from "request failed."

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::sigv4::{self, AwsCredentials};

/// Kind of summary to request, selecting the prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryType {
    /// Structured, component-and-dataflow oriented; feeds diagram generation.
    Architecture,
    General,
    Detailed,
}

impl SummaryType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "architecture" => Ok(SummaryType::Architecture),
            "general" => Ok(SummaryType::General),
            "detailed" => Ok(SummaryType::Detailed),
            other => bail!(
                "Unknown summary type: '{}'. Must be architecture, general, or detailed.",
                other
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryType::Architecture => "architecture",
            SummaryType::General => "general",
            SummaryType::Detailed => "detailed",
        }
    }
}

/// Token usage reported by the model, passed through from the response body.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Summary text plus provenance.
#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub summary: String,
    pub model_id: String,
    pub summary_type: SummaryType,
    pub input_length: usize,
    pub summary_length: usize,
    pub usage: TokenUsage,
}

const ARCHITECTURE_PROMPT: &str = "You are an expert system architect. Analyze the following document and create a comprehensive summary focused on architecture and technical components that would be useful for generating an architecture diagram.

Please extract and summarize:
1. **System Overview**: Main purpose, use case, and high-level architecture
2. **Core Components**: Key services, applications, databases, APIs, and infrastructure components
3. **Data Flow**: How data moves through the system, including inputs, processing steps, and outputs
4. **Technology Stack**: Cloud services, frameworks, tools, and technologies used
5. **Integration Points**: External systems, APIs, and third-party services
6. **Deployment Architecture**: Deployment strategies, environments, and infrastructure patterns
7. **Key Workflows**: Main processes, pipelines, and automated workflows
8. **Storage & Databases**: Data storage solutions, databases, and data management
9. **Monitoring & Observability**: Logging, monitoring, and alerting components
10. **Security & Access**: Authentication, authorization, and security mechanisms

Format the summary in a clear, structured way that would help someone create an accurate architecture diagram. Focus on technical components, their relationships, and data flows.

Document content:
{text}

Please provide a comprehensive architecture-focused summary:";

const GENERAL_PROMPT: &str = "Please provide a comprehensive summary of the following document. Focus on key points, main topics, and important information.

Document content:
{text}

Summary:";

const DETAILED_PROMPT: &str = "Please provide a detailed summary of the following document. Include all important sections, key points, technical details, and relevant information.

Document content:
{text}

Detailed Summary:";

/// Assemble the prompt for a summary type, truncating oversized input.
fn build_prompt(text: &str, summary_type: SummaryType, max_input_chars: usize) -> String {
    let text = if text.len() > max_input_chars {
        eprintln!(
            "Warning: input is very long ({} chars), truncating to {} for summarization",
            text.len(),
            max_input_chars
        );
        // Truncate on a char boundary.
        let mut end = max_input_chars;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    } else {
        text
    };

    let template = match summary_type {
        SummaryType::Architecture => ARCHITECTURE_PROMPT,
        SummaryType::General => GENERAL_PROMPT,
        SummaryType::Detailed => DETAILED_PROMPT,
    };
    template.replace("{text}", text)
}

/// Summarize text with a Bedrock model.
///
/// Returns the summary plus provenance (model id, lengths, token usage).
///
/// # Errors
///
/// Returns an error if credentials are missing, the API returns a
/// non-retryable error, or all attempts are exhausted.
pub async fn summarize(
    config: &SummarizerConfig,
    text: &str,
    summary_type: SummaryType,
) -> Result<SummaryResult> {
    let creds = AwsCredentials::from_env()?;
    let prompt = build_prompt(text, summary_type, config.max_input_chars);

    let body = serde_json::json!({
        "anthropic_version": "bedrock-2023-05-31",
        "max_tokens": 4096,
        "messages": [
            { "role": "user", "content": prompt }
        ]
    });
    let body_bytes = serde_json::to_vec(&body)?;

    let host = format!("bedrock-runtime.{}.amazonaws.com", config.region);
    let canonical_uri = format!("/model/{}/invoke", sigv4::uri_encode(&config.model_id));
    let url = format!("https://{}{}", host, canonical_uri);

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.read_timeout_secs))
        .build()?;

    let mut last_err = None;

    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        // Signed fresh per attempt: the signature embeds the request time.
        let signed = sigv4::sign_request(
            &creds,
            "POST",
            &host,
            &canonical_uri,
            "",
            &config.region,
            "bedrock",
            &body_bytes,
        );

        let mut req = client
            .post(&url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .header("Content-Type", "application/json")
            .body(body_bytes.clone());
        if let Some(ref token) = signed.session_token {
            req = req.header("x-amz-security-token", token);
        }

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_invoke_response(&json, config, summary_type, text.len());
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "Bedrock error {}: {}",
                        status,
                        body_text.chars().take(500).collect::<String>()
                    ));
                    continue;
                }

                // Client error (not 429) — don't retry.
                let body_text = response.text().await.unwrap_or_default();
                bail!(
                    "Bedrock error {} for model '{}': {}",
                    status,
                    config.model_id,
                    body_text.chars().take(500).collect::<String>()
                );
            }
            Err(e) => {
                if e.is_timeout() {
                    eprintln!(
                        "Bedrock read timeout after {}s (model too slow), attempt {}/{}",
                        config.read_timeout_secs,
                        attempt + 1,
                        config.max_attempts
                    );
                    last_err = Some(anyhow::anyhow!(
                        "Bedrock request timed out after {}s",
                        config.read_timeout_secs
                    ));
                } else {
                    last_err = Some(e.into());
                }
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Summarization failed after retries")))
}

/// Parse the `InvokeModel` response body: concatenate text content blocks
/// and pass token usage through.
fn parse_invoke_response(
    json: &serde_json::Value,
    config: &SummarizerConfig,
    summary_type: SummaryType,
    input_length: usize,
) -> Result<SummaryResult> {
    let mut summary = String::new();
    if let Some(blocks) = json.get("content").and_then(|c| c.as_array()) {
        for block in blocks {
            if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                summary.push_str(block.get("text").and_then(|t| t.as_str()).unwrap_or(""));
            }
        }
    }

    if summary.is_empty() {
        bail!("Bedrock response contained no text content");
    }

    let usage = TokenUsage {
        input_tokens: json
            .pointer("/usage/input_tokens")
            .and_then(|v| v.as_u64()),
        output_tokens: json
            .pointer("/usage/output_tokens")
            .and_then(|v| v.as_u64()),
    };

    let summary_length = summary.len();
    Ok(SummaryResult {
        summary,
        model_id: config.model_id.clone(),
        summary_type,
        input_length,
        summary_length,
        usage,
    })
}
