//! `browse_web` builtin: fetch a URL's content over HTTP GET.
//!
//! Client construction, scheme validation, and response-size truncation
//! follow the usual shape for a GET-only fetch tool. Arbitrary-method
//! requests and search-engine scraping aren't in the builtin tool-naming
//! table, so this module keeps only the single `browse_web` action with no
//! policy gating threaded through it — `browse_web` is a safe,
//! auto-executing action.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::redirect::Policy;
use serde_json::{Value, json};

use super::traits::{Tool, ToolResult};

const MAX_RESPONSE_SIZE: usize = 1024 * 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 120;

pub struct BrowseWebTool {
    client: reqwest::Client,
}

impl Default for BrowseWebTool {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowseWebTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .redirect(Policy::limited(5))
            .user_agent("SafeClaw/1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    fn validate_url(&self, url: &str) -> Result<Url, String> {
        let parsed = Url::parse(url).map_err(|e| format!("invalid URL: {e}"))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(format!(
                "unsupported URL scheme: {scheme}. Only http and https are allowed."
            )),
        }
    }
}

#[async_trait]
impl Tool for BrowseWebTool {
    fn name(&self) -> &str {
        "browse_web"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL using HTTP GET. Returns the response body as text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "The URL to fetch (must be http or https)." },
                "timeout_seconds": {
                    "type": "integer",
                    "description": "Optional timeout in seconds (default: 30, max: 120).",
                    "minimum": 1,
                    "maximum": 120
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'url'")?;

        let parsed_url = self.validate_url(url)?;

        let timeout_secs = args
            .get("timeout_seconds")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        let response = self
            .client
            .get(parsed_url.as_str())
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        let status_code = status.as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {e}"))?;

        let original_len = body.len();
        let (body_text, truncated) = if original_len > MAX_RESPONSE_SIZE {
            (body[..MAX_RESPONSE_SIZE].to_string(), true)
        } else {
            (body, false)
        };

        let mut output = format!("HTTP {status_code} {status}\nContent-Type: {content_type}\n");
        if truncated {
            output.push_str(&format!(
                "Note: response truncated to {MAX_RESPONSE_SIZE} bytes (original: {original_len} bytes)\n"
            ));
        }
        output.push('\n');
        output.push_str(&body_text);

        let metadata = json!({
            "status_code": status_code,
            "content_type": content_type,
            "response_size": body_text.len(),
            "truncated": truncated,
        });

        if status.is_success() {
            Ok(ToolResult::ok(output).with_metadata(metadata))
        } else {
            Ok(ToolResult::err(output).with_metadata(metadata))
        }
    }
}
