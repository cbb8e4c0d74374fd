//! AI tool executor abstraction and the HTTP implementation.
//!
//! Every AI tool is one HTTP endpoint: the factory maps an [`AiTool`]
//! record to an executor purely by copying its id and endpoint URL, with no
//! per-tool-type branching. The wire contract:
//!
//! - Request: `POST {"content": <string>, "images": <string[] base64>}`
//! - Response (2xx): `{"result": <string>}`
//!
//! Any non-2xx status, network failure, or body without a string `result`
//! field is an [`HarnessError::ApiConfiguration`] wrapping the cause. The
//! request deadline is the only timeout in a run; there is no retry and no
//! delivery guarantee beyond at-most-once per file.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::collect::ExtractedImage;
use crate::config::AiConfig;
use crate::error::HarnessError;
use crate::models::AiTool;

/// Summarizes one file's content via an external AI endpoint.
#[async_trait]
pub trait ToolExecutor: Send + Sync + std::fmt::Debug {
    /// Id of the [`AiTool`] this executor was built from.
    fn tool_id(&self) -> &str;

    async fn execute(
        &self,
        text: &str,
        images: &[ExtractedImage],
    ) -> Result<String, HarnessError>;
}

/// The one concrete executor shape: JSON POST to `endpoint_url`.
#[derive(Debug)]
pub struct HttpToolExecutor {
    tool_id: String,
    endpoint_url: String,
    timeout: Duration,
}

impl HttpToolExecutor {
    pub fn new(tool_id: String, endpoint_url: String, timeout: Duration) -> Self {
        Self {
            tool_id,
            endpoint_url,
            timeout,
        }
    }

    fn api_err(&self, reason: String) -> HarnessError {
        HarnessError::ApiConfiguration {
            tool: self.tool_id.clone(),
            reason,
        }
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    fn tool_id(&self) -> &str {
        &self.tool_id
    }

    async fn execute(
        &self,
        text: &str,
        images: &[ExtractedImage],
    ) -> Result<String, HarnessError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| self.api_err(e.to_string()))?;

        let body = serde_json::json!({
            "content": text,
            "images": images
                .iter()
                .map(|img| BASE64.encode(&img.data))
                .collect::<Vec<_>>(),
        });

        let response = client
            .post(&self.endpoint_url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.api_err(format!("request to {} failed: {}", self.endpoint_url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(self.api_err(format!("endpoint returned {}: {}", status, body_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.api_err(format!("invalid response body: {}", e)))?;

        json.get("result")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| self.api_err("response missing string \"result\" field".to_string()))
    }
}

/// Builds the executor for a tool record. Fails when the tool has no
/// endpoint URL configured (run-fatal at setup time, per-file otherwise).
pub fn create_executor(
    tool: &AiTool,
    config: &AiConfig,
) -> Result<Box<dyn ToolExecutor>, HarnessError> {
    let endpoint_url = tool
        .endpoint_url
        .clone()
        .ok_or_else(|| HarnessError::ApiConfiguration {
            tool: tool.id.clone(),
            reason: "endpoint_url is not configured".to_string(),
        })?;
    Ok(Box::new(HttpToolExecutor::new(
        tool.id.clone(),
        endpoint_url,
        Duration::from_secs(config.timeout_secs),
    )))
}
