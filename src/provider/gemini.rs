//! HTTP client for the Gemini `generateContent` endpoint.
//! One request per call, no retries at this layer.
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::GenerationClient;
use crate::errors::ProviderError;

pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_base: &str, model: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ProviderError> {
        let body = json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("gemini request failed: {}", e);
                ProviderError::new(e.to_string())
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("failed to read gemini response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderError::with_status(
                status.as_u16(),
                error_message(&text),
            ));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::new(format!("gemini returned a non-JSON body: {}", e)))?;

        reply_text(&json)
    }
}

/// `error.message` from a Gemini error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|j| {
            j.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Concatenated `candidates[0].content.parts[*].text`.
fn reply_text(json: &Value) -> Result<String, ProviderError> {
    let candidate = json.get("candidates").and_then(|c| c.get(0));

    let text: String = candidate
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .and_then(|c| c.get("finishReason"))
            .and_then(|f| f.as_str())
            .or_else(|| {
                json.get("promptFeedback")
                    .and_then(|f| f.get("blockReason"))
                    .and_then(|r| r.as_str())
            })
            .unwrap_or("unknown");
        return Err(ProviderError::new(format!(
            "gemini returned no text (finish reason: {})",
            reason
        )));
    }

    Ok(text)
}
