use std::time::Duration;

use anyhow::Context as _;

use crate::config::LlmConfig;
use crate::formats::truncate_chars;

const LLM_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_TOKENS: u32 = 1024;

pub fn chat_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

/// Client for the external reasoning service (any chat-completions
/// compatible deployment). One prompt in, one text completion out.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .context("build llm http client")?;

        Ok(Self {
            client,
            endpoint: chat_endpoint(&config.base_url),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Send one user message and return the completion text. Some
    /// deployments ignore `stream: false` and answer with an SSE stream;
    /// both response shapes are handled.
    pub async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.1,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "stream": false,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read llm response body")?;
        if !status.is_success() {
            let message =
                parse_error_message(&raw).unwrap_or_else(|| truncate_chars(&raw, 200).to_string());
            anyhow::bail!("llm API error ({status}): {message}");
        }

        if raw.trim_start().starts_with("data:") {
            return collect_sse_content(&raw);
        }

        let value: serde_json::Value = serde_json::from_str(&raw).context("parse llm response")?;
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing `choices[0].message.content` in llm response"))?;
        Ok(content.to_owned())
    }
}

fn collect_sse_content(raw: &str) -> anyhow::Result<String> {
    let mut content = String::new();
    for line in raw.lines() {
        let line = line.trim();
        let Some(chunk) = line.strip_prefix("data:") else {
            continue;
        };
        let chunk = chunk.trim();
        if chunk == "[DONE]" {
            break;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(chunk) else {
            continue;
        };
        if let Some(text) = value
            .pointer("/choices/0/delta/content")
            .and_then(|v| v.as_str())
        {
            content.push_str(text);
        }
    }

    if content.is_empty() {
        anyhow::bail!("llm SSE stream contained no content");
    }
    Ok(content)
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    Some(value.get("error")?.get("message")?.as_str()?.to_owned())
}
