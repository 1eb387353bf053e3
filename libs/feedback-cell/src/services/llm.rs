use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use shared_config::AppConfig;

const LLM_TIMEOUT: Duration = Duration::from_secs(45);
const LLM_MAX_RETRIES: u32 = 2;
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible chat client used for call analysis and prompt work.
/// Transient failures (timeouts, 5xx) retry with exponential backoff;
/// client errors and parse failures degrade to None so callers fall back
/// to deterministic scoring.
pub struct LlmClient {
    http: Client,
    api_base: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(LLM_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: config.openai_api_base.clone(),
            api_key: config.openai_api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// One JSON-mode completion. Returns the parsed object, or None when
    /// the model is unreachable or returned something unparseable.
    pub async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> Option<Value> {
        let content = self.chat(system_prompt, user_prompt).await?;
        match serde_json::from_str::<Value>(strip_code_fences(&content)) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("chat_json: failed to parse model output as JSON: {}", e);
                None
            }
        }
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Option<String> {
        if !self.is_configured() {
            info!("llm: no API key configured, skipping analysis");
            return None;
        }

        let body = json!({
            "model": DEFAULT_MODEL,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": 0.2,
            "max_tokens": 1500,
            "response_format": {"type": "json_object"},
        });

        let url = format!("{}/v1/chat/completions", self.api_base);
        let mut last_error = String::new();

        for attempt in 0..=LLM_MAX_RETRIES {
            let response = self.http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_client_error() {
                        // 4xx is not retryable
                        warn!("llm: model API returned {}", status);
                        return None;
                    }
                    if status.is_success() {
                        match resp.json::<Value>().await {
                            Ok(data) => {
                                let content = data
                                    .pointer("/choices/0/message/content")
                                    .and_then(|v| v.as_str())
                                    .map(|s| s.to_string());
                                if content.is_some() {
                                    return content;
                                }
                                last_error = "response missing message content".to_string();
                            }
                            Err(e) => {
                                last_error = format!("invalid response body: {}", e);
                            }
                        }
                    } else {
                        last_error = format!("model API returned {}", status);
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < LLM_MAX_RETRIES {
                let delay = Duration::from_secs(2u64.pow(attempt));
                info!(
                    "llm: call attempt {} failed ({}), retrying in {:?}",
                    attempt + 1, last_error, delay,
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!("llm: call failed after {} attempts: {}", LLM_MAX_RETRIES + 1, last_error);
        None
    }
}

/// Models sometimes wrap JSON in triple-backtick fences despite JSON mode.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(without_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line
    let inner = match without_open.find('\n') {
        Some(newline) => &without_open[newline + 1..],
        None => without_open,
    };
    inner.strip_suffix("```").map(str::trim).unwrap_or(inner.trim())
}

#[cfg(test)]
mod tests {
    use super::strip_code_fences;

    #[test]
    fn passes_plain_json_through() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn strips_plain_fences() {
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn strips_language_tagged_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }
}
