//! LLM completion client.
//!
//! A thin OpenAI-compatible chat client over the runtime's HTTP stack,
//! with provider selection by available API key and a deterministic stub
//! mode (`GHOSTPOST_LLM_STUB`) so tests never touch the network.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

/// LLM completion error.
#[derive(Debug)]
pub enum LlmError {
    /// HTTP transport error.
    Http(String),
    /// Non-200 status code.
    StatusError { status: u16, body: String },
    /// Response parsing error.
    ParseError(String),
    /// No API key available for the selected provider.
    NoApiKey(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::StatusError { status, body } => {
                write!(f, "LLM returned status {status}: {body}")
            }
            Self::ParseError(e) => write!(f, "parse error: {e}"),
            Self::NoApiKey(model) => write!(f, "no API key for model: {model}"),
        }
    }
}

impl std::error::Error for LlmError {}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Process-wide stub override, in addition to `GHOSTPOST_LLM_STUB`.
static STUB_OVERRIDE: AtomicBool = AtomicBool::new(false);

/// Force the deterministic stub regardless of the environment. Used by
/// tests and offline runs.
pub fn set_stub(enabled: bool) {
    STUB_OVERRIDE.store(enabled, Ordering::Relaxed);
}

fn stub_enabled() -> bool {
    STUB_OVERRIDE.load(Ordering::Relaxed)
        || env_nonempty("GHOSTPOST_LLM_STUB").is_some_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
}

/// Whether a completion call can be attempted at all.
#[must_use]
pub fn llm_available() -> bool {
    stub_enabled()
        || env_nonempty("OPENAI_API_KEY").is_some()
        || env_nonempty("ANTHROPIC_API_KEY").is_some()
        || env_nonempty("GOOGLE_API_KEY").is_some()
}

/// Determine the API base URL, auth value, and whether the endpoint speaks
/// the Anthropic messages shape.
fn resolve_api_endpoint(model: &str) -> Result<(String, String, bool), LlmError> {
    if model.starts_with("claude") {
        let key =
            env_nonempty("ANTHROPIC_API_KEY").ok_or_else(|| LlmError::NoApiKey(model.to_string()))?;
        return Ok(("https://api.anthropic.com/v1/messages".to_string(), key, true));
    }
    if model.starts_with("gemini") {
        let key =
            env_nonempty("GOOGLE_API_KEY").ok_or_else(|| LlmError::NoApiKey(model.to_string()))?;
        return Ok((
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions".to_string(),
            key,
            false,
        ));
    }
    let key = env_nonempty("OPENAI_API_KEY").ok_or_else(|| LlmError::NoApiKey(model.to_string()))?;
    Ok((
        "https://api.openai.com/v1/chat/completions".to_string(),
        key,
        false,
    ))
}

/// Global HTTP client instance for LLM calls.
static HTTP_CLIENT: OnceLock<asupersync::http::h1::HttpClient> = OnceLock::new();

fn get_http_client() -> &'static asupersync::http::h1::HttpClient {
    HTTP_CLIENT.get_or_init(asupersync::http::h1::HttpClient::new)
}

/// Call a chat completion endpoint with a system and user message.
pub async fn complete(
    system: &str,
    user: &str,
    model: &str,
    max_tokens: u32,
    temperature: f64,
) -> Result<String, LlmError> {
    if stub_enabled() {
        return Ok(stubbed_completion(system, user));
    }

    let (url, key, is_anthropic) = resolve_api_endpoint(model)?;

    let payload = if is_anthropic {
        serde_json::json!({
            "model": model,
            "system": system,
            "messages": [
                {"role": "user", "content": user}
            ],
            "temperature": temperature,
            "max_tokens": max_tokens
        })
    } else {
        serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": temperature,
            "max_tokens": max_tokens
        })
    };
    let body_bytes =
        serde_json::to_vec(&payload).map_err(|e| LlmError::ParseError(e.to_string()))?;

    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if is_anthropic {
        headers.push(("x-api-key".to_string(), key));
        headers.push(("anthropic-version".to_string(), "2023-06-01".to_string()));
    } else {
        headers.push(("Authorization".to_string(), format!("Bearer {key}")));
    }

    let client = get_http_client();
    let response = client
        .request(asupersync::http::h1::Method::Post, &url, headers, body_bytes)
        .await
        .map_err(|e| LlmError::Http(e.to_string()))?;

    if response.status != 200 {
        return Err(LlmError::StatusError {
            status: response.status,
            body: String::from_utf8_lossy(&response.body).to_string(),
        });
    }

    let resp_json: Value = serde_json::from_slice(&response.body)
        .map_err(|e| LlmError::ParseError(format!("response JSON: {e}")))?;

    let content = if is_anthropic {
        resp_json
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    } else {
        resp_json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };

    Ok(content)
}

/// Deterministic reply used when `GHOSTPOST_LLM_STUB` is set.
fn stubbed_completion(_system: &str, user: &str) -> String {
    // Echo enough of the request that tests can assert context made it in.
    let subject = user
        .lines()
        .find_map(|l| l.strip_prefix("Thread subject: "))
        .unwrap_or("your email");
    format!(
        "Thanks for your note about {subject}. I'll review and follow up with the details \
         shortly.\n\nBest regards"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reply_mentions_subject() {
        let out = stubbed_completion("sys", "Thread subject: Renewal terms\nConversation:");
        assert!(out.contains("Renewal terms"));
    }

    #[test]
    fn stub_reply_without_subject_line() {
        let out = stubbed_completion("sys", "no subject here");
        assert!(out.contains("your email"));
    }

    #[test]
    fn endpoint_resolution_requires_key() {
        // With no keys in the environment this must be NoApiKey, never panic.
        if env_nonempty("OPENAI_API_KEY").is_none() {
            assert!(matches!(
                resolve_api_endpoint("gpt-4o-mini"),
                Err(LlmError::NoApiKey(_))
            ));
        }
        if env_nonempty("ANTHROPIC_API_KEY").is_none() {
            assert!(matches!(
                resolve_api_endpoint("claude-3-haiku-20240307"),
                Err(LlmError::NoApiKey(_))
            ));
        }
    }
}
