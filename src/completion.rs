//! Chat-completion client
//!
//! Sends the profile, the prior conversation and the new user turn to an
//! OpenAI-compatible `chat/completions` endpoint and returns one reply.
//! Sampling is greedy (temperature 0) and the reply length is bounded.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::conversation::ConversationTurn;
use crate::{CompletionError, Error, Result};

/// Reply used when the endpoint returns no content
pub const NO_RESPONSE_FALLBACK: &str = "No response received";

/// Source of assistant replies
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce one assistant reply to `user_text`, given the prior turns
    ///
    /// # Errors
    ///
    /// Returns a [`CompletionError`] for network failures, non-success
    /// statuses and malformed bodies
    async fn complete(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
    ) -> std::result::Result<String, CompletionError>;
}

/// Client for OpenAI-compatible chat completions (Groq by default)
pub struct ChatCompletionClient {
    client: Client,
    url: String,
    model: String,
    max_tokens: u32,
    timeout: Option<Duration>,
    api_key: Option<SecretString>,
    system_prompt: String,
}

impl ChatCompletionClient {
    /// Create a client for `config`, answering as `system_prompt`
    ///
    /// A missing credential is not an error here; it is reported by
    /// [`CompletionClient::complete`] so it reaches the user as a reply.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &CompletionConfig, system_prompt: impl Into<String>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        if config.api_key.is_none() {
            tracing::warn!("no completion API key configured, requests will fail");
        }

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout,
            api_key: config.api_key.clone(),
            system_prompt: system_prompt.into(),
        })
    }

    /// Model identifier sent with every request
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionClient {
    async fn complete(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
    ) -> std::result::Result<String, CompletionError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(CompletionError::MissingCredential)?;

        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(&self.system_prompt, history, user_text),
            max_tokens: self.max_tokens,
            temperature: 0.0,
        };

        tracing::debug!(
            model = %self.model,
            history = history.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if !status.is_success() {
            let err = status_error(status, &body);
            tracing::error!(status = %status, error = %err, "completion API error");
            return Err(err);
        }

        let reply = parse_reply(&body)?;
        tracing::debug!(reply_len = reply.len(), "completion received");
        Ok(reply)
    }
}

impl ChatCompletionClient {
    fn transport_error(&self, e: &reqwest::Error) -> CompletionError {
        tracing::error!(error = %e, "completion request failed");
        match self.timeout {
            Some(timeout) if e.is_timeout() => CompletionError::Timeout(timeout.as_secs()),
            _ => CompletionError::Network(e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

/// One entry of the request's `messages` array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Assemble `[system, ...history, user]`
#[must_use]
pub fn build_messages<'a>(
    system_prompt: &'a str,
    history: &'a [ConversationTurn],
    user_text: &'a str,
) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: "system",
        content: system_prompt,
    });
    messages.extend(history.iter().map(|turn| ChatMessage {
        role: turn.role().as_str(),
        content: turn.content(),
    }));
    messages.push(ChatMessage {
        role: "user",
        content: user_text,
    });
    messages
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Extract the first choice's content from a success body
///
/// A body without a `choices` array is malformed; an empty array or a
/// choice without content yields [`NO_RESPONSE_FALLBACK`].
///
/// # Errors
///
/// Returns [`CompletionError::Malformed`] if the body is not a completion
pub fn parse_reply(body: &str) -> std::result::Result<String, CompletionError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| CompletionError::Malformed(e.to_string()))?;

    let reply = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| NO_RESPONSE_FALLBACK.to_string());

    Ok(reply)
}

/// Normalize a non-success response into a [`CompletionError`]
///
/// Uses `error.message` from the body when present, otherwise the status
/// reason phrase.
#[must_use]
pub fn status_error(status: StatusCode, body: &str) -> CompletionError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|d| d.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

    CompletionError::Status {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_messages_order() {
        let history = vec![
            ConversationTurn::user("Hi"),
            ConversationTurn::assistant("Hello!"),
        ];
        let messages = build_messages("profile", &history, "What's your superpower?");

        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "profile");
        assert_eq!(messages[3].content, "What's your superpower?");
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "llama-3.3-70b-versatile",
            messages: build_messages("profile", &[], "hello"),
            max_tokens: 500,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "llama-3.3-70b-versatile");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_parse_reply() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Rapid adaptability."}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "Rapid adaptability.");
    }

    #[test]
    fn test_parse_reply_fallbacks() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":""}}]}"#,
            r#"{"choices":[{}]}"#,
        ] {
            assert_eq!(parse_reply(body).unwrap(), NO_RESPONSE_FALLBACK, "{body}");
        }
    }

    #[test]
    fn test_parse_reply_malformed() {
        assert!(matches!(
            parse_reply("<html>gateway</html>"),
            Err(CompletionError::Malformed(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"id":"x"}"#),
            Err(CompletionError::Malformed(_))
        ));
    }

    #[test]
    fn test_status_error_uses_body_message() {
        let err = status_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#,
        );
        assert_eq!(err.to_string(), "API Error 401: Invalid API Key");
    }

    #[test]
    fn test_status_error_falls_back_to_reason() {
        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "upstream down");
        assert_eq!(err.to_string(), "API Error 503: Service Unavailable");
    }

    #[tokio::test]
    async fn test_missing_credential_is_a_completion_error() {
        let client = ChatCompletionClient::new(&CompletionConfig::default(), "profile").unwrap();
        let err = client.complete(&[], "hello").await.unwrap_err();
        assert_eq!(err, CompletionError::MissingCredential);
    }
}
