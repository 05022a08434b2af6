//! Groq chat completions adapter (OpenAI-compatible wire format).

use crate::client::http::secret_header;
use crate::client::HttpClient;
use crate::error::CallError;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde::{Deserialize, Serialize};

/// Pool provider id
pub const PROVIDER: &str = "GROQ";

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

/// One chat completion call with `key`; returns the first choice's content
pub async fn chat_completion(
    http: &HttpClient,
    base_url: &str,
    key: &str,
    request: &ChatCompletionRequest,
) -> Result<String, CallError> {
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, secret_header(&format!("Bearer {}", key))?);

    let response: ChatCompletionResponse = http.post_json(&url, request, headers).await?;
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| CallError::transport("Groq returned no choices"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_request_skips_unset_params() {
        let request = ChatCompletionRequest::new("llama", vec![ChatMessage::user("hi")]);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({ "model": "llama", "messages": [{ "role": "user", "content": "hi" }] })
        );
    }

    #[tokio::test]
    async fn test_chat_completion_uses_bearer_key() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer gsk-1")
            .match_body(Matcher::PartialJson(json!({ "model": "llama" })))
            .with_status(200)
            .with_body(r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"hey"}}]}"#)
            .create_async()
            .await;

        let http = HttpClient::new().unwrap();
        let request = ChatCompletionRequest::new(
            "llama",
            vec![ChatMessage::system("be brief"), ChatMessage::user("hi")],
        );
        let content = chat_completion(&http, &server.url(), "gsk-1", &request)
            .await
            .unwrap();

        assert_eq!(content, "hey");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let http = HttpClient::new().unwrap();
        let request = ChatCompletionRequest::new("llama", vec![ChatMessage::user("hi")]);
        let err = chat_completion(&http, &server.url(), "gsk-1", &request)
            .await
            .unwrap_err();

        assert_eq!(err.status, None);
    }
}
