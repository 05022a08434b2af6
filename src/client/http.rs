//! HTTP Client
//!
//! Performs a single provider call and turns every failure into a
//! [`CallError`]. Retrying is left to the credential pool.

use crate::error::{CallError, PoolError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Longest slice of an error body carried into a `CallError`
const MAX_ERROR_BODY: usize = 500;

/// Thin wrapper over reqwest for JSON provider calls
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, PoolError> {
        Self::with_timeout(Duration::from_secs(120))
    }

    /// Create a client with a custom overall request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, PoolError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| PoolError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// POST a JSON body and decode the JSON answer
    pub async fn post_json<T, R>(
        &self,
        url: &str,
        body: &T,
        headers: HeaderMap,
    ) -> Result<R, CallError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .await?;

        read_json(response).await
    }

    /// GET with query parameters and decode the JSON answer
    pub async fn get_json<R>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<R, CallError>
    where
        R: DeserializeOwned,
    {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .header(ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;

        read_json(response).await
    }
}

async fn read_json<R: DeserializeOwned>(response: Response) -> Result<R, CallError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(CallError::new(status.as_u16(), error_message(&body)));
    }

    serde_json::from_str(&body).map_err(|e| {
        CallError::transport(format!(
            "Failed to parse response: {}. Body: {}",
            e,
            truncate(&body)
        ))
    })
}

/// Pull the human-readable message out of a provider error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}`; anything else is returned truncated.
pub fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|e| e.is_string()))
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }
    truncate(body)
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// Build a header map from config pairs, skipping names or values that are
/// not valid HTTP
pub fn header_map(pairs: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in pairs {
        if let (Ok(name), Ok(val)) = (
            HeaderName::try_from(key.as_str()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, val);
        }
    }
    headers
}

/// Header value for a secret, marked sensitive so it is never printed
pub fn secret_header(value: &str) -> Result<HeaderValue, CallError> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|e| CallError::transport(format!("Invalid API key format: {}", e)))?;
    header.set_sensitive(true);
    Ok(header)
}
