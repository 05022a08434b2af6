//! keypool - outbound API credential pool
//!
//! Rotates requests to upstream AI providers across several API keys,
//! tracks per-key health and cooldowns, and keeps malformed requests from
//! being retried on every key.

use std::collections::HashMap;
use std::sync::Arc;

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod rate_limiter;

use api::{gemini, groq, rapidapi, ChatCompletionRequest, ChatMessage, GenerateContentRequest};
use client::HttpClient;
use config::{ConfigLoader, KeypoolConfig, ProviderConfig};
use error::{PoolError, Result};
use pool::{CredentialPool, CredentialSnapshot, EnvKeySource, ExecuteOptions, KeySource};
use rate_limiter::RateLimiter;
use serde::Serialize;

pub use error::CallError;

/// Process-wide entry point used by route handlers
pub struct Gateway {
    config: KeypoolConfig,
    pool: CredentialPool,
    http: HttpClient,
    limiter: RateLimiter,
}

impl Gateway {
    /// Create a gateway from `.env`, the built-in defaults and user config files
    pub fn new() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let loader = ConfigLoader::new()?;
        Self::from_config(loader.into_config())
    }

    /// Create a gateway with a custom config path
    pub fn with_config_path(path: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let loader = ConfigLoader::from_path(path)?;
        Self::from_config(loader.into_config())
    }

    /// Keys come from the environment named in `config`
    pub fn from_config(config: KeypoolConfig) -> Result<Self> {
        let source = Arc::new(EnvKeySource::new(config.clone()));
        Self::with_key_source(config, source)
    }

    /// Keys come from `source`
    pub fn with_key_source(config: KeypoolConfig, source: Arc<dyn KeySource>) -> Result<Self> {
        let pool = CredentialPool::new(source, config.cooldown_policy());

        Ok(Self {
            config,
            pool,
            http: HttpClient::new()?,
            limiter: RateLimiter::new(),
        })
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn config(&self) -> &KeypoolConfig {
        &self.config
    }

    /// Abuse protection for an inbound request from `identity`
    pub fn admit(&self, identity: &str) -> Result<()> {
        let limit = self.config.rate_limit();
        if self.limiter.allow(identity, limit.limit, limit.window()) {
            Ok(())
        } else {
            Err(PoolError::RateLimited {
                identity: identity.to_string(),
            })
        }
    }

    fn provider(&self, id: &str) -> Result<&ProviderConfig> {
        self.config
            .providers
            .get(id)
            .ok_or_else(|| PoolError::Config(format!("Provider '{}' is not configured", id)))
    }

    fn model_for<'a>(&'a self, provider: &'a ProviderConfig, model: Option<&'a str>) -> Result<&'a str> {
        model
            .or(provider.default_model.as_deref())
            .ok_or_else(|| PoolError::Config("No model given and no default model configured".to_string()))
    }

    /// Generate text with Gemini
    pub async fn gemini_generate(
        &self,
        model: Option<&str>,
        request: GenerateContentRequest,
        override_key: Option<String>,
    ) -> Result<String> {
        let provider = self.provider(gemini::PROVIDER)?;
        let model = self.model_for(provider, model)?;
        let base_url = provider.get_base_url();

        let http = &self.http;
        let base_url = base_url.as_str();
        let request = &request;

        self.pool
            .execute(
                gemini::PROVIDER,
                move |key| async move {
                    gemini::generate_content(http, base_url, model, &key, request).await
                },
                ExecuteOptions::from_override(override_key),
            )
            .await
    }

    /// Chat completion with Groq
    pub async fn groq_chat(
        &self,
        model: Option<&str>,
        messages: Vec<ChatMessage>,
        override_key: Option<String>,
    ) -> Result<String> {
        let provider = self.provider(groq::PROVIDER)?;
        let model = self.model_for(provider, model)?;
        let base_url = provider.get_base_url();
        let request = ChatCompletionRequest::new(model, messages);

        let http = &self.http;
        let base_url = base_url.as_str();
        let request = &request;

        self.pool
            .execute(
                groq::PROVIDER,
                move |key| async move { groq::chat_completion(http, base_url, &key, request).await },
                ExecuteOptions::from_override(override_key),
            )
            .await
    }

    /// Resolve download links for a video through RapidAPI
    pub async fn resolve_video(
        &self,
        video_id: &str,
        override_key: Option<String>,
    ) -> Result<serde_json::Value> {
        let provider = self.provider(rapidapi::PROVIDER)?;
        let base_url = provider.get_base_url();
        let path = provider.path.as_deref().unwrap_or_default();

        let http = &self.http;
        let base_url = base_url.as_str();
        let headers = &provider.headers;

        self.pool
            .execute(
                rapidapi::PROVIDER,
                move |key| async move {
                    rapidapi::resolve_video(http, base_url, path, headers, &key, video_id).await
                },
                ExecuteOptions::from_override(override_key),
            )
            .await
    }

    /// Masked key health of every configured provider, plus limiter load
    pub fn health(&self) -> HealthReport {
        HealthReport {
            providers: self
                .config
                .providers
                .keys()
                .map(|id| (id.clone(), self.pool.snapshot(id)))
                .collect(),
            tracked_clients: self.limiter.tracked(),
        }
    }
}

/// Diagnostic view returned by [`Gateway::health`]
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub providers: HashMap<String, Vec<CredentialSnapshot>>,
    /// Caller identities with an open rate-limit window
    pub tracked_clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::pool::{CredentialStatus, StaticKeySource};

    fn provider(base_url: &str, key_env: &str, model: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            base_url: base_url.to_string(),
            key_env: key_env.to_string(),
            max_key_suffix: 20,
            api_base_env: None,
            default_model: model.map(String::from),
            path: None,
            headers: HashMap::new(),
        }
    }

    fn gateway(base_url: &str, source: StaticKeySource) -> Gateway {
        let mut config = KeypoolConfig::default();
        config.providers.insert(
            gemini::PROVIDER.to_string(),
            provider(base_url, "GEMINI_API_KEY", Some("gemini-test")),
        );
        config.providers.insert(
            groq::PROVIDER.to_string(),
            provider(base_url, "GROQ_API_KEY", Some("llama-test")),
        );
        let mut rapid = provider(base_url, "RAPIDAPI_KEY", None);
        rapid.path = Some("v2/video/details".to_string());
        config
            .providers
            .insert(rapidapi::PROVIDER.to_string(), rapid);
        config.rate_limit = Some(RateLimitConfig {
            limit: 2,
            window_secs: 60,
        });

        Gateway::with_key_source(config, Arc::new(source)).unwrap()
    }

    #[tokio::test]
    async fn test_gemini_rotates_past_rate_limited_key() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", "/models/gemini-test:generateContent")
            .match_header("x-goog-api-key", "key-a")
            .with_status(429)
            .with_body(r#"{"error":{"code":429,"message":"Resource has been exhausted"}}"#)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/models/gemini-test:generateContent")
            .match_header("x-goog-api-key", "key-b")
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"bonjour"}]}}]}"#)
            .create_async()
            .await;

        let gateway = gateway(
            &server.url(),
            StaticKeySource::new().with_keys(gemini::PROVIDER, ["key-a", "key-b"]),
        );

        let text = gateway
            .gemini_generate(None, GenerateContentRequest::from_prompt("hello"), None)
            .await
            .unwrap();

        assert_eq!(text, "bonjour");
        limited.assert_async().await;
        ok.assert_async().await;

        let health = gateway.health();
        let gemini = &health.providers[gemini::PROVIDER];
        assert_eq!(gemini[0].status, CredentialStatus::RateLimited);
        assert_eq!(gemini[1].status, CredentialStatus::Healthy);
    }

    #[tokio::test]
    async fn test_groq_bad_request_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let bad = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body(r#"{"error":{"message":"'messages' must not be empty"}}"#)
            .expect(1)
            .create_async()
            .await;

        let gateway = gateway(
            &server.url(),
            StaticKeySource::new().with_keys(groq::PROVIDER, ["gsk-a", "gsk-b"]),
        );

        let err = gateway.groq_chat(None, vec![], None).await.unwrap_err();

        assert_eq!(err.status_code(), 400);
        assert!(!err.is_retryable());
        bad.assert_async().await;
    }

    #[tokio::test]
    async fn test_user_key_used_before_pool() {
        let mut server = mockito::Server::new_async().await;
        let user = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer user-key")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"mine"}}]}"#)
            .create_async()
            .await;

        let gateway = gateway(&server.url(), StaticKeySource::new());

        let content = gateway
            .groq_chat(
                Some("llama-other"),
                vec![ChatMessage::user("hi")],
                Some("user-key".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(content, "mine");
        user.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_video_without_keys_fails_fast() {
        let server = mockito::Server::new_async().await;
        let gateway = gateway(&server.url(), StaticKeySource::new());

        let err = gateway.resolve_video("abc", None).await.unwrap_err();

        assert!(matches!(err, PoolError::Exhausted { .. }));
        assert_eq!(err.status_code(), 429);
    }

    #[test]
    fn test_admit_applies_configured_limit() {
        let gateway = gateway("http://localhost", StaticKeySource::new());

        assert!(gateway.admit("10.0.0.1").is_ok());
        assert!(gateway.admit("10.0.0.1").is_ok());
        let err = gateway.admit("10.0.0.1").unwrap_err();
        assert!(matches!(err, PoolError::RateLimited { .. }));
        assert!(gateway.admit("10.0.0.2").is_ok());
    }

    #[test]
    fn test_admit_forgets_expired_clients() {
        let mut config = KeypoolConfig::default();
        config.rate_limit = Some(RateLimitConfig {
            limit: 1,
            window_secs: 0,
        });
        let gateway =
            Gateway::with_key_source(config, Arc::new(StaticKeySource::new())).unwrap();

        for n in 0..500 {
            assert!(gateway.admit(&format!("198.51.100.{}", n)).is_ok());
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(gateway.admit("203.0.113.7").is_ok());

        assert_eq!(gateway.health().tracked_clients, 1);
    }

    #[tokio::test]
    async fn test_connection_failure_is_fatal_even_with_keywords_in_url() {
        // Nothing listens on port 1
        let gateway = gateway(
            "http://127.0.0.1:1",
            StaticKeySource::new().with_keys(rapidapi::PROVIDER, ["rk-1", "rk-2"]),
        );

        let err = gateway
            .resolve_video("quota-429-invalid-key", None)
            .await
            .unwrap_err();

        let call = match err {
            PoolError::Call(call) => call,
            other => panic!("expected fatal transport error, got {:?}", other),
        };
        assert_eq!(call.status, None);
        assert!(!call.message.contains("quota"), "{}", call.message);
        assert_eq!(
            crate::pool::classify(call.status, &call.message),
            crate::pool::ErrorClass::Fatal
        );

        let snapshots = &gateway.health().providers[rapidapi::PROVIDER];
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.status == CredentialStatus::Healthy));
        assert!(snapshots.iter().all(|s| s.cooldown_remaining_secs.is_none()));
        assert!(snapshots.iter().all(|s| s.fail_count == 0));
    }

    #[tokio::test]
    async fn test_unknown_model_and_provider_are_config_errors() {
        let gateway = Gateway::with_key_source(
            KeypoolConfig::default(),
            Arc::new(StaticKeySource::new()),
        )
        .unwrap();

        let err = gateway
            .gemini_generate(None, GenerateContentRequest::from_prompt("x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }
}
