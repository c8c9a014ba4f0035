pub mod types;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    error::{AttemptError, ProviderError},
};
use types::{GenerateContentRequest, GenerateContentResponse};

const ERROR_BODY_LOG_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Calls per model, first one included. Only overload is retried.
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl GeminiClient {
    /// Returns `Ok(None)` when no credential is configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Some(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                delay: config.retry_delay,
            },
        }))
    }

    /// One call against one model, returning the raw model text.
    pub async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, AttemptError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateContentRequest::from_prompt(prompt))
            .send()
            .await
            .map_err(|e| AttemptError::Upstream(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(AttemptError::Overloaded);
        }
        if !status.is_success() {
            let text = match response.text().await {
                Ok(text) => text,
                Err(err) => {
                    warn!(%model, %status, error = %err, "failed to read upstream error body");
                    format!("<unreadable body: {err}>")
                }
            };
            let snippet: String = text.chars().take(ERROR_BODY_LOG_LIMIT).collect();
            return Err(AttemptError::Upstream(format!("status {status}: {snippet}")));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Malformed(e.to_string()))?;

        if let Some(text) = body.first_text() {
            return Ok(text);
        }
        if let Some(reason) = body.block_reason() {
            return Err(AttemptError::Upstream(format!("prompt blocked: {reason}")));
        }
        let finish = body
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .unwrap_or("none");
        Err(AttemptError::Malformed(format!(
            "no text in first candidate (finish_reason={finish})"
        )))
    }

    /// Walks `models` in order and returns the first output `parse` accepts.
    ///
    /// Overload is retried on the same model up to `max_attempts` calls with a
    /// fixed delay. Every other failure, including a parse failure, moves on to
    /// the next model without retrying.
    pub async fn generate_with_fallback<T, F>(
        &self,
        models: &[String],
        prompt: &str,
        parse: F,
    ) -> Result<T, ProviderError>
    where
        F: Fn(&str) -> Result<T, AttemptError>,
    {
        let mut total_attempts = 0u32;

        for model in models {
            for attempt in 1..=self.retry.max_attempts {
                total_attempts += 1;
                debug!(%model, attempt, "calling model");

                let outcome = self
                    .generate_text(model, prompt)
                    .await
                    .and_then(|text| parse(&text));

                match outcome {
                    Ok(value) => {
                        info!(%model, attempt, "model succeeded");
                        return Ok(value);
                    }
                    Err(err) if err.is_retryable() => {
                        warn!(%model, attempt, max = self.retry.max_attempts, "model overloaded");
                        if attempt < self.retry.max_attempts {
                            tokio::time::sleep(self.retry.delay).await;
                        }
                    }
                    Err(err) => {
                        warn!(%model, attempt, error = %err, "model failed, trying next");
                        break;
                    }
                }
            }
        }

        warn!(attempts = total_attempts, "all models unavailable");
        Err(ProviderError::Exhausted {
            attempts: total_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_response(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    fn client_for(server: &MockServer, max_attempts: u32) -> GeminiClient {
        let config = AppConfig {
            api_key: Some("test-key".into()),
            base_url: server.uri(),
            models: vec![],
            max_attempts,
            retry_delay: Duration::from_millis(5),
            request_timeout: Duration::from_secs(5),
            bind_addr: "127.0.0.1:0".into(),
            static_dir: "public".into(),
        };
        GeminiClient::from_config(&config).unwrap().unwrap()
    }

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn as_text(text: &str) -> Result<String, AttemptError> {
        Ok(text.to_string())
    }

    #[test]
    fn no_credential_means_no_client() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert!(GeminiClient::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn sends_prompt_with_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/model-a:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("hi there")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let text = client.generate_text("model-a", "hello").await.unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn first_success_skips_later_models() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("from a")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/models/model-b:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("from b")))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let out = client
            .generate_with_fallback(&models(&["model-a", "model-b"]), "p", as_text)
            .await
            .unwrap();
        assert_eq!(out, "from a");
    }

    #[tokio::test]
    async fn overload_is_retried_exactly_max_attempts_then_falls_back() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(503))
            .expect(4)
            .mount(&server)
            .await;
        Mock::given(path("/models/model-b:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("from b")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 4);
        let out = client
            .generate_with_fallback(&models(&["model-a", "model-b"]), "p", as_text)
            .await
            .unwrap();
        assert_eq!(out, "from b");
    }

    #[tokio::test]
    async fn non_overload_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/models/model-b:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("from b")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let out = client
            .generate_with_fallback(&models(&["model-a", "model-b"]), "p", as_text)
            .await
            .unwrap();
        assert_eq!(out, "from b");
    }

    #[tokio::test]
    async fn malformed_shape_advances_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/models/model-b:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/models/model-c:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("from c")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let out = client
            .generate_with_fallback(&models(&["model-a", "model-b", "model-c"]), "p", as_text)
            .await
            .unwrap();
        assert_eq!(out, "from c");
    }

    #[tokio::test]
    async fn blocked_prompt_is_an_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let err = client.generate_text("model-a", "p").await.unwrap_err();
        assert!(matches!(err, AttemptError::Upstream(msg) if msg.contains("SAFETY")));
    }

    #[tokio::test]
    async fn parse_failure_advances_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("no json")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/models/model-b:generateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_response(r#"{"ok":true}"#)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let out: serde_json::Value = client
            .generate_with_fallback(&models(&["model-a", "model-b"]), "p", |text| {
                Ok(crate::extract::extract_json(text)?)
            })
            .await
            .unwrap();
        assert_eq!(out, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn exhaustion_counts_every_attempt() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(path("/models/model-b:generateContent"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        let err = client
            .generate_with_fallback(&models(&["model-a", "model-b"]), "p", as_text)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Exhausted { attempts: 3 }));
    }

    fn client_with_delay(server: &MockServer, max_attempts: u32, delay_ms: u64) -> GeminiClient {
        let mut client = client_for(server, max_attempts);
        client.retry.delay = Duration::from_millis(delay_ms);
        client
    }

    #[tokio::test]
    async fn overload_retries_wait_between_attempts_but_not_after_the_last() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let delay = 200;
        let client = client_with_delay(&server, 3, delay);
        let started = std::time::Instant::now();
        let err = client
            .generate_with_fallback(&models(&["model-a"]), "p", as_text)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ProviderError::Exhausted { attempts: 3 }));
        // Two sleeps between three attempts; a third would push past 600ms.
        assert!(elapsed >= Duration::from_millis(2 * delay), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(3 * delay), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn non_overload_failure_does_not_wait() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/models/model-b:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("from b")))
            .expect(1)
            .mount(&server)
            .await;

        let delay = 500;
        let client = client_with_delay(&server, 3, delay);
        let started = std::time::Instant::now();
        let out = client
            .generate_with_fallback(&models(&["model-a", "model-b"]), "p", as_text)
            .await
            .unwrap();

        assert_eq!(out, "from b");
        assert!(started.elapsed() < Duration::from_millis(delay));
    }

    #[tokio::test]
    async fn error_status_body_is_kept_in_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(path("/models/model-a:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let err = client.generate_text("model-a", "p").await.unwrap_err();
        assert!(
            matches!(&err, AttemptError::Upstream(msg) if msg.contains("429") && msg.contains("quota exceeded")),
            "{err}"
        );
    }
}
