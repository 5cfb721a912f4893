//! Streaming provider client
//!
//! Opens a streaming request with raw HTTP and decodes the SSE body ourselves,
//! so vendor extensions such as `reasoning_content` are not lost. Request
//! messages are built with async-openai's types.

use super::config::{ProviderConfig, WireApi};
use super::stream::decode_byte_stream;
use crate::aggregate::{aggregate, Completion, FragmentSink};
use crate::config::RequestConfig;
use crate::error::{Error, Result, TransportError};
use crate::estimate::SharedEstimator;
use crate::events::EventStream;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use tokio_util::sync::CancellationToken;

/// Streaming client for one provider
#[derive(Clone)]
pub struct ProviderClient {
    config: ProviderConfig,
    api_key: String,
    estimator: SharedEstimator,
    http_client: reqwest::Client,
}

impl ProviderClient {
    /// Create a new provider client, reading the key from the environment
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key = Self::get_api_key(&config)?;
        Self::with_api_key(config, api_key)
    }

    /// Create a client with an explicit key
    pub fn with_api_key(config: ProviderConfig, api_key: impl Into<String>) -> Result<Self> {
        let estimator = config.estimator.build()?;

        // Don't keep connections alive; dropping a stream closes its connection
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key: api_key.into(),
            estimator,
            http_client,
        })
    }

    /// Get API key from `.env` or the environment
    fn get_api_key(config: &ProviderConfig) -> Result<String> {
        let _ = dotenvy::dotenv();

        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::MissingCredential {
                provider: config.name.clone(),
                env_var: config.api_key_env.clone(),
            }),
        }
    }

    /// Get the provider config
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Fallback token counter for this provider
    pub fn estimator(&self) -> SharedEstimator {
        self.estimator.clone()
    }

    fn build_messages(request: &RequestConfig) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::with_capacity(2);

        if !request.system.is_empty() {
            let system = ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(|e| Error::InvalidRequest(format!("Failed to build system message: {}", e)))?;
            messages.push(system.into());
        }

        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.clone())
            .build()
            .map_err(|e| Error::InvalidRequest(format!("Failed to build user message: {}", e)))?;
        messages.push(user.into());

        Ok(messages)
    }

    /// JSON body for a streaming request
    pub fn request_body(&self, request: &RequestConfig) -> Result<serde_json::Value> {
        let model = request.model_or(&self.config.default_model);

        let mut body = match self.config.wire {
            WireApi::ChatCompletions => {
                let messages = serde_json::to_value(Self::build_messages(request)?)
                    .map_err(|e| Error::InvalidRequest(format!("Failed to encode messages: {}", e)))?;

                let mut body = serde_json::json!({
                    "model": model,
                    "messages": messages,
                    "stream": true,
                });
                if self.config.stream_usage {
                    body["stream_options"] = serde_json::json!({"include_usage": true});
                }
                if let Some(max_tokens) = request.max_tokens {
                    body["max_tokens"] = serde_json::json!(max_tokens);
                }
                if let Some(effort) = &request.reasoning_effort {
                    body["reasoning_effort"] = serde_json::json!(effort);
                }
                body
            }
            WireApi::Responses => {
                let mut body = serde_json::json!({
                    "model": model,
                    "input": [{"role": "user", "content": request.prompt}],
                    "stream": true,
                });
                if !request.system.is_empty() {
                    body["instructions"] = serde_json::json!(request.system);
                }
                if let Some(effort) = &request.reasoning_effort {
                    body["reasoning"] = serde_json::json!({"effort": effort});
                }
                if let Some(max_tokens) = request.max_tokens {
                    body["max_output_tokens"] = serde_json::json!(max_tokens);
                }
                body
            }
        };

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }

        Ok(body)
    }

    /// Open a streaming request and return its decoded events
    pub async fn open_stream(&self, request: &RequestConfig) -> Result<EventStream> {
        let body = self.request_body(request)?;

        let response = self
            .http_client
            .post(self.config.endpoint())
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(TransportError::Http(e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::transport(TransportError::Status { status, body: text }));
        }

        Ok(decode_byte_stream(
            Box::pin(response.bytes_stream()),
            self.config.wire,
        ))
    }

    /// Stream a chat response into `sink` and return the aggregated result.
    ///
    /// Usage comes from the stream when the provider reports it, otherwise
    /// from this provider's estimator.
    pub async fn chat_stream<K>(
        &self,
        request: &RequestConfig,
        sink: &mut K,
        cancellation: Option<CancellationToken>,
    ) -> Result<Completion>
    where
        K: FragmentSink + ?Sized,
    {
        let model = request.model_or(&self.config.default_model);
        let start = std::time::Instant::now();
        tracing::info!(
            target: "llm",
            provider = %self.config.name,
            model = model,
            max_tokens = request.max_tokens,
            "Starting streaming LLM call"
        );

        let result = self.run_stream(request, sink, cancellation).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(completion) => tracing::info!(
                target: "llm",
                provider = %self.config.name,
                model = model,
                elapsed_ms = elapsed_ms,
                input_tokens = completion.usage.report.prompt_tokens,
                output_tokens = completion.usage.report.completion_tokens,
                usage_source = completion.usage.source.as_str(),
                "Streaming LLM call completed"
            ),
            Err(e) => tracing::error!(
                target: "llm",
                provider = %self.config.name,
                model = model,
                elapsed_ms = elapsed_ms,
                error = %e,
                partial_chars = e.partial_text().map(|t| t.chars().count()),
                "Streaming LLM call failed"
            ),
        }

        result
    }

    async fn run_stream<K>(
        &self,
        request: &RequestConfig,
        sink: &mut K,
        cancellation: Option<CancellationToken>,
    ) -> Result<Completion>
    where
        K: FragmentSink + ?Sized,
    {
        // The request itself is cancellable; prompt processing can take a while
        let events = match cancellation {
            Some(ref token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(Error::Cancelled { partial_text: String::new() });
                }
                result = self.open_stream(request) => result?,
            },
            None => self.open_stream(request).await?,
        };

        aggregate(
            events,
            &*self.estimator,
            &request.prompt_text(),
            sink,
            cancellation,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Discard;
    use crate::error::ErrorKind;
    use crate::estimate::EstimatorKind;
    use crate::usage::{UsageReport, UsageSource};
    use std::ops::ControlFlow;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn sse(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/event-stream")
            .set_body_string(body.to_string())
    }

    fn test_config(server: &MockServer) -> ProviderConfig {
        let mut config = ProviderConfig::custom("Test", server.uri(), "EVALAI_TEST_KEY", "test-model");
        config.estimator = EstimatorKind::CharRatio { chars_per_token: 1.0 };
        config
    }

    #[test]
    fn test_missing_credential_is_reported_before_streaming() {
        let config = ProviderConfig::custom(
            "Nowhere",
            "http://localhost:1",
            "EVALAI_TEST_DEFINITELY_UNSET_KEY",
            "m",
        );
        let err = ProviderClient::new(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MissingCredential);
        assert!(err.to_string().contains("EVALAI_TEST_DEFINITELY_UNSET_KEY"));
    }

    #[test]
    fn test_chat_body_uses_structured_limit() {
        let client = ProviderClient::with_api_key(ProviderConfig::deepseek(), "k").unwrap();
        let request = RequestConfig::new("讲一下什么是Spring Boot").with_max_tokens(100);
        let body = client.request_body(&request).unwrap();

        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        // The limit is a parameter, not part of the prompt
        assert_eq!(body["messages"][1]["content"], "讲一下什么是Spring Boot");
    }

    #[test]
    fn test_gemini_body_skips_stream_options() {
        let client = ProviderClient::with_api_key(ProviderConfig::gemini(), "k").unwrap();
        let body = client.request_body(&RequestConfig::new("hi")).unwrap();
        assert!(body.get("stream_options").is_none());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn test_chat_body_carries_reasoning_effort() {
        let client = ProviderClient::with_api_key(ProviderConfig::gemini(), "k").unwrap();
        let request = RequestConfig::new("hi").with_reasoning_effort("low");
        let body = client.request_body(&request).unwrap();
        assert_eq!(body["reasoning_effort"], "low");
        assert!(body.get("reasoning").is_none());
    }

    #[test]
    fn test_responses_body() {
        let client = ProviderClient::with_api_key(ProviderConfig::openai(), "k").unwrap();
        let request = RequestConfig::new("讲一下什么是ssr")
            .with_reasoning_effort("minimal")
            .with_max_tokens(200);
        let body = client.request_body(&request).unwrap();

        assert_eq!(body["model"], "gpt-5-nano");
        assert_eq!(body["input"][0]["content"], "讲一下什么是ssr");
        assert_eq!(body["instructions"], "You are a helpful assistant.");
        assert_eq!(body["reasoning"]["effort"], "minimal");
        assert_eq!(body["max_output_tokens"], 200);
        assert!(body.get("messages").is_none());
    }

    #[tokio::test]
    async fn test_chat_stream_reports_provider_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "stream": true,
                "stream_options": {"include_usage": true}
            })))
            .respond_with(sse(concat!(
                "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
                "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Spring\"}}]}\n\n",
                "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\" Boot\"}}]}\n\n",
                "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n\n",
                "data: [DONE]\n\n",
            )))
            .mount(&server)
            .await;

        let client = ProviderClient::with_api_key(test_config(&server), "test-key").unwrap();
        let mut fragments = Vec::new();
        let mut sink = |t: &str| {
            fragments.push(t.to_string());
            ControlFlow::Continue(())
        };

        let completion = client
            .chat_stream(&RequestConfig::new("What is Spring Boot?"), &mut sink, None)
            .await
            .unwrap();

        assert_eq!(fragments, vec!["Spring", " Boot"]);
        assert_eq!(completion.text, "Spring Boot");
        assert_eq!(completion.usage.report, UsageReport::new(10, 5, 15));
        assert_eq!(completion.usage.source, UsageSource::Reported);
        assert_eq!(completion.metadata.id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_chat_stream_estimates_without_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(sse(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n",
            ))
            .mount(&server)
            .await;

        let client = ProviderClient::with_api_key(test_config(&server), "test-key").unwrap();
        let request = RequestConfig::new("hey").with_system("sys");
        let completion = client.chat_stream(&request, &mut Discard, None).await.unwrap();

        // One token per char: "sys" + "hey" in, "Hi" out
        assert_eq!(completion.usage.report, UsageReport::new(6, 2, 8));
        assert!(completion.usage.is_estimated());
    }

    #[tokio::test]
    async fn test_http_error_status_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = ProviderClient::with_api_key(test_config(&server), "bad").unwrap();
        let err = client
            .chat_stream(&RequestConfig::new("hi"), &mut Discard, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert_eq!(err.partial_text(), Some(""));
        match err {
            Error::TransportFailure {
                source: TransportError::Status { status, body },
                ..
            } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_in_stream_error_keeps_partial_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse(concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"ab\"}}]}\n\n",
                "data: {\"error\":{\"message\":\"upstream timeout\"}}\n\n",
            )))
            .mount(&server)
            .await;

        let client = ProviderClient::with_api_key(test_config(&server), "k").unwrap();
        let err = client
            .chat_stream(&RequestConfig::new("hi"), &mut Discard, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert_eq!(err.partial_text(), Some("ab"));
    }

    #[tokio::test]
    async fn test_responses_stream_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .respond_with(sse(concat!(
                "event: response.created\n",
                "data: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_1\",\"created_at\":1758455904,\"model\":\"gpt-5-nano\"}}\n\n",
                "event: response.output_text.delta\n",
                "data: {\"type\":\"response.output_text.delta\",\"delta\":\"SSR \"}\n\n",
                "event: response.output_text.delta\n",
                "data: {\"type\":\"response.output_text.delta\",\"delta\":\"renders on the server\"}\n\n",
                "event: response.completed\n",
                "data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_1\",\"created_at\":1758455904,\"model\":\"gpt-5-nano\",\"usage\":{\"input_tokens\":20,\"output_tokens\":6,\"total_tokens\":26}}}\n\n",
            )))
            .mount(&server)
            .await;

        let mut config = test_config(&server);
        config.wire = WireApi::Responses;
        let client = ProviderClient::with_api_key(config, "k").unwrap();
        let completion = client
            .chat_stream(&RequestConfig::new("什么是ssr"), &mut Discard, None)
            .await
            .unwrap();

        assert_eq!(completion.text, "SSR renders on the server");
        assert_eq!(completion.usage.report, UsageReport::new(20, 6, 26));
        assert_eq!(completion.metadata.id.as_deref(), Some("resp_1"));
        assert_eq!(completion.metadata.model.as_deref(), Some("gpt-5-nano"));
    }

    #[tokio::test]
    async fn test_cancelled_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse("data: [DONE]\n\n"))
            .mount(&server)
            .await;

        let client = ProviderClient::with_api_key(test_config(&server), "k").unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = client
            .chat_stream(&RequestConfig::new("hi"), &mut Discard, Some(token))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
