//! OpenAI-compatible chat completions client
//!
//! Works against LM Studio, Ollama's OpenAI endpoint and OpenAI itself. One
//! HTTP request per call and no retries: a failed call is reported to the
//! caller as-is.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::sse::{SseDecoder, SseFrame};
use super::{CompletionRequest, LlmClient, LlmError, TextStream};
use crate::config::LlmConfig;

/// OpenAI-compatible API client
pub struct OpenAIClient {
    model: String,
    api_key: Option<String>,
    base_url: String,
    http: Client,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIClient {
    /// Create a new client from configuration
    ///
    /// The API key is optional; local servers usually don't want one.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(base_url = %config.base_url, model = %config.model, "from_config: called");

        let api_key = match &config.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) if !key.trim().is_empty() => Some(key),
                _ => {
                    warn!(env = %var, "from_config: API key env var not set, sending no Authorization header");
                    None
                }
            },
            None => None,
        };

        let mut builder = Client::builder();
        if let Some(ms) = config.timeout_ms {
            debug!(timeout_ms = ms, "from_config: applying timeout");
            let timeout = Duration::from_millis(ms);
            builder = builder.connect_timeout(timeout).read_timeout(timeout);
        }
        let http = builder.build().map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Build the request body for the chat completions API
    fn build_request_body(&self, request: &CompletionRequest, stream: bool) -> serde_json::Value {
        debug!(%self.model, stream, "build_request_body: called");

        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": request.prompt }));

        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "stream": stream,
        })
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let mut req = self
            .http
            .post(self.endpoint())
            .header("content-type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(LlmError::Network)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            warn!(status, %message, "send: upstream rejected request");
            return Err(LlmError::ApiError { status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        debug!(%self.model, prompt_len = request.prompt.len(), "complete: called");
        let body = self.build_request_body(&request, false);
        let response = self.send(&body).await?;

        let text = response.text().await.map_err(LlmError::Network)?;
        let parsed: ChatResponse = serde_json::from_str(&text)?;
        let content = parsed.into_content();
        debug!(content_len = content.as_ref().map(|c| c.len()), "complete: parsed");
        content.ok_or_else(|| LlmError::InvalidResponse("No content in LLM response".to_string()))
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<TextStream, LlmError> {
        debug!(%self.model, prompt_len = request.prompt.len(), "complete_stream: called");
        let body = self.build_request_body(&request, true);
        let response = self.send(&body).await?;

        if response.content_length() == Some(0) {
            debug!("complete_stream: empty body");
            return Err(LlmError::NoBody);
        }

        Ok(text_deltas(response.bytes_stream()))
    }
}

struct DeltaState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

impl<S> DeltaState<S> {
    fn absorb(&mut self, frames: Vec<SseFrame>) {
        for frame in frames {
            if self.finished {
                break;
            }
            match frame {
                SseFrame::Done => {
                    debug!("absorb: done sentinel");
                    self.finished = true;
                }
                SseFrame::Data(payload) => match serde_json::from_str::<StreamChunk>(&payload) {
                    Ok(chunk) => {
                        if let Some(text) = chunk.into_delta()
                            && !text.is_empty()
                        {
                            self.pending.push_back(text);
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, %payload, "absorb: skipping malformed event");
                    }
                },
            }
        }
    }
}

/// Turn a raw chat-completions byte stream into text fragments
///
/// Malformed events are skipped, empty deltas are dropped, and the stream
/// ends at `[DONE]` or when the bytes run out.
pub fn text_deltas<S, B, E>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<LlmError> + Send,
{
    let state = DeltaState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.pending.pop_front() {
                return Some((Ok(text), state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    state.absorb(frames);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    let tail = state.decoder.finish();
                    state.absorb(tail.into_iter().collect());
                    state.finished = true;
                }
            }
        }
    }))
}

// Non-streaming response shapes

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    response: Option<String>,
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Option<String> {
        let from_choice = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content);

        [from_choice, self.response, self.content]
            .into_iter()
            .flatten()
            .find(|c| !c.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

// Streaming shapes

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

impl StreamChunk {
    fn into_delta(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.delta.content)
    }
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::post;

    fn test_config(base_url: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.to_string(),
            ..LlmConfig::default()
        }
    }

    fn delta_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
        )
    }

    async fn spawn_model(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, LlmError>> {
        stream.collect().await
    }

    #[test]
    fn test_build_request_body_defaults() {
        let client = OpenAIClient::from_config(&test_config("http://localhost:1234/")).unwrap();
        let request = CompletionRequest::new("Hello").with_system("You are helpful");

        let body = client.build_request_body(&request, true);

        assert_eq!(body["model"], "qwen2.5-coder-7b-instruct");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(client.endpoint(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn test_build_request_body_overrides_and_no_system() {
        let client = OpenAIClient::from_config(&test_config("http://localhost:1234")).unwrap();
        let request = CompletionRequest::new("x").with_temperature(0.3).with_max_tokens(10);

        let body = client.build_request_body(&request, false);

        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 10);
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_chat_response_content_fallbacks() {
        let r: ChatResponse = serde_json::from_str(r#"{"choices":[{"message":{"content":"a"}}]}"#).unwrap();
        assert_eq!(r.into_content().as_deref(), Some("a"));

        let r: ChatResponse = serde_json::from_str(r#"{"response":"b"}"#).unwrap();
        assert_eq!(r.into_content().as_deref(), Some("b"));

        let r: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":""}}],"content":"c"}"#).unwrap();
        assert_eq!(r.into_content().as_deref(), Some("c"));

        let r: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(r.into_content().is_none());
    }

    #[tokio::test]
    async fn test_text_deltas_skips_malformed_and_empty() {
        let body = format!(
            "{}data: not json\n\n{}{}data: [DONE]\n\n{}",
            delta_line("Hel"),
            delta_line(""),
            delta_line("lo"),
            delta_line("after done")
        );
        let bytes = futures::stream::iter(vec![Ok::<_, LlmError>(body.into_bytes())]);

        let parts: Vec<String> = collect(text_deltas(bytes)).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(parts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_text_deltas_handles_split_frames() {
        let body = format!("{}{}", delta_line("\u{e9}t\u{e9}"), delta_line(" ok"));
        let raw = body.into_bytes();
        let chunks: Vec<Result<Vec<u8>, LlmError>> = raw.chunks(3).map(|c| Ok(c.to_vec())).collect();

        let parts: Vec<String> = collect(text_deltas(futures::stream::iter(chunks)))
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(parts.concat(), "\u{e9}t\u{e9} ok");
    }

    #[tokio::test]
    async fn test_text_deltas_surfaces_transport_error() {
        let items: Vec<Result<Vec<u8>, LlmError>> = vec![
            Ok(delta_line("partial").into_bytes()),
            Err(LlmError::InvalidResponse("connection reset".to_string())),
            Ok(delta_line("never").into_bytes()),
        ];

        let results = collect(text_deltas(futures::stream::iter(items))).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "partial");
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn test_complete_stream_against_local_model() {
        let body = format!("{}{}data: [DONE]\n\n", delta_line("```json\n["), delta_line("\"q1\"]\n```"));
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let body = body.clone();
                async move { ([(header::CONTENT_TYPE, "text/event-stream")], body) }
            }),
        );
        let base = spawn_model(app).await;

        let client = OpenAIClient::from_config(&test_config(&base)).unwrap();
        let stream = client.complete_stream(CompletionRequest::new("go")).await.unwrap();
        let parts: Vec<String> = collect(stream).await.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(parts.concat(), "```json\n[\"q1\"]\n```");
    }

    #[tokio::test]
    async fn test_complete_stream_upstream_500() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "overloaded").into_response() }),
        );
        let base = spawn_model(app).await;

        let client = OpenAIClient::from_config(&test_config(&base)).unwrap();
        let err = client.complete_stream(CompletionRequest::new("go")).await.err().unwrap();

        match err {
            LlmError::ApiError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_stream_empty_body() {
        let app = Router::new().route("/v1/chat/completions", post(|| async { StatusCode::OK }));
        let base = spawn_model(app).await;

        let client = OpenAIClient::from_config(&test_config(&base)).unwrap();
        let err = client.complete_stream(CompletionRequest::new("go")).await.err().unwrap();
        assert!(matches!(err, LlmError::NoBody));
    }

    #[tokio::test]
    async fn test_complete_reads_lm_studio_variant() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { axum::Json(serde_json::json!({ "response": "plain answer" })) }),
        );
        let base = spawn_model(app).await;

        let client = OpenAIClient::from_config(&test_config(&base)).unwrap();
        let text = client.complete(CompletionRequest::new("go")).await.unwrap();
        assert_eq!(text, "plain answer");
    }

    #[tokio::test]
    async fn test_complete_without_content_is_invalid() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { axum::Json(serde_json::json!({ "choices": [] })) }),
        );
        let base = spawn_model(app).await;

        let client = OpenAIClient::from_config(&test_config(&base)).unwrap();
        let err = client.complete(CompletionRequest::new("go")).await.unwrap_err();
        assert!(err.to_string().contains("No content in LLM response"));
    }
}
