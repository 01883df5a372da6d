use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::error::{ResearchError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Output shape requested from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonSchema { name: String, schema: Value },
}

impl ResponseFormat {
    fn to_body(&self) -> Option<Value> {
        match self {
            ResponseFormat::Text => None,
            ResponseFormat::JsonSchema { name, schema } => Some(serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": name, "schema": schema },
            })),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Short label of the calling stage, used for logging.
    pub stage: &'static str,
    pub messages: Vec<Message>,
    pub format: ResponseFormat,
}

/// Incremental output forwarded while a completion streams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamDelta<'a> {
    Reasoning(&'a str),
    Content(&'a str),
    Done,
}

/// Receives the calling stage label with each delta.
pub type StreamSink = Arc<dyn Fn(&str, StreamDelta<'_>) + Send + Sync>;

/// The chat-completion boundary every stage talks through.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// Ask for a JSON object and decode it, recovering from surrounding prose.
pub async fn complete_json(
    model: &dyn ChatModel,
    stage: &'static str,
    messages: Vec<Message>,
    schema_name: &str,
    schema: Value,
) -> Result<Value> {
    let text = model
        .complete(ChatRequest {
            stage,
            messages,
            format: ResponseFormat::JsonSchema {
                name: schema_name.to_string(),
                schema,
            },
        })
        .await?;
    parse_json_lenient(&text)
}

/// Parse model output as JSON. On failure, retry on the span between the
/// first `{` and the last `}`.
pub fn parse_json_lenient(text: &str) -> Result<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(v);
    }
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => serde_json::from_str(&text[s..=e]).map_err(|err| {
            ResearchError::Decode(format!("model output is not JSON: {}", err))
        }),
        _ => Err(ResearchError::Decode(format!(
            "no JSON object in model output ({} chars)",
            text.len()
        ))),
    }
}

/// OpenAI-compatible chat client (SiliconFlow by default).
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
    stream: bool,
    show_think: bool,
    sink: Option<StreamSink>,
}

impl LlmClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings.llm_api_key.clone().ok_or_else(|| {
            ResearchError::Configuration("SILICONFLOW_API_KEY (or LLM_API_KEY) missing".into())
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ResearchError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.llm_base_url.clone(),
            model: settings.chat_model.clone(),
            api_key,
            temperature: settings.temperature,
            stream: settings.stream,
            show_think: settings.show_think,
            sink: None,
        })
    }

    /// Forward streamed deltas (reasoning and content) to `sink`.
    pub fn with_sink(mut self, sink: StreamSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    fn body(&self, request: &ChatRequest) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": self.temperature,
            "stream": self.stream,
        });
        if self.show_think {
            // Reasoning output and a bound response_format don't mix on the
            // provider side; the lenient JSON parse covers the difference.
            body["include_reasoning"] = Value::Bool(true);
            body["thinking_budget"] = Value::from(1024);
        } else if let Some(format) = request.format.to_body() {
            body["response_format"] = format;
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ResearchError::ServiceUnavailable(format!("LLM request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(300).collect();
            return Err(ResearchError::ServiceUnavailable(format!(
                "LLM returned {}: {}",
                status, snippet
            )));
        }
        Ok(resp)
    }

    async fn complete_once(&self, body: &Value) -> Result<String> {
        let resp = self.send(body).await?;
        let json: Value = resp
            .json()
            .await
            .map_err(|e| ResearchError::Decode(format!("LLM response body: {}", e)))?;

        // choices[0].message.content may be null
        Ok(json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("")
            .to_string())
    }

    async fn complete_streaming(&self, stage: &str, body: &Value) -> Result<String> {
        let resp = self.send(body).await?;
        let mut bytes = Box::pin(resp.bytes_stream());
        let mut decoder = SseDecoder::default();
        let mut answer = String::new();

        'outer: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| {
                ResearchError::ServiceUnavailable(format!("LLM stream interrupted: {}", e))
            })?;
            for event in decoder.push(&chunk) {
                match event {
                    SseEvent::Done => break 'outer,
                    SseEvent::Data(data) => {
                        let Some(delta) = parse_stream_delta(&data) else {
                            continue;
                        };
                        if let (Some(rc), Some(sink)) = (&delta.reasoning, &self.sink) {
                            if self.show_think {
                                sink(stage, StreamDelta::Reasoning(rc));
                            }
                        }
                        if let Some(text) = &delta.content {
                            if let Some(sink) = &self.sink {
                                sink(stage, StreamDelta::Content(text));
                            }
                            answer.push_str(text);
                        }
                    }
                }
            }
        }

        if let Some(sink) = &self.sink {
            sink(stage, StreamDelta::Done);
        }
        Ok(answer)
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let body = self.body(&request);
        debug!(
            stage = request.stage,
            model = %self.model,
            messages = request.messages.len(),
            stream = self.stream,
            "─── LLM Request ───"
        );

        let text = if self.stream {
            self.complete_streaming(request.stage, &body).await?
        } else {
            self.complete_once(&body).await?
        };

        debug!(stage = request.stage, response_len = text.len(), "─── LLM Response ───");
        Ok(text)
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits a server-sent-event byte stream into `data:` payloads.
///
/// Buffers raw bytes so multi-byte characters split across chunks survive.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = String::from_utf8_lossy(&self.buffer[..line_end])
                .trim()
                .to_string();
            self.buffer.drain(..=line_end);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !data.is_empty() {
                events.push(SseEvent::Data(data.to_string()));
            }
        }
        events
    }
}

#[derive(Debug, Default, PartialEq)]
struct ChunkDelta {
    content: Option<String>,
    reasoning: Option<String>,
}

fn parse_stream_delta(data: &str) -> Option<ChunkDelta> {
    let json: Value = serde_json::from_str(data).ok()?;
    let delta = json["choices"].get(0)?.get("delta")?;
    let pick = |key: &str| {
        delta[key]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Some(ChunkDelta {
        content: pick("content"),
        reasoning: pick("reasoning_content"),
    })
}
