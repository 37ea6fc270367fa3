//! Anthropic messages API.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

use super::sse::json_event_stream;
use super::{estimate_tokens, CompletionStream, History, LlmError, ModelAdapter, StreamChunk};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

const MISSING_KEY_HINT: &str = "This model will be run from www.anthropic.com - Please obtain an API key from https://console.anthropic.com/account/keys and then set the following environment variable before running this app:\n```\nexport ANTHROPIC_API_KEY=<your key>\n```";

pub struct AnthropicModel {
    client: Client,
    model: String,
    context_size: usize,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicModel {
    pub fn new(
        model: impl Into<String>,
        context_size: usize,
        api_key: Option<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            context_size,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// The system message travels separately; history and the prompt alternate
/// user/assistant turns.
fn build_messages(prompt: &str, history: &History) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);
    for (user_message, assistant_response) in history {
        messages.push(json!({ "role": "user", "content": user_message }));
        messages.push(json!({ "role": "assistant", "content": assistant_response }));
    }
    messages.push(json!({ "role": "user", "content": prompt }));
    messages
}

/// An in-stream `error` event becomes an API error.
fn check_error_event(chunk: StreamChunk) -> Result<StreamChunk, LlmError> {
    if chunk.payload["type"] != "error" {
        return Ok(chunk);
    }
    let error = &chunk.payload["error"];
    Err(LlmError::Api {
        provider: "Anthropic",
        status: 200,
        body: format!(
            "{}: {}",
            error["type"].as_str().unwrap_or("error"),
            error["message"].as_str().unwrap_or_default()
        ),
    })
}

#[async_trait]
impl ModelAdapter for AnthropicModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn count_tokens(&self, text: &str) -> Result<usize, LlmError> {
        Ok(estimate_tokens(text))
    }

    async fn stream(
        &self,
        system_message: &str,
        prompt: &str,
        history: &History,
        temperature: f32,
    ) -> Result<CompletionStream, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingCredentials(MISSING_KEY_HINT.to_string()))?;

        let body = json!({
            "model": self.model,
            "system": system_message,
            "messages": build_messages(prompt, history),
            "temperature": temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        let request = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let chunks = json_event_stream("Anthropic", request, |event, _| {
            event == "message_stop"
        })?;
        let chunks = chunks.map(|chunk| chunk.and_then(check_error_event));
        Ok(CompletionStream::new(Box::pin(chunks)))
    }

    fn extract_text(&self, chunk: &StreamChunk) -> Option<String> {
        let payload = &chunk.payload;
        if payload["type"] != "content_block_delta" || payload["delta"]["type"] != "text_delta" {
            return None;
        }
        payload["delta"]["text"]
            .as_str()
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn system_message_is_not_a_turn() {
        let history = vec![("hi".to_string(), "hello".to_string())];
        let messages = build_messages("Question: q\n\n", &history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[2]["content"], "Question: q\n\n");
    }

    #[test]
    fn extract_text_reads_text_deltas_only() {
        let model = AnthropicModel::new("claude-2.1", 100_000, None, 10);
        let delta = StreamChunk::new(json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "Thought:"}
        }));
        assert_eq!(model.extract_text(&delta).as_deref(), Some("Thought:"));

        let start = StreamChunk::new(json!({"type": "message_start", "message": {}}));
        assert_eq!(model.extract_text(&start), None);
    }

    #[tokio::test]
    async fn stream_without_key_reports_setup_instructions() {
        let model = AnthropicModel::new("claude-2.1", 100_000, None, 10);
        let err = model
            .stream("system", "prompt", &[], 0.1)
            .await
            .err()
            .expect("missing key should fail");
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn stream_reads_deltas_and_error_events() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Conclusion: \"}}\n\n",
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({"system": "system", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let model = AnthropicModel::new("claude-2.1", 100_000, Some("test-key".to_string()), 10)
            .with_base_url(server.uri());
        let mut completion = model
            .stream("system", "prompt", &[], 0.1)
            .await
            .expect("stream opens");

        let mut text = String::new();
        let mut error = None;
        while let Some(chunk) = completion.next_chunk().await {
            match chunk {
                Ok(chunk) => text.push_str(&model.extract_text(&chunk).unwrap_or_default()),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        assert_eq!(text, "Conclusion: ");
        let error = error.expect("error event surfaces");
        assert!(error.to_string().contains("Overloaded"));
    }
}
