//! OpenAI chat completions.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::sse::json_event_stream;
use super::{estimate_tokens, CompletionStream, History, LlmError, ModelAdapter, StreamChunk};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const MISSING_KEY_HINT: &str = "This model will be run from www.openai.com - Please obtain an API key from https://platform.openai.com/account/api-keys and then set the following environment variable before running this app:\n```\nexport OPENAI_API_KEY=<your key>\n```";

/// Interface for OpenAI's GPT models.
pub struct OpenAiModel {
    client: Client,
    model: String,
    context_size: usize,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
}

impl OpenAiModel {
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

    /// Point the adapter at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// System message, then alternating history turns, then the new prompt.
fn build_messages(system_message: &str, prompt: &str, history: &History) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 2);
    messages.push(json!({ "role": "system", "content": system_message }));
    for (user_message, assistant_response) in history {
        messages.push(json!({ "role": "user", "content": user_message }));
        messages.push(json!({ "role": "assistant", "content": assistant_response }));
    }
    messages.push(json!({ "role": "user", "content": prompt }));
    messages
}

#[async_trait]
impl ModelAdapter for OpenAiModel {
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
            "messages": build_messages(system_message, prompt, history),
            "temperature": temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body);

        let chunks = json_event_stream("OpenAI", request, |_, data| {
            data.trim() == "[DONE]"
        })?;
        Ok(CompletionStream::new(chunks))
    }

    fn extract_text(&self, chunk: &StreamChunk) -> Option<String> {
        chunk.payload["choices"][0]["delta"]["content"]
            .as_str()
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}
