//! LLaMA 2 chat models served by the Hugging Face inference API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::sse::json_event_stream;
use super::{estimate_tokens, CompletionStream, History, LlmError, ModelAdapter, StreamChunk};

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Text generation inference rejects a temperature of exactly zero.
const MIN_TEMPERATURE: f32 = 0.01;

const MISSING_TOKEN_HINT: &str = "This model will be run from www.huggingface.co inference API - Please sign up for a Hugging Face Pro account and obtain an access token from https://huggingface.co/settings/tokens and then run:\n```\nhuggingface-cli login\n```\nor set the following environment variable:\n```\nexport HUGGING_FACE_HUB_TOKEN=<your token>\n```";

pub struct HuggingFaceLlama2Model {
    client: Client,
    model: String,
    context_size: usize,
    token: Option<String>,
    base_url: String,
    max_tokens: u32,
}

impl HuggingFaceLlama2Model {
    pub fn new(
        model: impl Into<String>,
        context_size: usize,
        token: Option<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            context_size,
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Render a conversation in the LLaMA 2 chat format.
///
/// The system message shares the first `[INST]` block with the first user
/// message; every later user message opens its own block.
pub fn format_llama2_prompt(system_message: &str, prompt: &str, history: &History) -> String {
    let mut out = format!("[INST]<<SYS>>{}<</SYS>>\n\n", system_message);
    let mut first = true;

    for (user_message, assistant_response) in history {
        if !first {
            out.push_str("[INST]");
        }
        first = false;
        out.push_str(user_message);
        out.push_str("[/INST]");
        out.push_str(assistant_response);
        out.push_str("\n\n");
    }

    if !first {
        out.push_str("[INST]");
    }
    out.push_str(prompt);
    out.push_str("[/INST]");
    out
}

#[async_trait]
impl ModelAdapter for HuggingFaceLlama2Model {
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
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| LlmError::MissingCredentials(MISSING_TOKEN_HINT.to_string()))?;

        let body = json!({
            "inputs": format_llama2_prompt(system_message, prompt, history),
            "parameters": {
                "temperature": temperature.max(MIN_TEMPERATURE),
                "max_new_tokens": self.max_tokens,
            },
            "stream": true,
        });

        let request = self
            .client
            .post(format!("{}/models/{}", self.base_url, self.model))
            .bearer_auth(token)
            .json(&body);

        // The server closes the stream after the final token.
        let chunks = json_event_stream("Hugging Face", request, |_, _| false)?;
        Ok(CompletionStream::new(chunks))
    }

    fn extract_text(&self, chunk: &StreamChunk) -> Option<String> {
        let token = &chunk.payload["token"];
        if token["special"].as_bool().unwrap_or(false) {
            return None;
        }
        token["text"]
            .as_str()
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn prompt_without_history() {
        assert_eq!(
            format_llama2_prompt("sys", "Question: q\n\n", &[]),
            "[INST]<<SYS>>sys<</SYS>>\n\nQuestion: q\n\n[/INST]"
        );
    }

    #[test]
    fn prompt_with_history_opens_new_blocks() {
        let history = vec![
            ("u1".to_string(), "a1".to_string()),
            ("u2".to_string(), "a2".to_string()),
        ];
        assert_eq!(
            format_llama2_prompt("sys", "u3", &history),
            "[INST]<<SYS>>sys<</SYS>>\n\nu1[/INST]a1\n\n[INST]u2[/INST]a2\n\n[INST]u3[/INST]"
        );
    }

    #[test]
    fn extract_text_skips_special_tokens() {
        let model = HuggingFaceLlama2Model::new("m", 4096, None, 10);
        let text = StreamChunk::new(json!({"token": {"id": 1, "text": " Thought", "special": false}}));
        assert_eq!(model.extract_text(&text).as_deref(), Some(" Thought"));

        let eos = StreamChunk::new(json!({"token": {"id": 2, "text": "</s>", "special": true}}));
        assert_eq!(model.extract_text(&eos), None);
    }

    #[tokio::test]
    async fn stream_without_token_reports_setup_instructions() {
        let model = HuggingFaceLlama2Model::new("m", 4096, None, 10);
        let err = model
            .stream("system", "prompt", &[], 0.1)
            .await
            .err()
            .expect("missing token should fail");
        assert!(err.to_string().contains("HUGGING_FACE_HUB_TOKEN"));
    }

    #[tokio::test]
    async fn stream_posts_formatted_prompt() {
        let server = MockServer::start().await;
        let body = concat!(
            "data:{\"token\":{\"id\":1,\"text\":\"Conclusion:\",\"special\":false},\"generated_text\":null}\n\n",
            "data:{\"token\":{\"id\":2,\"text\":\"</s>\",\"special\":true},\"generated_text\":\"Conclusion:\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/models/meta-llama/Llama-2-70b-chat-hf"))
            .and(body_partial_json(json!({
                "inputs": "[INST]<<SYS>>sys<</SYS>>\n\nq[/INST]",
                "parameters": {"temperature": MIN_TEMPERATURE},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let model = HuggingFaceLlama2Model::new(
            "meta-llama/Llama-2-70b-chat-hf",
            4096,
            Some("hf_token".to_string()),
            10,
        )
        .with_base_url(server.uri());
        let mut completion = model.stream("sys", "q", &[], 0.0).await.expect("stream opens");

        let mut text = String::new();
        while let Some(chunk) = completion.next_chunk().await {
            if let Some(fragment) = model.extract_text(&chunk.expect("chunk parses")) {
                text.push_str(&fragment);
            }
        }
        assert_eq!(text, "Conclusion:");
    }
}
