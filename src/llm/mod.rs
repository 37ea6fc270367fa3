//! Model adapters.
//!
//! Every provider is reduced to the same contract: count tokens, stream a
//! completion for `(system message, history, prompt)`, and pull the text out
//! of each provider-specific chunk. Streams are cancellable so the agent can
//! stop generation the moment it sees an action.

mod anthropic;
mod huggingface;
mod openai;
#[cfg(test)]
pub(crate) mod scripted;
mod sse;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

pub use anthropic::AnthropicModel;
pub use huggingface::{format_llama2_prompt, HuggingFaceLlama2Model};
pub use openai::OpenAiModel;

/// Prior `(user_message, assistant_response)` pairs of a conversation.
pub type History = [(String, String)];

#[derive(Debug, Error)]
pub enum LlmError {
    /// Credentials for the provider are not configured. The message tells the
    /// user how to set them up.
    #[error("{0}")]
    MissingCredentials(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),
}

/// One raw event from a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub payload: Value,
}

impl StreamChunk {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// A provider stream that can be abandoned mid-generation.
///
/// Cancelling drops the underlying stream, which closes the HTTP connection
/// and stops the provider from generating the rest of the response.
pub struct CompletionStream {
    inner: Option<ChunkStream>,
}

impl CompletionStream {
    pub fn new(inner: ChunkStream) -> Self {
        Self { inner: Some(inner) }
    }

    /// Next chunk, or `None` once the stream ended or was cancelled.
    pub async fn next_chunk(&mut self) -> Option<Result<StreamChunk, LlmError>> {
        match self.inner.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    /// Stop consuming the stream and release its transport.
    pub fn cancel(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!("Cancelled model stream");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_none()
    }
}

/// Common interface for all chat model providers.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Provider-side model identifier.
    fn model_id(&self) -> &str;

    /// Size of the context window in tokens.
    fn context_size(&self) -> usize;

    /// Count the tokens in `text`.
    fn count_tokens(&self, text: &str) -> Result<usize, LlmError>;

    /// Start streaming a completion for `prompt` as the newest user turn.
    async fn stream(
        &self,
        system_message: &str,
        prompt: &str,
        history: &History,
        temperature: f32,
    ) -> Result<CompletionStream, LlmError>;

    /// Text carried by a chunk, if any.
    fn extract_text(&self, chunk: &StreamChunk) -> Option<String>;
}

/// Rough token estimate: ~4 characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Display names mapped to adapters, in presentation order.
#[derive(Default)]
pub struct ModelCatalog {
    models: Vec<(String, Arc<dyn ModelAdapter>)>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock models. Providers without credentials are still listed; they
    /// fail with setup instructions when used.
    pub fn from_config(config: &Config) -> Self {
        let max_tokens = config.max_response_tokens;
        let keys = &config.keys;

        let mut catalog = Self::new();
        catalog.insert(
            "LLaMA 2",
            HuggingFaceLlama2Model::new(
                "meta-llama/Llama-2-70b-chat-hf",
                4096,
                keys.huggingface.clone(),
                max_tokens,
            ),
        );
        catalog.insert(
            "GPT-3.5",
            OpenAiModel::new("gpt-3.5-turbo-16k", 16384, keys.openai.clone(), max_tokens),
        );
        catalog.insert(
            "GPT-4",
            OpenAiModel::new("gpt-4", 8192, keys.openai.clone(), max_tokens),
        );
        catalog.insert(
            "Claude 2",
            AnthropicModel::new("claude-2.1", 100_000, keys.anthropic.clone(), max_tokens),
        );
        catalog
    }

    /// Add or replace a model under `name`.
    pub fn insert<M: ModelAdapter + 'static>(&mut self, name: impl Into<String>, model: M) {
        self.insert_arc(name, Arc::new(model));
    }

    pub fn insert_arc(&mut self, name: impl Into<String>, model: Arc<dyn ModelAdapter>) {
        let name = name.into();
        match self.models.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = model,
            None => self.models.push((name, model)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelAdapter>> {
        self.models
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, model)| Arc::clone(model))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|(existing, _)| existing == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ModelAdapter>)> {
        self.models.iter().map(|(name, model)| (name.as_str(), model))
    }
}
