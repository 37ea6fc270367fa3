//! API request and response types.

use serde::{Deserialize, Serialize};

/// Request to answer a question.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// The new user message
    pub message: String,

    /// Prior `[user_message, assistant_response]` pairs
    #[serde(default)]
    pub history: Vec<(String, String)>,

    /// Optional model override (catalog display name)
    pub model: Option<String>,

    /// Optional sampling temperature override, in `[0, 1]`
    pub temperature: Option<f32>,

    /// Optional override of the action limit
    pub max_iterations: Option<usize>,
}

/// Payload of `snapshot` and `done` events: the whole display text so far.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEvent {
    pub text: String,
}

/// A model offered by the server.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Display name used in requests
    pub name: String,

    /// Provider-side model identifier
    pub model_id: String,

    /// Context window in tokens
    pub context_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub default_model: String,
    pub models: Vec<ModelInfo>,
}

/// The tool list exactly as the model sees it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
    pub tools: String,
}

/// Sample questions for the chat UI.
#[derive(Debug, Clone, Serialize)]
pub struct ExamplesResponse {
    pub examples: Vec<&'static str>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}
