//! HTTP routes.
//!
//! `POST /api/chat` streams the agent's display text as Server-Sent Events:
//! one `snapshot` event per change, then a single `done` event carrying the
//! final text. Turn failures arrive in-band as the last snapshot.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::{Agent, TurnConfig};
use crate::config::Config;
use crate::tools::page_fetcher;

use super::types::{
    ChatRequest, ExamplesResponse, HealthResponse, ModelInfo, ModelsResponse, SnapshotEvent,
    ToolsResponse,
};

const EXAMPLES: &[&str] = &[
    "How much can I earn on $10k in savings this year?",
    "Find a coffeeshop halfway between Burlingame and Palo Alto",
    "Should I go to the beach in Santa Cruz tomorrow?",
    "Who are the top 5 contenders for the Republican presidential nomination?",
    "What is the cause of the conflict between Zuck and Elon?",
    "Summarize today's NYT headlines",
];

/// Shared server state.
pub struct AppState {
    pub config: Config,
    pub agent: Agent,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/models", get(list_models))
        .route("/api/tools", get(list_tools))
        .route("/api/examples", get(list_examples))
        .route("/api/chat", post(chat))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the agent and serve the API until Ctrl-C.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let fetcher = page_fetcher(config.browser, &config.webdriver_url)?;
    let agent = Agent::from_config(&config, Arc::clone(&fetcher))?;

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState { config, agent });

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    fetcher.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let models = state
        .agent
        .models()
        .iter()
        .map(|(name, model)| ModelInfo {
            name: name.to_string(),
            model_id: model.model_id().to_string(),
            context_size: model.context_size(),
        })
        .collect();

    Json(ModelsResponse {
        default_model: state.config.default_model.clone(),
        models,
    })
}

async fn list_tools(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.agent.tools().describe_all(),
    })
}

async fn list_examples() -> Json<ExamplesResponse> {
    Json(ExamplesResponse {
        examples: EXAMPLES.to_vec(),
    })
}

/// Per-turn settings from the request, falling back to the server defaults.
pub fn resolve_turn(
    config: &Config,
    request: &ChatRequest,
) -> Result<TurnConfig, (StatusCode, String)> {
    if request.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must not be empty".to_string()));
    }

    let temperature = request.temperature.unwrap_or(config.temperature);
    if !(0.0..=1.0).contains(&temperature) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("temperature must be between 0 and 1, got {}", temperature),
        ));
    }

    let max_iterations = request.max_iterations.unwrap_or(config.max_iterations);
    if max_iterations == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "max_iterations must be at least 1".to_string(),
        ));
    }

    Ok(TurnConfig {
        model: request
            .model
            .clone()
            .unwrap_or_else(|| config.default_model.clone()),
        temperature,
        max_iterations,
    })
}

/// Answer a question, streaming the reasoning chain.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let turn = resolve_turn(&state.config, &request)?;
    tracing::info!(model = %turn.model, history = request.history.len(), "Chat request");

    let snapshots = state
        .agent
        .generate(&request.message, request.history, turn);

    let stream = async_stream::stream! {
        let mut snapshots = Box::pin(snapshots);
        let mut last = String::new();

        while let Some(text) = snapshots.next().await {
            match Event::default()
                .event("snapshot")
                .json_data(SnapshotEvent { text: text.clone() })
            {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize snapshot event; dropping");
                }
            }
            last = text;
        }

        match Event::default().event("done").json_data(SnapshotEvent { text: last }) {
            Ok(event) => yield Ok(event),
            Err(e) => tracing::error!(error = %e, "Failed to serialize done event"),
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedModel;
    use crate::llm::ModelCatalog;
    use crate::tools::{Calculate, ToolRegistry};

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            history: Vec::new(),
            model: None,
            temperature: None,
            max_iterations: None,
        }
    }

    #[test]
    fn resolve_turn_uses_server_defaults() {
        let config = Config::new("GPT-4".to_string());
        let turn = resolve_turn(&config, &request("hi")).expect("valid request");
        assert_eq!(
            turn,
            TurnConfig {
                model: "GPT-4".to_string(),
                temperature: 0.1,
                max_iterations: 10,
            }
        );
    }

    #[test]
    fn resolve_turn_applies_overrides() {
        let config = Config::new("GPT-4".to_string());
        let mut req = request("hi");
        req.model = Some("Claude 2".to_string());
        req.temperature = Some(0.0);
        req.max_iterations = Some(3);

        let turn = resolve_turn(&config, &req).expect("valid request");
        assert_eq!(turn.model, "Claude 2");
        assert_eq!(turn.temperature, 0.0);
        assert_eq!(turn.max_iterations, 3);
    }

    #[test]
    fn resolve_turn_rejects_bad_input() {
        let config = Config::new("GPT-4".to_string());

        let (status, _) = resolve_turn(&config, &request("  ")).unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut hot = request("hi");
        hot.temperature = Some(1.5);
        assert!(resolve_turn(&config, &hot).is_err());

        let mut none = request("hi");
        none.max_iterations = Some(0);
        assert!(resolve_turn(&config, &none).is_err());
    }

    #[test]
    fn chat_request_accepts_history_pairs() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"message": "and now?", "history": [["hi", "hello"]], "model": "GPT-4"}"#,
        )
        .expect("request parses");
        assert_eq!(req.history, vec![("hi".to_string(), "hello".to_string())]);
        assert_eq!(req.model.as_deref(), Some("GPT-4"));
        assert!(req.temperature.is_none());
    }

    async fn spawn_server(model: ScriptedModel) -> String {
        let mut models = ModelCatalog::new();
        models.insert("Scripted", model);
        let mut tools = ToolRegistry::new();
        tools.register(Calculate);
        let agent = Agent::new(models, tools, "sys", 0.8);
        let state = Arc::new(AppState {
            config: Config::new("Scripted".to_string()),
            agent,
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.expect("server runs");
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn models_and_tools_are_listed() {
        let base = spawn_server(ScriptedModel::new(4096)).await;
        let client = reqwest::Client::new();

        let models: serde_json::Value = client
            .get(format!("{}/api/models", base))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(models["default_model"], "Scripted");
        assert_eq!(models["models"][0]["context_size"], 4096);

        let tools: serde_json::Value = client
            .get(format!("{}/api/tools", base))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert!(tools["tools"]
            .as_str()
            .is_some_and(|t| t.starts_with("* Calculate[ expression ]")));

        let health: serde_json::Value = client
            .get(format!("{}/api/health", base))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(health["status"], "ok");
    }

    #[tokio::test]
    async fn chat_streams_snapshots_then_done() {
        let model = ScriptedModel::new(4096)
            .reply(&["Action: Calculate[6*7]\n"])
            .reply(&["Conclusion: 42"]);
        let base = spawn_server(model).await;

        let body = reqwest::Client::new()
            .post(format!("{}/api/chat", base))
            .json(&serde_json::json!({"message": "6 times 7?"}))
            .send()
            .await
            .expect("request")
            .text()
            .await
            .expect("body");

        assert!(body.contains("event: snapshot\ndata: {\"text\":\"Action: Calculate[6*7]\\n\"}"));
        let done = body.find("event: done").expect("done event");
        assert!(body[done..].contains(r#"{"text":"Action: Calculate[6*7]\nConclusion: 42"}"#));
        assert_eq!(body.matches("event: done").count(), 1);
    }

    #[tokio::test]
    async fn chat_rejects_empty_message() {
        let base = spawn_server(ScriptedModel::new(4096)).await;
        let response = reqwest::Client::new()
            .post(format!("{}/api/chat", base))
            .json(&serde_json::json!({"message": ""}))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_reports_unknown_model_in_band() {
        let base = spawn_server(ScriptedModel::new(4096)).await;
        let body = reqwest::Client::new()
            .post(format!("{}/api/chat", base))
            .json(&serde_json::json!({"message": "hi", "model": "Nope"}))
            .send()
            .await
            .expect("request")
            .text()
            .await
            .expect("body");
        assert!(body.contains(r#"Error: Unknown model: Nope"#));
    }
}
