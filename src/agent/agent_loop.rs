//! Core agent loop implementation.

use std::sync::Arc;

use futures::Stream;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::{History, LlmError, ModelAdapter, ModelCatalog};
use crate::tools::{PageFetcher, ToolRegistry};

use super::action::{has_conclusion, Action};
use super::budget::{fit_result, truncation_note, TokenBudget};
use super::prompt::{build_system_prompt, load_template};

/// Per-turn settings chosen by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnConfig {
    /// Display name in the model catalog.
    pub model: String,
    pub temperature: f32,
    pub max_iterations: usize,
}

/// The reasoning agent.
///
/// Each call to [`Agent::generate`] answers one question by streaming model
/// output, running the tool named by the first `Action:` line it sees, and
/// prompting again with the result until the model concludes or the action
/// limit is hit.
#[derive(Clone)]
pub struct Agent {
    models: Arc<ModelCatalog>,
    tools: Arc<ToolRegistry>,
    system_message: Arc<str>,
    context_fraction: f64,
}

/// State an action leaves for the next prompt.
struct ActionOutcome {
    prompt: String,
    percent_shown: Option<i64>,
}

impl Agent {
    pub fn new(
        models: ModelCatalog,
        tools: ToolRegistry,
        system_message: impl Into<Arc<str>>,
        context_fraction: f64,
    ) -> Self {
        Self {
            models: Arc::new(models),
            tools: Arc::new(tools),
            system_message: system_message.into(),
            context_fraction,
        }
    }

    /// Wire up the stock models, the default tools and the system message.
    pub fn from_config(config: &Config, fetcher: Arc<dyn PageFetcher>) -> anyhow::Result<Self> {
        let models = ModelCatalog::from_config(config);
        if !models.contains(&config.default_model) {
            anyhow::bail!("Unknown default model '{}'", config.default_model);
        }

        let tools = ToolRegistry::with_default_tools(fetcher);

        let template = load_template(config.prompt_template_path.as_deref())?;
        let today = chrono::Local::now().date_naive();
        let system_message = build_system_prompt(&template, &tools, today);
        tracing::debug!(system_message = %system_message, "Built system message");

        Ok(Self::new(models, tools, system_message, config.context_fraction))
    }

    pub fn models(&self) -> &ModelCatalog {
        &self.models
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    /// Answer `question`, yielding the whole display text after every change.
    ///
    /// The display text is the model's reasoning chain without the question
    /// and without raw tool results. Every element extends the previous one;
    /// the last is the final answer. Failures end the turn with an
    /// `Error:` line instead of an `Err`.
    pub fn generate(
        &self,
        question: &str,
        history: Vec<(String, String)>,
        turn: TurnConfig,
    ) -> impl Stream<Item = String> + Send + 'static {
        let agent = self.clone();
        let question = question.to_string();
        let turn_id = Uuid::new_v4();

        async_stream::stream! {
            let mut full_response = String::new();

            tracing::info!(turn_id = %turn_id, model = %turn.model, "Starting turn");

            let (model, context_tokens) = match agent.prepare(&turn, &history) {
                Ok(prepared) => prepared,
                Err(e) => {
                    yield fail(&mut full_response, turn_id, e);
                    return;
                }
            };
            let budget = TokenBudget::new(model.context_size(), agent.context_fraction);

            let mut prompt = format!("Question: {}\n\n", question);
            let mut iteration = 1;

            loop {
                tracing::debug!(turn_id = %turn_id, iteration, prompt = %prompt, "Prompting model");

                let mut completion = match model
                    .stream(&agent.system_message, &prompt, &history, turn.temperature)
                    .await
                {
                    Ok(completion) => completion,
                    Err(e) => {
                        yield fail(&mut full_response, turn_id, e);
                        return;
                    }
                };

                let mut partial_response = String::new();

                while let Some(chunk) = completion.next_chunk().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            yield fail(&mut full_response, turn_id, e);
                            return;
                        }
                    };
                    let Some(text) = model.extract_text(&chunk).filter(|t| !t.is_empty()) else {
                        continue;
                    };

                    full_response.push_str(&text);
                    partial_response.push_str(&text);
                    yield full_response.clone();

                    // Stop generating at the first complete action and run it.
                    let Some(action) = Action::find(&partial_response) else {
                        continue;
                    };
                    completion.cancel();

                    let outcome = agent
                        .act(&*model, &action, &question, &full_response, context_tokens, budget, turn_id)
                        .await;
                    let outcome = match outcome {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            yield fail(&mut full_response, turn_id, e);
                            return;
                        }
                    };
                    prompt = outcome.prompt;
                    if let Some(percent_shown) = outcome.percent_shown {
                        full_response.push_str(&truncation_note(percent_shown));
                        yield full_response.clone();
                    }
                    break;
                }

                if has_conclusion(&partial_response) || Action::find(&partial_response).is_none() {
                    tracing::info!(turn_id = %turn_id, iterations = iteration, "Turn finished");
                    return;
                }

                if !partial_response.ends_with('\n') {
                    full_response.push_str("\n\n");
                    yield full_response.clone();
                }

                if iteration >= turn.max_iterations {
                    tracing::warn!(turn_id = %turn_id, max_iterations = turn.max_iterations, "Action limit reached");
                    full_response.push_str(&format!(
                        "Stopping after running {} actions.",
                        turn.max_iterations
                    ));
                    yield full_response.clone();
                    return;
                }
                iteration += 1;
            }
        }
    }

    /// Resolve the model and count the tokens every prompt starts with.
    fn prepare(
        &self,
        turn: &TurnConfig,
        history: &History,
    ) -> Result<(Arc<dyn ModelAdapter>, usize), LlmError> {
        let model = self
            .models
            .get(&turn.model)
            .ok_or_else(|| LlmError::UnknownModel(turn.model.clone()))?;

        let mut tokens = model.count_tokens(&self.system_message)?;
        for (user_message, assistant_response) in history {
            tokens += model.count_tokens(user_message)? + model.count_tokens(assistant_response)?;
        }
        Ok((model, tokens))
    }

    /// Run `action` and build the next prompt around its (possibly cut)
    /// result.
    #[allow(clippy::too_many_arguments)]
    async fn act(
        &self,
        model: &dyn ModelAdapter,
        action: &Action,
        question: &str,
        full_response: &str,
        context_tokens: usize,
        budget: TokenBudget,
        turn_id: Uuid,
    ) -> Result<ActionOutcome, LlmError> {
        let result = self.tools.invoke(&action.tool, &action.params).await;

        let mut prompt = format!("Question: {}\n\n{}\n\n", question, full_response);

        let prompt_tokens = model.count_tokens(&prompt)?;
        let result_tokens = model.count_tokens(&result)?;
        let available = budget.available(context_tokens + prompt_tokens);

        let fit = fit_result(&result, result_tokens, available);
        if fit.percent_shown.is_some() {
            if available <= 0 {
                tracing::warn!(turn_id = %turn_id, tool = %action.tool, available, "No room left for the tool result");
            } else {
                tracing::debug!(turn_id = %turn_id, tool = %action.tool, result_tokens, available, "Truncated tool result");
            }
        }

        prompt.push_str("Result: ");
        prompt.push_str(&fit.text);
        prompt.push_str("\n\n");

        Ok(ActionOutcome {
            prompt,
            percent_shown: fit.percent_shown,
        })
    }
}

/// Append the error to the display text and return the final snapshot.
fn fail(full_response: &mut String, turn_id: Uuid, error: LlmError) -> String {
    tracing::error!(turn_id = %turn_id, error = %error, "Turn failed");
    full_response.push_str(&format!("\nError: {}", error));
    full_response.clone()
}
