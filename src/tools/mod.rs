//! Tools the agent can call.
//!
//! A tool is called from model output as `Name[params]`: a single raw
//! parameter string, and a plain-text result that is fed back to the model.
//! Tools never fail; errors are reported in the returned text.

mod calculate;
mod fetch;
mod web;

use std::sync::Arc;

use async_trait::async_trait;

pub use calculate::{evaluate, Calculate, EvalError, Number};
pub use fetch::{
    page_fetcher, Browser, FetchError, HttpFetcher, PageFetcher, WebDriverFetcher,
    SUPPORTED_BROWSERS,
};
pub use web::{GetWebPage, GoogleSearch};

/// Information about an available tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool.
    fn name(&self) -> &str;

    /// Declared parameter names, in order. Shown to the model only.
    fn parameters(&self) -> &[&'static str];

    fn description(&self) -> &str;

    /// Run the tool on the raw parameter string.
    async fn execute(&self, params: &str) -> String;
}

/// Ordered table of tools, keyed by unique name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tools offered to the model at startup.
    pub fn with_default_tools(fetcher: Arc<dyn PageFetcher>) -> Self {
        let mut registry = Self::new();
        registry.register(Calculate);
        registry.register(GoogleSearch::new(Arc::clone(&fetcher)));
        registry.register(GetWebPage::new(fetcher));
        registry
    }

    /// Register a tool. A tool with the same name is replaced in place.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(existing) => {
                tracing::warn!(tool = tool.name(), "Replacing already registered tool");
                *existing = tool;
            }
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// One `* Name[ p1,p2 ] - description` line per tool, in registration order.
    pub fn describe_all(&self) -> String {
        self.tools
            .iter()
            .map(|tool| {
                format!(
                    "* {}[ {} ] - {}\n",
                    tool.name(),
                    tool.parameters().join(","),
                    tool.description()
                )
            })
            .collect()
    }

    /// Call `name` with `raw_params`. Surrounding double quotes are stripped
    /// from the parameters; unknown names produce an in-band message.
    pub async fn invoke(&self, name: &str, raw_params: &str) -> String {
        let params = raw_params.trim_matches('"');
        match self.get(name) {
            Some(tool) => {
                tracing::info!(tool = name, params, "Invoking tool");
                tool.execute(params).await
            }
            None => {
                tracing::warn!(tool = name, "Model called an unknown tool");
                format!("{}[] is not a valid tool", name)
            }
        }
    }
}
