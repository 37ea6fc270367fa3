//! System message template for the agent.

use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;

use crate::tools::ToolRegistry;

const CURRENT_DATE: &str = "{{CURRENT_DATE}}";
const TOOLS_PROMPT: &str = "{{TOOLS_PROMPT}}";

/// Built-in template, used when no template file is configured.
pub const DEFAULT_TEMPLATE: &str = r#"You are a helpful assistant that answers questions by reasoning step by step and using tools. Today's date is {{CURRENT_DATE}}.

Answer the question using the following format:

Question: the question you must answer
Thought: think about what to do next
Action: the tool to call and its input, written as ToolName[input]
Result: the result of the action
... (Thought/Action/Result can repeat as many times as needed)
Thought: I now know the answer
Conclusion: the final answer to the question

Rules:
- Write each Action on a line of its own and stop after it. The Result will be provided to you.
- Only call one tool per Action.
- When you know the answer, write it after "Conclusion:".
- If a tool returns an error, try a different approach.

You have access to the following tools:

{{TOOLS_PROMPT}}"#;

/// Read the template at `path`, or the built-in one.
pub fn load_template(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template {}", path.display())),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

/// Fill in today's date (e.g. `October 18, 2026`) and the tool list.
pub fn build_system_prompt(template: &str, tools: &ToolRegistry, today: NaiveDate) -> String {
    template
        .replace(CURRENT_DATE, &today.format("%B %d, %Y").to_string())
        .replace(TOOLS_PROMPT, &tools.describe_all())
}
