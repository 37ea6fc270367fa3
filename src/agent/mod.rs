//! Agent module - the question answering loop.
//!
//! The agent follows a "reason, act, observe" pattern:
//! 1. Prompt the model with the question and the reasoning chain so far
//! 2. Stream its reply until it writes an `Action: Tool[params]` line
//! 3. Run the tool and append its (budget-trimmed) result to the prompt
//! 4. Repeat until the model writes a `Conclusion:` or the action limit is hit

mod action;
mod agent_loop;
mod budget;
mod prompt;

pub use action::{has_conclusion, Action};
pub use agent_loop::{Agent, TurnConfig};
pub use budget::{fit_result, truncation_note, TokenBudget, Truncation};
pub use prompt::{build_system_prompt, load_template, DEFAULT_TEMPLATE};
