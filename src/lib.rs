//! # askloop
//!
//! A question answering agent that reasons in a loop with tools.
//!
//! This library provides:
//! - An agent loop that streams model output, runs the tool named by each
//!   `Action:` line and feeds the result back until a `Conclusion:`
//! - Tools for arithmetic, web search and page retrieval
//! - HTML distillation that shrinks web pages to what a model needs
//! - Streaming adapters for OpenAI, Anthropic and Hugging Face models
//! - An HTTP API that streams the reasoning chain over Server-Sent Events
//!
//! ## Architecture
//!
//! Each question is answered in a turn:
//! 1. Prompt the model with `Question: ...` and the chain so far
//! 2. Stop the stream as soon as a complete `Action: Tool[params]` appears
//! 3. Run the tool, trim its result to the remaining context budget
//! 4. Prompt again with the result, until the model concludes
//!
//! ## Example
//!
//! ```rust,ignore
//! use askloop::agent::{Agent, TurnConfig};
//! use askloop::tools::page_fetcher;
//! use futures::StreamExt;
//!
//! let config = askloop::Config::from_env()?;
//! let agent = Agent::from_config(&config, page_fetcher(None, &config.webdriver_url)?)?;
//! let turn = TurnConfig { model: "GPT-4".into(), temperature: 0.1, max_iterations: 10 };
//! let mut snapshots = Box::pin(agent.generate("What is 2^10?", Vec::new(), turn));
//! while let Some(text) = snapshots.next().await {
//!     println!("{text}");
//! }
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod html;
pub mod llm;
pub mod tools;

pub use config::Config;
