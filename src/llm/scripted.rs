//! A model that replays canned replies, for driving the agent in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde_json::Value;

use super::{estimate_tokens, CompletionStream, History, LlmError, ModelAdapter, StreamChunk};

enum Reply {
    Fragments(Vec<String>),
    /// Stream some fragments, then fail.
    Broken(Vec<String>, String),
    /// Fail before any chunk is produced.
    Refused(String),
}

pub(crate) struct ScriptedModel {
    context_size: usize,
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
    consumed: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new(context_size: usize) -> Self {
        Self {
            context_size,
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            consumed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a reply streamed as the given fragments.
    pub fn reply(self, fragments: &[&str]) -> Self {
        self.push(Reply::Fragments(to_strings(fragments)))
    }

    pub fn reply_then_fail(self, fragments: &[&str], message: &str) -> Self {
        self.push(Reply::Broken(to_strings(fragments), message.to_string()))
    }

    pub fn refuse(self, message: &str) -> Self {
        self.push(Reply::Refused(message.to_string()))
    }

    fn push(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Prompts received so far, one per `stream` call.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Chunks actually pulled from the streams handed out.
    pub fn consumed_chunks(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }
}

fn to_strings(fragments: &[&str]) -> Vec<String> {
    fragments.iter().map(|f| f.to_string()).collect()
}

#[async_trait]
impl ModelAdapter for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn count_tokens(&self, text: &str) -> Result<usize, LlmError> {
        Ok(estimate_tokens(text))
    }

    async fn stream(
        &self,
        _system_message: &str,
        prompt: &str,
        _history: &History,
        _temperature: f32,
    ) -> Result<CompletionStream, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Stream("script exhausted".to_string()))?;

        let (fragments, failure) = match reply {
            Reply::Fragments(fragments) => (fragments, None),
            Reply::Broken(fragments, message) => (fragments, Some(message)),
            Reply::Refused(message) => return Err(LlmError::Stream(message)),
        };

        let consumed = Arc::clone(&self.consumed);
        let items = fragments
            .into_iter()
            .map(|fragment| Ok(StreamChunk::new(Value::String(fragment))))
            .chain(failure.map(|message| Err(LlmError::Stream(message))));
        let chunks = stream::iter(items).map(move |item| {
            consumed.fetch_add(1, Ordering::SeqCst);
            item
        });
        Ok(CompletionStream::new(Box::pin(chunks)))
    }

    fn extract_text(&self, chunk: &StreamChunk) -> Option<String> {
        chunk.payload.as_str().map(str::to_string)
    }
}
