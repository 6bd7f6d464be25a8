//! Orchestrator: one model pass per user message.
//!
//! A pass appends the user message, calls the model once with the history
//! and the current tool schema, runs every requested tool in order, and
//! appends a single assistant message. Tool results are recorded on that
//! message; they are not sent back to the model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::inference::{ContentBlock, LanguageModel, ModelRequest};

use super::conversation::Conversation;
use super::errors::AgentError;
use super::tool_router::ToolExecutor;
use super::types::{Message, ToolInvocationRecord};

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    model: Arc<dyn LanguageModel>,
    tools: Arc<dyn ToolExecutor>,
    conversation: Mutex<Conversation>,
    /// Set while a pass is in flight.
    busy: AtomicBool,
    /// User-facing text of the last model failure; cleared by the next pass.
    last_error: Mutex<Option<String>>,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            model,
            tools,
            conversation: Mutex::new(Conversation::new()),
            busy: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    /// Run one pass for `content` and return the assistant message.
    ///
    /// Fails only with `Busy`. Model and tool failures end up in the
    /// returned message.
    pub async fn send_message(&self, content: &str) -> Result<Message, AgentError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        *lock(&self.last_error) = None;

        let messages = {
            let mut conversation = lock(&self.conversation);
            conversation.push(Message::user(content));
            conversation.to_model_messages()
        };

        let request = ModelRequest {
            messages,
            tools: self.tools.tool_schema(),
        };
        tracing::info!(
            model = %self.model.model_name(),
            history = request.messages.len(),
            tools = request.tools.len(),
            "starting orchestration pass"
        );

        let reply = match self.model.complete(request).await {
            Ok(response) => {
                tracing::debug!(
                    blocks = response.blocks.len(),
                    tool_calls = response.tool_use_count(),
                    "model replied"
                );
                self.run_blocks(response.blocks).await
            }
            Err(e) => {
                let failure = AgentError::from(e);
                tracing::warn!(error = ?failure, "model call failed");
                let text = failure.to_string();
                *lock(&self.last_error) = Some(text.clone());
                Message::assistant(format!("Error: {text}"), Vec::new())
            }
        };

        let records = reply.tool_records();
        tracing::info!(
            tools_run = records.len(),
            tools_failed = records.iter().filter(|r| r.is_error()).count(),
            "orchestration pass finished"
        );

        lock(&self.conversation).push(reply.clone());
        Ok(reply)
    }

    /// Accumulate text and execute tool requests, strictly in block order.
    async fn run_blocks(&self, blocks: Vec<ContentBlock>) -> Message {
        let mut content = String::new();
        let mut records = Vec::new();

        for block in blocks {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    tracing::debug!(tool = %name, call_id = %id, "executing tool call");
                    match self.tools.execute(&name, input.clone()).await {
                        Ok(result) => {
                            records.push(ToolInvocationRecord::succeeded(name, input, result));
                        }
                        Err(e) => {
                            let message = e.to_string();
                            tracing::warn!(tool = %name, error = %message, "tool call failed");
                            content.push_str(&format!("\n\nError executing {name}: {message}"));
                            records.push(ToolInvocationRecord::failed(name, input, message));
                        }
                    }
                }
            }
        }

        Message::assistant(content, records)
    }

    // ─── State Reads ────────────────────────────────────────────────────

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.conversation).messages().to_vec()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Drop all history. Allowed while a pass runs; its reply still lands.
    pub fn clear(&self) {
        lock(&self.conversation).clear();
        *lock(&self.last_error) = None;
    }
}

// ─── Busy Flag ──────────────────────────────────────────────────────────────

/// Holds the busy flag for the duration of a pass.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, AgentError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AgentError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
