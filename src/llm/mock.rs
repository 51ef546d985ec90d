//! Scripted chat model for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{ChatMessage, ChatModel, ModelError, ToolDefinition};

/// Returns queued replies in order, then a fixed fallback reply.
pub(crate) struct MockChatModel {
    replies: Mutex<VecDeque<Result<ChatMessage, String>>>,
    fallback: ChatMessage,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    invocation_count: Arc<AtomicUsize>,
}

impl MockChatModel {
    pub fn new(fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: ChatMessage::assistant(fallback),
            requests: Mutex::new(Vec::new()),
            invocation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a reply.
    #[must_use]
    pub fn then(self, reply: ChatMessage) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn then_fail(self, message: &str) -> Self {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    /// Get the invocation count.
    pub fn invocation_count(&self) -> usize {
        self.invocation_count.load(Ordering::SeqCst)
    }

    /// The message history of every request.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ChatMessage, ModelError> {
        self.invocation_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(messages.to_vec());

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ModelError::Transport(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// An assistant message requesting the given `(name, arguments)` calls.
pub(crate) fn tool_calls(calls: &[(&str, &str)]) -> ChatMessage {
    ChatMessage {
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| super::ToolCall::new(format!("call_{i}"), *name, *args))
            .collect(),
        content: None,
        ..ChatMessage::assistant("")
    }
}
