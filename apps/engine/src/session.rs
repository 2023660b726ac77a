//! Conversation session — turn history, backend context, and usage accounting.
//!
//! Two sequences live here. The *transcript* holds what the user sees: their
//! messages and the assistant's direct replies. The *context* holds every
//! exchange the backend has answered — including untracked document requests —
//! and is replayed on each call so the model keeps the full running
//! conversation.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::llm_client::{Completion, ConversationTurn, GenerationBackend, LlmError, Usage};

/// Cumulative token usage for one session. Monotonically non-decreasing
/// between resets; purely additive bookkeeping, never used to block calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageTotals {
    fn absorb(&mut self, delta: &Usage) {
        self.prompt_tokens += u64::from(delta.prompt_tokens);
        self.completion_tokens += u64::from(delta.completion_tokens);
        self.total_tokens += u64::from(delta.total_tokens);
    }
}

/// One conversation with the generation backend.
///
/// Owns the single backend handle for its lifetime. The handle is stateless
/// per call, so a fresh conversational context is simply an empty one.
pub struct ConversationSession {
    id: Uuid,
    backend: Arc<dyn GenerationBackend>,
    transcript: Vec<ConversationTurn>,
    context: Vec<ConversationTurn>,
    usage: UsageTotals,
}

impl ConversationSession {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "conversation session created");
        Self {
            id,
            backend,
            transcript: Vec::new(),
            context: Vec::new(),
            usage: UsageTotals::default(),
        }
    }

    /// Clears the transcript, the backend context, and the usage counters.
    /// A fresh id keeps log lines from consecutive runs distinguishable.
    pub fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.transcript.clear();
        self.context.clear();
        self.usage = UsageTotals::default();
        debug!(session = %self.id, "conversation session reset");
    }

    /// Sends a user message and records the exchange in the transcript.
    ///
    /// On failure the user turn stays in the transcript — it already happened
    /// from the user's perspective — but no assistant turn is appended and
    /// context and usage are unchanged.
    pub async fn send(&mut self, input: &str) -> Result<Completion, LlmError> {
        self.transcript.push(ConversationTurn::user(input));
        let completion = self.call(input).await?;
        self.transcript
            .push(ConversationTurn::assistant(completion.text.as_str()));
        Ok(completion)
    }

    /// Sends an input through the same running context without recording
    /// transcript turns. Document requests (the initial generation, the
    /// regeneration after a chat exchange) go through here: they produce the
    /// artifact, not chat turns. Usage still accumulates.
    pub async fn send_untracked(&mut self, input: &str) -> Result<Completion, LlmError> {
        self.call(input).await
    }

    /// Invokes the backend with the accumulated context. The exchange enters
    /// the context only once the backend has actually answered it.
    async fn call(&mut self, input: &str) -> Result<Completion, LlmError> {
        let completion = match self.backend.invoke(&self.context, input).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!(session = %self.id, "backend call failed: {e}");
                return Err(e);
            }
        };
        self.context.push(ConversationTurn::user(input));
        self.context
            .push(ConversationTurn::assistant(completion.text.as_str()));
        self.usage.absorb(&completion.usage);
        debug!(
            session = %self.id,
            context_turns = self.context.len(),
            total_tokens = self.usage.total_tokens,
            "backend call succeeded"
        );
        Ok(completion)
    }

    /// The visible transcript: user messages and direct assistant replies.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn usage(&self) -> UsageTotals {
        self.usage
    }
}
