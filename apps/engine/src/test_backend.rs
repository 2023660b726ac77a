//! Scripted generation backend for tests — records every call and replays
//! canned completions or failures in order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::llm_client::{Completion, ConversationTurn, GenerationBackend, LlmError, Usage};

enum Script {
    Reply { text: String, usage: Usage },
    Fail,
}

/// One recorded backend invocation: the new input and a snapshot of the
/// context that was replayed with it.
pub struct RecordedCall {
    pub input: String,
    pub context: Vec<ConversationTurn>,
}

pub struct ScriptedBackend {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<RecordedCall>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn reply(self, text: &str) -> Self {
        self.reply_with_usage(text, Usage::default())
    }

    pub fn reply_with_usage(self, text: &str, usage: Usage) -> Self {
        self.script.lock().unwrap().push_back(Script::Reply {
            text: text.to_string(),
            usage,
        });
        self
    }

    pub fn failure(self) -> Self {
        self.script.lock().unwrap().push_back(Script::Fail);
        self
    }

    /// Makes every invocation record itself, then wait on `gate` before
    /// answering. Lets tests observe an in-flight call.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|call| RecordedCall {
                input: call.input.clone(),
                context: call.context.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn invoke(
        &self,
        context: &[ConversationTurn],
        input: &str,
    ) -> Result<Completion, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            input: input.to_string(),
            context: context.to_vec(),
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Reply { text, usage }) => Ok(Completion { text, usage }),
            Some(Script::Fail) => Err(LlmError::Api {
                status: 500,
                message: "scripted failure".to_string(),
            }),
            None => Err(LlmError::Api {
                status: 500,
                message: "script exhausted".to_string(),
            }),
        }
    }
}
