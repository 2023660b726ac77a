//! Workflow controller — the two-phase state machine between "paste source"
//! and "review/refine", and the generation pipeline that connects them.
//!
//! Flow: ingest pasted markup → gate on non-empty source and complete
//!       settings → reset session → prompt assembly → backend call →
//!       artifact update → Review phase.
//!
//! At most one generation or chat exchange is in flight at a time: intents
//! acquire the state lock with `try_lock`, and a second intent arriving while
//! one holds it is rejected with `EngineError::Busy`.

pub mod prompts;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::ingest::{ingest, PastedContent};
use crate::llm_client::{ConversationTurn, GenerationBackend};
use crate::session::{ConversationSession, UsageTotals};
use crate::settings::Settings;
use crate::workflow::prompts::{build_generation_prompt, REGENERATE_REQUEST};

/// Workflow phase. Exactly one is active; transitions are gated by the
/// controller, never inferred from which view is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowPhase {
    /// The user supplies raw job-posting content.
    Source,
    /// The generated letter is displayed and refined via chat.
    Review,
}

/// Result of a chat exchange: the assistant's direct reply plus the
/// regenerated cover letter.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    pub cover_letter: String,
}

struct WorkflowState {
    phase: WorkflowPhase,
    artifact: String,
    session: ConversationSession,
}

/// Long-lived controller owning the phase, the current cover letter, and the
/// conversation session. The shell forwards user intents here and renders
/// whatever the accessors return.
pub struct WorkflowController {
    settings: Settings,
    state: Mutex<WorkflowState>,
}

impl WorkflowController {
    pub fn new(settings: Settings, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            settings,
            state: Mutex::new(WorkflowState {
                phase: WorkflowPhase::Source,
                artifact: String::new(),
                session: ConversationSession::new(backend),
            }),
        }
    }

    /// Runs the generation pipeline on pasted job-posting content.
    ///
    /// Gate: the ingested source must be non-empty and the settings complete,
    /// otherwise the phase does not change and no backend call is made. A
    /// successful run starts a fresh conversation context, replaces the
    /// artifact, and moves to the Review phase. On backend failure the phase
    /// stays Source and the artifact is untouched; the pre-call session reset
    /// is not rolled back.
    pub async fn generate(&self, source: &PastedContent) -> Result<String, EngineError> {
        let mut state = self.state.try_lock().map_err(|_| EngineError::Busy)?;

        if state.phase != WorkflowPhase::Source {
            return Err(EngineError::Validation(
                "return to the source phase before generating again".to_string(),
            ));
        }

        let ingested = ingest(source);
        if ingested.trim().is_empty() {
            return Err(EngineError::Validation(
                "empty source: paste the webpage content before generating a cover letter"
                    .to_string(),
            ));
        }
        if !self.settings.is_complete() {
            return Err(EngineError::Validation(
                "settings are incomplete: api key, resume, and initial prompt are required"
                    .to_string(),
            ));
        }

        let prompt = build_generation_prompt(&self.settings, &ingested);

        // A generation run always starts a fresh conversational context.
        state.session.reset();
        info!(source_bytes = ingested.len(), "generating cover letter");
        let completion = state
            .session
            .send_untracked(&prompt)
            .await
            .map_err(EngineError::Generation)?;

        state.artifact = completion.text.clone();
        state.phase = WorkflowPhase::Review;
        info!(
            letter_bytes = state.artifact.len(),
            total_tokens = state.session.usage().total_tokens,
            "cover letter generated"
        );
        Ok(completion.text)
    }

    /// Sends a chat refinement message from the Review phase.
    ///
    /// Whitespace-only input is silently ignored: `Ok(None)`, no turn
    /// recorded, no call made. Otherwise two strictly sequential backend
    /// calls run through the same session — first the reply to the user's
    /// message, then the regenerated letter — and the artifact is replaced
    /// with the second call's output. If the first call fails, the second is
    /// never attempted and the already-appended user turn stays in the
    /// transcript.
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatOutcome>, EngineError> {
        if text.trim().is_empty() {
            debug!("ignoring empty chat message");
            return Ok(None);
        }

        let mut state = self.state.try_lock().map_err(|_| EngineError::Busy)?;
        if state.phase != WorkflowPhase::Review {
            return Err(EngineError::Validation(
                "generate a cover letter before refining it".to_string(),
            ));
        }

        let reply = state.session.send(text).await.map_err(EngineError::Backend)?;
        let regenerated = state
            .session
            .send_untracked(REGENERATE_REQUEST)
            .await
            .map_err(EngineError::Backend)?;

        state.artifact = regenerated.text.clone();
        debug!(
            transcript_turns = state.session.turns().len(),
            "chat exchange completed"
        );
        Ok(Some(ChatOutcome {
            reply: reply.text,
            cover_letter: regenerated.text,
        }))
    }

    /// Returns to the Source phase. Always permitted: the source text lives
    /// with the caller and is never destroyed by reaching Review.
    pub async fn return_to_source(&self) {
        let mut state = self.state.lock().await;
        state.phase = WorkflowPhase::Source;
        debug!("returned to source phase");
    }

    pub async fn phase(&self) -> WorkflowPhase {
        self.state.lock().await.phase
    }

    /// The current cover letter text. Empty until the first successful
    /// generation.
    pub async fn artifact(&self) -> String {
        self.state.lock().await.artifact.clone()
    }

    /// The visible chat transcript of the current session.
    pub async fn transcript(&self) -> Vec<ConversationTurn> {
        self.state.lock().await.session.turns().to_vec()
    }

    pub async fn usage(&self) -> UsageTotals {
        self.state.lock().await.session.usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{Role, Usage};
    use crate::test_backend::ScriptedBackend;
    use tokio::sync::Notify;

    fn complete_settings() -> Settings {
        Settings {
            api_key: "k".to_string(),
            resume: "R".to_string(),
            initial_prompt: "I".to_string(),
        }
    }

    fn plain_source(text: &str) -> PastedContent {
        PastedContent {
            html: None,
            plain_text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_generate_moves_to_review_with_fresh_session() {
        let usage = Usage {
            prompt_tokens: 120,
            completion_tokens: 80,
            total_tokens: 200,
        };
        let backend = Arc::new(ScriptedBackend::new().reply_with_usage("Dear Hiring Manager,", usage));
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        let letter = controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();

        assert_eq!(letter, "Dear Hiring Manager,");
        assert_eq!(controller.phase().await, WorkflowPhase::Review);
        assert_eq!(controller.artifact().await, "Dear Hiring Manager,");
        assert!(controller.transcript().await.is_empty());

        let totals = controller.usage().await;
        assert_eq!(totals.prompt_tokens, 120);
        assert_eq!(totals.completion_tokens, 80);
        assert_eq!(totals.total_tokens, 200);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_sends_the_assembled_prompt_on_empty_context() {
        let backend = Arc::new(ScriptedBackend::new().reply("Letter v1"));
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].context.is_empty());
        assert_eq!(
            calls[0].input,
            build_generation_prompt(&complete_settings(), "Job posting text")
        );
    }

    #[tokio::test]
    async fn test_generate_with_empty_source_never_reaches_backend() {
        let backend = Arc::new(ScriptedBackend::new().reply("unused"));
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        let result = controller.generate(&plain_source("")).await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(controller.phase().await, WorkflowPhase::Source);
        assert_eq!(controller.artifact().await, "");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_with_whitespace_only_markup_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new().reply("unused"));
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        let source = PastedContent {
            html: Some("<div> <p>  </p> </div>".to_string()),
            plain_text: "ignored fallback".to_string(),
        };
        let result = controller.generate(&source).await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_with_incomplete_settings_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new().reply("unused"));
        let mut settings = complete_settings();
        settings.resume.clear();
        let controller = WorkflowController::new(settings, backend.clone());

        let result = controller.generate(&plain_source("Job posting text")).await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(controller.phase().await, WorkflowPhase::Source);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_failure_keeps_source_phase_and_artifact() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("Letter v1")
                .reply("Sure.")
                .reply("Letter v2")
                .failure(),
        );
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        controller.send_message("make it shorter").await.unwrap();
        controller.return_to_source().await;

        let result = controller.generate(&plain_source("Another posting")).await;

        assert!(matches!(result, Err(EngineError::Generation(_))));
        assert_eq!(controller.phase().await, WorkflowPhase::Source);
        // the artifact from the last successful run is still displayed
        assert_eq!(controller.artifact().await, "Letter v2");
        // the pre-call reset stands: the old conversation is gone
        assert!(controller.transcript().await.is_empty());
        assert_eq!(controller.usage().await, crate::session::UsageTotals::default());
    }

    #[tokio::test]
    async fn test_chat_exchange_updates_transcript_and_artifact() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("Letter v1")
                .reply("Sure, shortening it.")
                .reply("Letter v2"),
        );
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        let outcome = controller
            .send_message("make it shorter")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.reply, "Sure, shortening it.");
        assert_eq!(outcome.cover_letter, "Letter v2");
        assert_eq!(controller.artifact().await, "Letter v2");

        let transcript = controller.transcript().await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0], ConversationTurn::user("make it shorter"));
        assert_eq!(
            transcript[1],
            ConversationTurn::assistant("Sure, shortening it.")
        );
    }

    #[tokio::test]
    async fn test_chat_calls_run_in_order_through_one_context() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("Letter v1")
                .reply("Sure, shortening it.")
                .reply("Letter v2"),
        );
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        controller.send_message("make it shorter").await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].input, "make it shorter");
        assert_eq!(calls[2].input, REGENERATE_REQUEST);
        // the regeneration call sees the generation exchange plus the chat
        // exchange it follows
        assert_eq!(calls[2].context.len(), 4);
        assert_eq!(calls[2].context[2], ConversationTurn::user("make it shorter"));
        assert_eq!(
            calls[2].context[3],
            ConversationTurn::assistant("Sure, shortening it.")
        );
    }

    #[tokio::test]
    async fn test_failed_first_chat_call_skips_regeneration() {
        let backend = Arc::new(ScriptedBackend::new().reply("Letter v1").failure());
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        let result = controller.send_message("make it shorter").await;

        assert!(matches!(result, Err(EngineError::Backend(_))));
        // generation plus the failed chat call; regeneration never ran
        assert_eq!(backend.call_count(), 2);
        assert_eq!(controller.phase().await, WorkflowPhase::Review);
        assert_eq!(controller.artifact().await, "Letter v1");

        // the user's message stays in the transcript, no assistant turn follows
        let transcript = controller.transcript().await;
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_failed_regeneration_keeps_reply_and_artifact() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("Letter v1")
                .reply("Sure, shortening it.")
                .failure(),
        );
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        let result = controller.send_message("make it shorter").await;

        assert!(matches!(result, Err(EngineError::Backend(_))));
        assert_eq!(backend.call_count(), 3);
        assert_eq!(controller.artifact().await, "Letter v1");
        assert_eq!(controller.transcript().await.len(), 2);
    }

    #[tokio::test]
    async fn test_whitespace_message_is_silently_ignored() {
        let backend = Arc::new(ScriptedBackend::new().reply("Letter v1"));
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        let outcome = controller.send_message("   ").await.unwrap();

        assert!(outcome.is_none());
        assert!(controller.transcript().await.is_empty());
        assert_eq!(controller.artifact().await, "Letter v1");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_chat_outside_review_phase_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new().reply("unused"));
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        let result = controller.send_message("make it shorter").await;

        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_return_to_source_keeps_the_artifact() {
        let backend = Arc::new(ScriptedBackend::new().reply("Letter v1"));
        let controller = WorkflowController::new(complete_settings(), backend);

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        controller.return_to_source().await;

        assert_eq!(controller.phase().await, WorkflowPhase::Source);
        assert_eq!(controller.artifact().await, "Letter v1");
    }

    #[tokio::test]
    async fn test_return_to_source_in_source_phase_is_harmless() {
        let backend = Arc::new(ScriptedBackend::new());
        let controller = WorkflowController::new(complete_settings(), backend);

        controller.return_to_source().await;
        assert_eq!(controller.phase().await, WorkflowPhase::Source);
    }

    #[tokio::test]
    async fn test_regenerating_requires_returning_to_source_first() {
        let backend = Arc::new(ScriptedBackend::new().reply("Letter v1").reply("Letter v2"));
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        let rejected = controller.generate(&plain_source("Another posting")).await;
        assert!(matches!(rejected, Err(EngineError::Validation(_))));

        controller.return_to_source().await;
        let letter = controller
            .generate(&plain_source("Another posting"))
            .await
            .unwrap();
        assert_eq!(letter, "Letter v2");
    }

    #[tokio::test]
    async fn test_new_generation_clears_previous_conversation() {
        let gen2_usage = Usage {
            prompt_tokens: 7,
            completion_tokens: 3,
            total_tokens: 10,
        };
        let backend = Arc::new(
            ScriptedBackend::new()
                .reply("Letter v1")
                .reply("Sure.")
                .reply("Letter v2")
                .reply_with_usage("Letter for another role", gen2_usage),
        );
        let controller = WorkflowController::new(complete_settings(), backend.clone());

        controller
            .generate(&plain_source("Job posting text"))
            .await
            .unwrap();
        controller.send_message("make it shorter").await.unwrap();
        assert_eq!(controller.transcript().await.len(), 2);

        controller.return_to_source().await;
        controller
            .generate(&plain_source("Another posting"))
            .await
            .unwrap();

        assert!(controller.transcript().await.is_empty());
        assert_eq!(controller.usage().await.total_tokens, 10);
        // the second generation starts from an empty backend context
        assert!(backend.calls()[3].context.is_empty());
    }

    #[tokio::test]
    async fn test_second_intent_while_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(ScriptedBackend::new().reply("Letter v1").gated(gate.clone()));
        let controller = Arc::new(WorkflowController::new(complete_settings(), backend.clone()));

        let in_flight = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.generate(&plain_source("Job posting text")).await })
        };
        while backend.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        let second = controller.generate(&plain_source("Job posting text")).await;
        assert!(matches!(second, Err(EngineError::Busy)));
        let chat = controller.send_message("too eager").await;
        assert!(matches!(chat, Err(EngineError::Busy)));
        // the in-flight call is the only one that reached the backend
        assert_eq!(backend.call_count(), 1);

        gate.notify_one();
        let letter = in_flight.await.unwrap().unwrap();
        assert_eq!(letter, "Letter v1");
        assert_eq!(controller.phase().await, WorkflowPhase::Review);
    }
}
