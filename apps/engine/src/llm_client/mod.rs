/// LLM client — the single point of entry for all chat-completion calls.
///
/// ARCHITECTURAL RULE: no other module may call the completions API directly.
/// All model interactions MUST go through the `GenerationBackend` trait.
///
/// Model: gpt-4o (hardcoded — do not make configurable to prevent drift)
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default chat completions endpoint, overridable via `OPENAI_API_BASE` for
/// gateways and local stand-ins.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// The model used for all completion calls.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "gpt-4o";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned an empty completion")]
    EmptyCompletion,
}

/// Speaker of a conversation turn. Serializes to the lowercase tags the chat
/// completions wire format uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation. Doubles as the wire message shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting for a single completion call, as reported by the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of one backend call: the reply text plus its usage delta.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// The generation backend seam. The session holds an `Arc<dyn
/// GenerationBackend>`; swap the implementation without touching the
/// workflow or session code.
///
/// A call is stateless on the backend side — the accumulated context is
/// replayed in full on every invocation, followed by the new input.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn invoke(
        &self,
        context: &[ConversationTurn],
        input: &str,
    ) -> Result<Completion, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Chat completions client bound to one credential for its lifetime.
///
/// No automatic retry: a failed call surfaces immediately and retrying is the
/// caller's decision.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self::with_api_base(api_key, DEFAULT_API_BASE)
    }

    pub fn with_api_base(api_key: String, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_base: api_base.into(),
            api_key,
        }
    }
}

#[async_trait]
impl GenerationBackend for LlmClient {
    async fn invoke(
        &self,
        context: &[ConversationTurn],
        input: &str,
    ) -> Result<Completion, LlmError> {
        let mut messages: Vec<WireMessage> = context
            .iter()
            .map(|turn| WireMessage {
                role: turn.role,
                content: &turn.content,
            })
            .collect();
        messages.push(WireMessage {
            role: Role::User,
            content: input,
        });

        let request_body = ChatRequest {
            model: MODEL,
            messages,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Try to parse the structured error message
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        let completion = completion_from_response(chat_response)?;

        debug!(
            "completion call succeeded: prompt_tokens={}, completion_tokens={}",
            completion.usage.prompt_tokens, completion.usage.completion_tokens
        );

        Ok(completion)
    }
}

/// Extracts the reply text and usage from a parsed response body.
fn completion_from_response(response: ChatResponse) -> Result<Completion, LlmError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|text| !text.is_empty())
        .ok_or(LlmError::EmptyCompletion)?;

    Ok(Completion {
        text,
        usage: response.usage,
    })
}
