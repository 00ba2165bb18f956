//! Generation Boundary
//!
//! Hands a rendered bundle to a text-generation backend. Backend trouble is
//! never fatal here: after one retry it becomes inline text, because the
//! bundle itself was computed correctly.

pub mod prompt;
pub mod provider;

pub use prompt::{build_messages, render_context, InlinePolicy, Instruction};
pub use provider::{LLMProvider, OllamaProvider, OpenAICompatibleProvider};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::context::ContextBundle;
use crate::model::ChatMessage;

/// Attempts per generation call: the first try plus one retry.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Backend(String),

    #[error("backend returned an empty response")]
    EmptyResponse,
}

/// Result of a generation call. Failure is a value, not an `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed(String),
    Failed(GenerationError),
}

impl GenerationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, GenerationOutcome::Failed(_))
    }

    /// Text to show the caller: the generated text, or a description of the failure.
    pub fn into_text(self, instruction: Instruction) -> String {
        match self {
            GenerationOutcome::Completed(text) => text,
            GenerationOutcome::Failed(err) => failure_text(instruction, &err),
        }
    }
}

pub fn failure_text(instruction: Instruction, err: &GenerationError) -> String {
    match instruction {
        Instruction::Recommend => format!(
            "Error generating recommendation: {}. Ensure the generation backend is running.",
            err
        ),
        Instruction::Chat => format!("Error responding to chat: {}", err),
    }
}

#[derive(Clone)]
pub struct GenerationAdapter {
    provider: Arc<dyn LLMProvider>,
    model: String,
    timeout: Duration,
    policy: InlinePolicy,
}

impl GenerationAdapter {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout,
            policy: InlinePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: InlinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn attempt(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        match tokio::time::timeout(self.timeout, self.provider.generate(&self.model, messages)).await {
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
            Ok(Err(e)) => Err(GenerationError::Backend(format!("{:#}", e))),
            Ok(Ok(text)) if text.trim().is_empty() => Err(GenerationError::EmptyResponse),
            Ok(Ok(text)) => Ok(text),
        }
    }

    /// Generate text for `bundle`. Each attempt is bounded by the configured
    /// timeout; a failed first attempt is retried once.
    pub async fn generate(
        &self,
        bundle: &ContextBundle,
        instruction: Instruction,
        history: &[ChatMessage],
    ) -> GenerationOutcome {
        let messages = build_messages(bundle, instruction, history, &self.policy);
        debug!(model = %self.model, messages = messages.len(), "generation request");

        let mut last_error = GenerationError::EmptyResponse;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(messages.clone()).await {
                Ok(text) => return GenerationOutcome::Completed(text),
                Err(err) => {
                    warn!(attempt, max = MAX_ATTEMPTS, error = %err, "generation attempt failed");
                    last_error = err;
                }
            }
        }
        GenerationOutcome::Failed(last_error)
    }

    /// [`generate`](Self::generate), rendered to caller-facing text.
    pub async fn generate_text(
        &self,
        bundle: &ContextBundle,
        instruction: Instruction,
        history: &[ChatMessage],
    ) -> String {
        self.generate(bundle, instruction, history).await.into_text(instruction)
    }
}
