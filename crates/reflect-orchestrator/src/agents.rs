//! Step invokers for the reflection loop.
//!
//! Each step renders a fixed prompt template, calls the [`TextGenerator`]
//! with that step's sampling parameters and returns the text verbatim.
//! Transient collaborator failures are retried here, under a
//! [`RetryPolicy`]; the orchestrator never sees them unless retries run out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{Config, SamplingConfig};
use crate::error::{ReflectError, Result};
use crate::llm::{CompletionRequest, Step, TextGenerator};

const GENERATOR_PROMPT: &str = "You are a writer of short motivational phrases.

Write one original motivational phrase about the following theme:

{theme}

Keep it to one or two sentences. Reply with the phrase only.";

const REFLECTOR_PROMPT: &str = "Critically analyze the following motivational phrase.

Theme: {theme}
Phrase: {phrase}

Evaluate:
1. Emotional impact
2. Clarity of the message
3. Originality and memorability
4. Relevance to the theme

Provide specific feedback and improvement suggestions.";

const REFINER_PROMPT: &str = "Improve the following motivational phrase based on the feedback.

Theme: {theme}
Original phrase: {phrase}
Feedback: {feedback}

Write an improved version that incorporates the suggestions. Reply with the phrase only.";

/// Fills `{name}` placeholders in a single pass.
///
/// Substituted values are never rescanned, so a theme containing `{phrase}`
/// stays literal.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match replacement {
            Some((value, close)) => {
                output.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Bounded retry with exponential backoff for transient collaborator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for the delay between retries.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given retry count and the default backoff.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Policy that retries without sleeping.
    #[must_use]
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Runs `operation` until it succeeds, fails fatally, or retries run out.
    ///
    /// A transient error on the last allowed attempt becomes
    /// [`ReflectError::LlmRetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, step: Step, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 1;
        let mut backoff = self.initial_backoff;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt > self.max_retries => {
                    warn!(%step, attempts = attempt, error = %e, "Retries exhausted");
                    return Err(ReflectError::retries_exhausted(attempt, e.to_string()));
                }
                Err(e) => {
                    warn!(
                        %step,
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient LLM error, retrying"
                    );
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                    backoff = (backoff * 2).min(self.max_backoff);
                    attempt += 1;
                }
            }
        }
    }
}

// ============================================================================
// StepInvoker
// ============================================================================

/// Issues the generate, critique and refine calls.
#[derive(Clone)]
pub struct StepInvoker {
    generator: Arc<dyn TextGenerator>,
    sampling: SamplingConfig,
    retry: RetryPolicy,
}

impl std::fmt::Debug for StepInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepInvoker")
            .field("model", &self.generator.model())
            .field("sampling", &self.sampling)
            .field("retry", &self.retry)
            .finish()
    }
}

impl StepInvoker {
    /// Creates an invoker with explicit sampling and retry settings.
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        sampling: SamplingConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            sampling,
            retry,
        }
    }

    /// Creates an invoker using the sampling and retry settings of `config`.
    #[must_use]
    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::new(
            generator,
            config.sampling.clone(),
            RetryPolicy::with_max_retries(config.max_retries),
        )
    }

    /// Model identifier of the underlying generator.
    #[must_use]
    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Generates the first phrase for `theme`.
    pub async fn generate(&self, theme: &str) -> Result<String> {
        let prompt = render(GENERATOR_PROMPT, &[("theme", theme)]);
        self.invoke(Step::Generate, prompt, self.sampling.generator_temperature)
            .await
    }

    /// Critiques `phrase` with respect to `theme`.
    pub async fn critique(&self, theme: &str, phrase: &str) -> Result<String> {
        let prompt = render(REFLECTOR_PROMPT, &[("theme", theme), ("phrase", phrase)]);
        self.invoke(Step::Critique, prompt, self.sampling.reflector_temperature)
            .await
    }

    /// Produces an improved phrase from the previous phrase and its critique.
    pub async fn refine(
        &self,
        theme: &str,
        previous_phrase: &str,
        previous_critique: &str,
    ) -> Result<String> {
        let prompt = render(
            REFINER_PROMPT,
            &[
                ("theme", theme),
                ("phrase", previous_phrase),
                ("feedback", previous_critique),
            ],
        );
        self.invoke(Step::Refine, prompt, self.sampling.refiner_temperature)
            .await
    }

    async fn invoke(&self, step: Step, prompt: String, temperature: f32) -> Result<String> {
        let request = CompletionRequest {
            step,
            prompt,
            temperature,
            max_tokens: self.sampling.max_tokens,
            top_p: self.sampling.top_p,
        };

        let text = self
            .retry
            .run(step, || self.generator.generate(&request))
            .await?;
        debug!(%step, response_len = text.len(), "Step completed");
        Ok(text)
    }
}
