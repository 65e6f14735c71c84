//! The reflection loop.
//!
//! [`ReflectionOrchestrator`] drives a [`RunState`] through generate,
//! critique and refine steps until the critique score reaches the quality
//! threshold or the iteration budget runs out.

use std::sync::Arc;

use tracing::{debug, info};

use crate::agents::StepInvoker;
use crate::config::{Config, ReflectionSettings};
use crate::error::{ReflectError, Result};
use crate::llm::TextGenerator;
use crate::quality::assess;
use crate::run_state::{ReflectionRun, RunPhase, RunState};

/// Message returned when the theme is missing or blank.
pub const THEME_REQUIRED: &str = "Theme is required";

/// Runs reflection loops with fixed settings.
///
/// The orchestrator holds no per-run state, so a single instance can serve
/// concurrent runs.
#[derive(Debug, Clone)]
pub struct ReflectionOrchestrator {
    steps: StepInvoker,
    settings: ReflectionSettings,
}

impl ReflectionOrchestrator {
    /// Creates an orchestrator from a step invoker and validated loop settings.
    #[must_use]
    pub const fn new(steps: StepInvoker, settings: ReflectionSettings) -> Self {
        Self { steps, settings }
    }

    /// Creates an orchestrator using the sampling, retry and loop settings of `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` if the iteration budget or the
    /// threshold in `config` is out of range.
    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Result<Self> {
        let settings = config.reflection_settings()?;
        Ok(Self::new(
            StepInvoker::from_config(generator, config),
            settings,
        ))
    }

    /// Loop settings in effect.
    #[must_use]
    pub const fn settings(&self) -> ReflectionSettings {
        self.settings
    }

    /// Model identifier of the underlying generator.
    #[must_use]
    pub fn model(&self) -> &str {
        self.steps.model()
    }

    /// Runs the loop for `theme`.
    ///
    /// Iteration 1 generates a phrase; later iterations refine the previous
    /// phrase using its critique. Every phrase is critiqued and scored. The
    /// run stops as soon as a score is at or above the threshold, or after
    /// `max_iterations` iterations.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `theme` is empty or whitespace, before any call is made
    /// - Any fatal collaborator error, including exhausted retries. No
    ///   partial result is returned.
    pub async fn reflect(&self, theme: &str) -> Result<ReflectionRun> {
        if theme.trim().is_empty() {
            return Err(ReflectError::invalid_input(THEME_REQUIRED));
        }

        info!(
            theme,
            max_iterations = self.settings.max_iterations(),
            quality_threshold = self.settings.quality_threshold(),
            "Starting reflection run"
        );

        let mut state = RunState::new(self.settings);
        state.start()?;

        while !state.phase().is_terminal() {
            match state.phase() {
                RunPhase::Generating(iteration) => {
                    debug!(iteration, "Generating initial phrase");
                    let phrase = self.steps.generate(theme).await?;
                    state.phrase_ready(phrase)?;
                }
                RunPhase::Refining(iteration) => {
                    let Some(last) = state.iterations().last() else {
                        return Err(ReflectError::invalid_transition(
                            RunPhase::Starting,
                            RunPhase::Refining(iteration),
                        ));
                    };
                    let (phrase, feedback) = (last.response.clone(), last.feedback.clone());
                    debug!(iteration, "Refining phrase");
                    let refined = self.steps.refine(theme, &phrase, &feedback).await?;
                    state.phrase_ready(refined)?;
                }
                RunPhase::Critiquing(iteration) => {
                    let Some(phrase) = state.pending_phrase().map(str::to_string) else {
                        return Err(ReflectError::invalid_transition(
                            RunPhase::Starting,
                            RunPhase::Critiquing(iteration),
                        ));
                    };
                    let critique = self.steps.critique(theme, &phrase).await?;
                    let assessment = assess(&critique);
                    info!(
                        iteration,
                        score = assessment.score,
                        positives = assessment.positive_count,
                        negatives = assessment.negative_count,
                        "Iteration scored"
                    );
                    state.critique_ready(critique, assessment.score)?;
                }
                phase @ (RunPhase::Stopped(_) | RunPhase::Starting) => {
                    return Err(ReflectError::invalid_transition(phase, phase));
                }
            }
        }

        let run = state.into_run()?;
        info!(
            reason = %run.stop_reason(),
            iterations = run.total_iterations,
            "Reflection run finished"
        );
        Ok(run)
    }
}
