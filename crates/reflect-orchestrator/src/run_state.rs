//! State machine and result types for a single reflection run.
//!
//! A run moves through these phases:
//! - `Starting` -> `Generating(1)` -> `Critiquing(1)`
//! - From `Critiquing(i)`:
//!   - `Stopped(ThresholdMet)` (score reached the threshold)
//!   - `Stopped(MaxIterations)` (`i` is the last allowed iteration)
//!   - `Refining(i + 1)` -> `Critiquing(i + 1)` otherwise
//!
//! [`RunState`] owns the iteration history while the run is in progress and
//! is consumed into an immutable [`ReflectionRun`] once stopped.

use serde::{Deserialize, Serialize};

use crate::config::ReflectionSettings;
use crate::error::{ReflectError, Result};

// ============================================================================
// StopReason and RunPhase
// ============================================================================

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The latest critique scored at or above the quality threshold.
    ThresholdMet,
    /// The iteration budget was exhausted.
    MaxIterations,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ThresholdMet => write!(f, "threshold_met"),
            Self::MaxIterations => write!(f, "max_iterations"),
        }
    }
}

/// Current phase of a run. Iteration numbers are 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    /// Nothing has been requested yet.
    #[default]
    Starting,
    /// Waiting for the initial phrase.
    Generating(u32),
    /// Waiting for the critique of the current phrase.
    Critiquing(u32),
    /// Waiting for a refined phrase.
    Refining(u32),
    /// Terminal.
    Stopped(StopReason),
}

impl RunPhase {
    /// Returns `true` once the run has stopped.
    ///
    /// # Examples
    ///
    /// ```
    /// use reflect_orchestrator::{RunPhase, StopReason};
    ///
    /// assert!(RunPhase::Stopped(StopReason::ThresholdMet).is_terminal());
    /// assert!(!RunPhase::Critiquing(2).is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Generating(i) => write!(f, "generating({i})"),
            Self::Critiquing(i) => write!(f, "critiquing({i})"),
            Self::Refining(i) => write!(f, "refining({i})"),
            Self::Stopped(reason) => write!(f, "stopped({reason})"),
        }
    }
}

// ============================================================================
// Iteration and ReflectionRun
// ============================================================================

/// One generate/refine + critique + score cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    /// Iteration number (1-indexed).
    pub iteration: u32,
    /// Phrase produced in this iteration.
    pub response: String,
    /// Critique of that phrase.
    pub feedback: String,
    /// Heuristic score of the critique, in `[0, 1]`.
    pub quality_score: f64,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionRun {
    /// Phrase from the last iteration.
    pub final_response: String,
    /// Every iteration, in order.
    pub iterations: Vec<Iteration>,
    /// Number of iterations performed.
    pub total_iterations: u32,
    /// Whether the threshold was met before the budget ran out.
    pub stopped_early: bool,
}

impl ReflectionRun {
    /// Why the run stopped.
    #[must_use]
    pub const fn stop_reason(&self) -> StopReason {
        if self.stopped_early {
            StopReason::ThresholdMet
        } else {
            StopReason::MaxIterations
        }
    }

    /// Score of the last iteration, if any.
    #[must_use]
    pub fn final_score(&self) -> Option<f64> {
        self.iterations.last().map(|i| i.quality_score)
    }
}

// ============================================================================
// RunState
// ============================================================================

/// Mutable state of a run in progress.
#[derive(Debug, Clone)]
pub struct RunState {
    settings: ReflectionSettings,
    phase: RunPhase,
    pending_phrase: Option<String>,
    iterations: Vec<Iteration>,
}

impl RunState {
    /// Creates a run in the `Starting` phase.
    #[must_use]
    pub const fn new(settings: ReflectionSettings) -> Self {
        Self {
            settings,
            phase: RunPhase::Starting,
            pending_phrase: None,
            iterations: Vec::new(),
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Iterations recorded so far.
    #[must_use]
    pub fn iterations(&self) -> &[Iteration] {
        &self.iterations
    }

    /// Phrase awaiting critique, if the run is in `Critiquing`.
    #[must_use]
    pub fn pending_phrase(&self) -> Option<&str> {
        self.pending_phrase.as_deref()
    }

    /// Transitions `Starting` -> `Generating(1)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is `Starting`.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != RunPhase::Starting {
            return Err(ReflectError::invalid_transition(
                self.phase,
                RunPhase::Generating(1),
            ));
        }
        self.phase = RunPhase::Generating(1);
        Ok(())
    }

    /// Stores a generated or refined phrase and moves to `Critiquing`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is `Generating` or `Refining`.
    pub fn phrase_ready(&mut self, phrase: String) -> Result<()> {
        let iteration = match self.phase {
            RunPhase::Generating(i) | RunPhase::Refining(i) => i,
            other => {
                return Err(ReflectError::invalid_transition(
                    other,
                    RunPhase::Critiquing(self.next_index()),
                ))
            }
        };
        self.pending_phrase = Some(phrase);
        self.phase = RunPhase::Critiquing(iteration);
        Ok(())
    }

    /// Records the critique and score for the pending phrase and decides
    /// whether to stop or refine again.
    ///
    /// Returns the phase the run moved to.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is `Critiquing`.
    pub fn critique_ready(&mut self, critique: String, quality_score: f64) -> Result<RunPhase> {
        let RunPhase::Critiquing(iteration) = self.phase else {
            return Err(ReflectError::invalid_transition(
                self.phase,
                RunPhase::Stopped(StopReason::ThresholdMet),
            ));
        };
        let Some(response) = self.pending_phrase.take() else {
            return Err(ReflectError::invalid_transition(
                self.phase,
                RunPhase::Stopped(StopReason::ThresholdMet),
            ));
        };

        self.iterations.push(Iteration {
            iteration,
            response,
            feedback: critique,
            quality_score,
        });

        self.phase = if quality_score >= self.settings.quality_threshold() {
            RunPhase::Stopped(StopReason::ThresholdMet)
        } else if iteration >= self.settings.max_iterations() {
            RunPhase::Stopped(StopReason::MaxIterations)
        } else {
            RunPhase::Refining(iteration + 1)
        };
        Ok(self.phase)
    }

    /// Consumes a stopped run into its result.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the run has not stopped.
    pub fn into_run(self) -> Result<ReflectionRun> {
        let RunPhase::Stopped(reason) = self.phase else {
            return Err(ReflectError::invalid_transition(self.phase, "finished"));
        };
        let final_response = self
            .iterations
            .last()
            .map(|i| i.response.clone())
            .unwrap_or_default();
        let total_iterations = u32::try_from(self.iterations.len()).unwrap_or(u32::MAX);

        Ok(ReflectionRun {
            final_response,
            iterations: self.iterations,
            total_iterations,
            stopped_early: reason == StopReason::ThresholdMet,
        })
    }

    fn next_index(&self) -> u32 {
        u32::try_from(self.iterations.len()).map_or(u32::MAX, |n| n + 1)
    }
}

// ============================================================================
// Tests
// ============================================================================
