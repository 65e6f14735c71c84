//! Reflection Run Reports
//!
//! Types and generators for presenting the result of a reflection run.
//! Reports can be serialized to JSON for programmatic access, rendered to
//! Markdown for sharing, or printed as a short console summary.
//!
//! # Types
//!
//! - [`RunReport`] - Everything known about one run
//! - [`IterationEntry`] - One scored iteration
//! - [`ReportStatus`] - Why the run stopped
//! - [`QualityBand`] - Coarse label for a quality score
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//! - [`ConsoleSummary`] - Plain-text terminal summary
//!
//! # Example
//!
//! ```rust
//! use reflect_report::{RunReport, ReportStatus, IterationEntry, MarkdownGenerator};
//!
//! let report = RunReport::builder()
//!     .theme("perseverance")
//!     .model("gpt-4o-mini")
//!     .settings(3, 0.8)
//!     .iteration(IterationEntry::new(1, "Keep going.", "Clear but generic.", 0.45))
//!     .iteration(IterationEntry::new(2, "Every step counts.", "Inspiring and memorable.", 0.85))
//!     .status(ReportStatus::ThresholdMet)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(report.final_response, "Every step counts.");
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Reflection Report: perseverance"));
//! ```

pub mod json;
mod markdown;
mod summary;

pub use markdown::MarkdownGenerator;
pub use summary::ConsoleSummary;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Report Status (local copy to avoid cross-crate dependency)
// ============================================================================

/// Why a reflection run stopped.
///
/// Mirrors the orchestrator's stop reason so this crate stays independent
/// of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// A critique reached the quality threshold.
    ThresholdMet,
    /// The iteration budget ran out.
    #[default]
    MaxIterations,
}

impl ReportStatus {
    /// Returns the status for a run, given whether it stopped early.
    #[must_use]
    pub const fn from_stopped_early(stopped_early: bool) -> Self {
        if stopped_early {
            Self::ThresholdMet
        } else {
            Self::MaxIterations
        }
    }

    /// Returns `true` if the run stopped before exhausting its budget.
    #[must_use]
    pub const fn stopped_early(&self) -> bool {
        matches!(self, Self::ThresholdMet)
    }

    /// Returns a human-readable description of the status.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ThresholdMet => "Quality threshold met",
            Self::MaxIterations => "Maximum iterations reached",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Quality Band
// ============================================================================

/// Coarse label for a quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityBand {
    /// Score below 0.5.
    Low,
    /// Score in `[0.5, 0.7)`.
    Medium,
    /// Score of 0.7 or more.
    High,
}

impl QualityBand {
    /// Classifies a score.
    ///
    /// ```
    /// use reflect_report::QualityBand;
    ///
    /// assert_eq!(QualityBand::from_score(0.7), QualityBand::High);
    /// assert_eq!(QualityBand::from_score(0.5), QualityBand::Medium);
    /// assert_eq!(QualityBand::from_score(0.49), QualityBand::Low);
    /// ```
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the label used in rendered reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for QualityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Iteration Entry
// ============================================================================

/// One scored iteration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationEntry {
    /// Iteration number (1-indexed).
    pub iteration: u32,
    /// Phrase produced in this iteration.
    pub response: String,
    /// Critique of the phrase.
    pub feedback: String,
    /// Heuristic score of the critique.
    pub quality_score: f64,
}

impl IterationEntry {
    /// Creates a new iteration entry.
    #[must_use]
    pub fn new(
        iteration: u32,
        response: impl Into<String>,
        feedback: impl Into<String>,
        quality_score: f64,
    ) -> Self {
        Self {
            iteration,
            response: response.into(),
            feedback: feedback.into(),
            quality_score,
        }
    }

    /// Quality band of this iteration's score.
    #[must_use]
    pub fn band(&self) -> QualityBand {
        QualityBand::from_score(self.quality_score)
    }
}

// ============================================================================
// Run Report
// ============================================================================

/// Complete report of one reflection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Theme the run was asked to write about.
    pub theme: String,

    /// Model used for every step.
    pub model: String,

    /// Early-stop threshold in effect.
    pub quality_threshold: f64,

    /// Iteration budget in effect.
    pub max_iterations: u32,

    /// Why the run stopped.
    pub status: ReportStatus,

    /// Every iteration, in order.
    pub iterations: Vec<IterationEntry>,

    /// Phrase from the last iteration.
    pub final_response: String,

    /// When the report was built.
    pub generated_at: DateTime<Utc>,
}

impl RunReport {
    /// Creates a new report builder.
    #[must_use]
    pub fn builder() -> RunReportBuilder {
        RunReportBuilder::default()
    }

    /// Number of iterations performed.
    #[must_use]
    pub fn total_iterations(&self) -> usize {
        self.iterations.len()
    }

    /// Score of the last iteration.
    #[must_use]
    pub fn final_score(&self) -> Option<f64> {
        self.iterations.last().map(|i| i.quality_score)
    }

    /// Iteration with the highest score. Ties go to the earliest iteration.
    #[must_use]
    pub fn best_iteration(&self) -> Option<&IterationEntry> {
        self.iterations.iter().fold(None, |best, entry| match best {
            Some(b) if b.quality_score >= entry.quality_score => Some(b),
            _ => Some(entry),
        })
    }

    /// Difference between the last and first scores.
    #[must_use]
    pub fn score_change(&self) -> Option<f64> {
        let first = self.iterations.first()?;
        let last = self.iterations.last()?;
        Some(last.quality_score - first.quality_score)
    }
}

// ============================================================================
// Run Report Builder
// ============================================================================

/// Builder for [`RunReport`].
#[derive(Debug, Default)]
pub struct RunReportBuilder {
    theme: Option<String>,
    model: Option<String>,
    quality_threshold: Option<f64>,
    max_iterations: Option<u32>,
    status: Option<ReportStatus>,
    iterations: Vec<IterationEntry>,
    generated_at: Option<DateTime<Utc>>,
}

impl RunReportBuilder {
    /// Sets the theme.
    #[must_use]
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the iteration budget and quality threshold.
    #[must_use]
    pub const fn settings(mut self, max_iterations: u32, quality_threshold: f64) -> Self {
        self.max_iterations = Some(max_iterations);
        self.quality_threshold = Some(quality_threshold);
        self
    }

    /// Sets the stop status. Defaults to one derived from the iterations.
    #[must_use]
    pub const fn status(mut self, status: ReportStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Adds an iteration.
    #[must_use]
    pub fn iteration(mut self, entry: IterationEntry) -> Self {
        self.iterations.push(entry);
        self
    }

    /// Sets all iterations.
    #[must_use]
    pub fn iterations(mut self, entries: Vec<IterationEntry>) -> Self {
        self.iterations = entries;
        self
    }

    /// Overrides the generation timestamp (defaults to now).
    #[must_use]
    pub const fn generated_at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.generated_at = Some(timestamp);
        self
    }

    /// Builds the report.
    ///
    /// The final response is taken from the last iteration. Without an
    /// explicit status, a final score at or above the threshold means
    /// [`ReportStatus::ThresholdMet`].
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidData`] if:
    /// - the theme is missing or empty
    /// - there are no iterations
    /// - iteration numbers are not `1..=n` in order
    pub fn build(self) -> Result<RunReport> {
        let theme = self
            .theme
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ReportError::InvalidData("theme is required".to_string()))?;

        let Some(last) = self.iterations.last() else {
            return Err(ReportError::InvalidData(
                "report requires at least one iteration".to_string(),
            ));
        };

        for (expected, entry) in (1u32..).zip(&self.iterations) {
            if entry.iteration != expected {
                return Err(ReportError::InvalidData(format!(
                    "iteration numbers must be contiguous from 1: expected {expected}, found {}",
                    entry.iteration
                )));
            }
        }

        let quality_threshold = self.quality_threshold.unwrap_or(0.8);
        let status = self.status.unwrap_or_else(|| {
            if last.quality_score >= quality_threshold {
                ReportStatus::ThresholdMet
            } else {
                ReportStatus::MaxIterations
            }
        });
        let final_response = last.response.clone();
        let iteration_count = u32::try_from(self.iterations.len()).unwrap_or(u32::MAX);

        Ok(RunReport {
            theme,
            model: self.model.unwrap_or_default(),
            quality_threshold,
            max_iterations: self.max_iterations.unwrap_or(iteration_count),
            status,
            iterations: self.iterations,
            final_response,
            generated_at: self.generated_at.unwrap_or_else(Utc::now),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
