//! Heuristic quality estimation for critique text.
//!
//! The estimator turns free-text feedback into a score in `[0, 1]` using
//! fixed keyword sets. Matching is case-insensitive substring search and each
//! keyword counts at most once, however often it appears.
//!
//! Adjustments are applied in a fixed order on an unclamped intermediate
//! value; only the final result is clamped:
//!
//! 1. `0.5 + 0.1 * positives - 0.1 * negatives`
//! 2. `+0.1` when the feedback names strengths, weaknesses, suggestions or a rating
//! 3. `-0.15` when negatives outnumber positives more than two to one
//! 4. `+0.2` when there are at least three positives and no negatives
//! 5. `+0.05` per improvement indicator
//!
//! # Example
//!
//! ```
//! use reflect_orchestrator::evaluate_quality;
//!
//! assert!((evaluate_quality("") - 0.5).abs() < f64::EPSILON);
//! assert!(evaluate_quality("Vague, generic and weak.") < 0.5);
//! ```

const POSITIVE_KEYWORDS: &[&str] = &[
    "excellent",
    "great",
    "accurate",
    "clear",
    "complete",
    "well-structured",
    "good",
    "satisfactory",
    "comprehensive",
    "precise",
    "inspiring",
    "impactful",
    "memorable",
    "uplifting",
    "motivational",
    "emotionally resonant",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "missing",
    "unclear",
    "inaccurate",
    "incomplete",
    "needs improvement",
    "lacks",
    "confusing",
    "vague",
    "incorrect",
    "generic",
    "uninspiring",
    "lacks impact",
    "not memorable",
    "weak",
];

const STRUCTURED_FEEDBACK_KEYWORDS: &[&str] =
    &["strength", "weakness", "suggestion", "rating", "specific"];

const IMPROVEMENT_INDICATORS: &[&str] = &[
    "improved",
    "better",
    "enhanced",
    "stronger",
    "more impactful",
    "excellent",
];

const BASE_SCORE: f64 = 0.5;
const KEYWORD_WEIGHT: f64 = 0.1;
const STRUCTURED_FEEDBACK_BONUS: f64 = 0.1;
const NEGATIVE_OVERLOAD_PENALTY: f64 = 0.15;
const HIGHLY_POSITIVE_BONUS: f64 = 0.2;
const IMPROVEMENT_INDICATOR_WEIGHT: f64 = 0.05;

const MIN_POSITIVE_FOR_BONUS: usize = 3;
const NEGATIVE_RATIO_THRESHOLD: usize = 2;

const MIN_SCORE: f64 = 0.0;
const MAX_SCORE: f64 = 1.0;

/// Breakdown of how a critique was scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityAssessment {
    /// Distinct positive keywords found.
    pub positive_count: usize,
    /// Distinct negative keywords found.
    pub negative_count: usize,
    /// Whether any structured-feedback marker was found.
    pub structured: bool,
    /// Distinct improvement indicators found.
    pub improvement_count: usize,
    /// Final clamped score.
    pub score: f64,
}

/// Scores a critique, returning a value in `[0, 1]`.
#[must_use]
pub fn evaluate_quality(critique: &str) -> f64 {
    assess(critique).score
}

/// Scores a critique and returns the intermediate counts alongside the score.
#[must_use]
pub fn assess(critique: &str) -> QualityAssessment {
    let lowered = critique.to_lowercase();

    let positive_count = count_keywords(&lowered, POSITIVE_KEYWORDS);
    let negative_count = count_keywords(&lowered, NEGATIVE_KEYWORDS);
    let structured = STRUCTURED_FEEDBACK_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword));
    let improvement_count = count_keywords(&lowered, IMPROVEMENT_INDICATORS);

    let mut score = base_score(positive_count, negative_count);

    if structured {
        score += STRUCTURED_FEEDBACK_BONUS;
    }

    if negative_count > positive_count * NEGATIVE_RATIO_THRESHOLD {
        score -= NEGATIVE_OVERLOAD_PENALTY;
    }

    if positive_count >= MIN_POSITIVE_FOR_BONUS && negative_count == 0 {
        score += HIGHLY_POSITIVE_BONUS;
    }

    score += count_as_f64(improvement_count) * IMPROVEMENT_INDICATOR_WEIGHT;

    QualityAssessment {
        positive_count,
        negative_count,
        structured,
        improvement_count,
        score: score.clamp(MIN_SCORE, MAX_SCORE),
    }
}

fn count_keywords(lowered: &str, keywords: &[&str]) -> usize {
    keywords
        .iter()
        .filter(|keyword| lowered.contains(*keyword))
        .count()
}

fn base_score(positive_count: usize, negative_count: usize) -> f64 {
    BASE_SCORE + count_as_f64(positive_count) * KEYWORD_WEIGHT
        - count_as_f64(negative_count) * KEYWORD_WEIGHT
}

// Counts are bounded by the keyword table sizes.
#[allow(clippy::cast_precision_loss)]
const fn count_as_f64(count: usize) -> f64 {
    count as f64
}
