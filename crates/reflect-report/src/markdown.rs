//! Markdown report generation.
//!
//! [`MarkdownGenerator`] renders a [`RunReport`] as:
//!
//! - a title and summary table
//! - one section per iteration with its phrase, critique and score
//! - the final phrase
//! - a footer with the generation timestamp

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{IterationEntry, RunReport};

/// Generates Markdown reports from reflection runs.
pub struct MarkdownGenerator<'a> {
    report: &'a RunReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a RunReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_iterations(&mut output);
        self.write_final_phrase(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Reflection Report: {}\n",
            escape_markdown(&self.report.theme)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let report = self.report;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Status | {} |", report.status.description());
        if !report.model.is_empty() {
            let _ = writeln!(output, "| Model | {} |", escape_markdown(&report.model));
        }
        let _ = writeln!(
            output,
            "| Iterations | {} of {} |",
            report.total_iterations(),
            report.max_iterations
        );
        let _ = writeln!(
            output,
            "| Quality Threshold | {:.2} |",
            report.quality_threshold
        );
        if let Some(score) = report.final_score() {
            let _ = writeln!(output, "| Final Score | {score:.2} |");
        }
        if let Some(best) = report.best_iteration() {
            let _ = writeln!(
                output,
                "| Best Iteration | #{} ({:.2}) |",
                best.iteration, best.quality_score
            );
        }
        if let Some(change) = report.score_change() {
            let _ = writeln!(output, "| Score Change | {change:+.2} |");
        }
        let _ = writeln!(output);
    }

    fn write_iterations(&self, output: &mut String) {
        let _ = writeln!(output, "## Iterations\n");

        for entry in &self.report.iterations {
            Self::write_iteration(output, entry);
        }
    }

    fn write_iteration(output: &mut String, entry: &IterationEntry) {
        let _ = writeln!(
            output,
            "### Iteration {}: {:.2} ({})\n",
            entry.iteration,
            entry.quality_score,
            entry.band()
        );

        let source = if entry.iteration == 1 {
            "Generated"
        } else {
            "Refined"
        };
        let _ = writeln!(output, "**{source} phrase**:\n");
        let _ = writeln!(output, "{}\n", blockquote(&entry.response));
        let _ = writeln!(output, "**Critique**:\n");
        let _ = writeln!(output, "{}\n", blockquote(&entry.feedback));
    }

    fn write_final_phrase(&self, output: &mut String) {
        let _ = writeln!(output, "## Final Phrase\n");
        let _ = writeln!(output, "{}\n", blockquote(&self.report.final_response));
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.generated_at);
        let _ = writeln!(output, "*Generated by Reflection Agent at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes characters that would otherwise be read as Markdown formatting.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

/// Quotes free text, keeping its line structure.
fn blockquote(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "> *(empty)*".to_string();
    }

    trimmed
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================
