//! Plain-text summary for terminals.

use std::fmt::Write;

use crate::RunReport;

/// Renders the short summary printed after a run.
///
/// ```text
/// === Reflection Summary ===
/// Theme: perseverance
/// Total iterations: 2
/// Stopped early: Yes
///
/// Iterations:
///   Iteration 1: Quality Score = 0.45
///   Iteration 2: Quality Score = 1.00
///
/// Final phrase:
/// Every mountain is climbed one step at a time.
/// ```
pub struct ConsoleSummary<'a> {
    report: &'a RunReport,
}

impl<'a> ConsoleSummary<'a> {
    /// Creates a summary for the given report.
    #[must_use]
    pub const fn new(report: &'a RunReport) -> Self {
        Self { report }
    }

    /// Renders the summary.
    #[must_use]
    pub fn render(&self) -> String {
        let report = self.report;
        let mut output = String::new();

        let _ = writeln!(output, "=== Reflection Summary ===");
        let _ = writeln!(output, "Theme: {}", report.theme);
        let _ = writeln!(output, "Total iterations: {}", report.total_iterations());
        let _ = writeln!(
            output,
            "Stopped early: {}",
            if report.status.stopped_early() {
                "Yes"
            } else {
                "No"
            }
        );
        let _ = writeln!(output);

        let _ = writeln!(output, "Iterations:");
        for entry in &report.iterations {
            let _ = writeln!(
                output,
                "  Iteration {}: Quality Score = {:.2}",
                entry.iteration, entry.quality_score
            );
        }
        let _ = writeln!(output);

        let _ = writeln!(output, "Final phrase:");
        let _ = writeln!(output, "{}", report.final_response.trim());

        output
    }
}

impl std::fmt::Display for ConsoleSummary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
