//! JSON report generation.
//!
//! [`JsonGenerator`] serializes a [`RunReport`] as compact single-line JSON or
//! pretty-printed JSON, and can write either form to a file.
//!
//! # Example
//!
//! ```rust
//! use reflect_report::{IterationEntry, RunReport};
//! use reflect_report::json::JsonGenerator;
//!
//! let report = RunReport::builder()
//!     .theme("courage")
//!     .iteration(IterationEntry::new(1, "Be brave.", "Clear.", 0.6))
//!     .build()
//!     .unwrap();
//!
//! let generator = JsonGenerator::new(&report);
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ReportError, Result, RunReport};

/// JSON report generator.
pub struct JsonGenerator<'a> {
    report: &'a RunReport,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a RunReport) -> Self {
        Self { report }
    }

    /// Generates compact JSON output (single line, no extra whitespace).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output with 2-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the JSON report to a file, creating or overwriting it.
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}
