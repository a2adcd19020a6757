//! Diagnostic infrastructure for error reporting
//!
//! Wraps the middle-end's analysis errors into structured diagnostics with
//! source context, a terminal renderer, and a JSON form for IDE integration.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use serde::{Deserialize, Serialize};
use vela_ir::Span;

use crate::error::AnalysisError;

/// Error code for a diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

/// A diagnostic message with source code context
pub struct Diagnostic {
    inner: CsDiagnostic<usize>,
    code: Option<ErrorCode>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            inner: CsDiagnostic::new(Severity::Error).with_message(message),
            code: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code.clone());
        self.inner = self.inner.with_code(code.0);
        self
    }

    /// Add a primary label (main error location)
    pub fn with_primary_label(
        mut self,
        file_id: usize,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        let label = Label::primary(file_id, span.start as usize..span.end as usize)
            .with_message(message);
        self.inner.labels.push(label);
        self
    }

    /// Create a diagnostic from an analysis error
    pub fn from_analysis_error(error: &AnalysisError, file_id: usize) -> Self {
        match error {
            AnalysisError::UseBeforeInit { loc, .. } => {
                Diagnostic::error(error.to_string())
                    .with_code(error_code(error))
                    .with_primary_label(file_id, *loc, "read before any write")
            }
            AnalysisError::MissingReturn { loc } => Diagnostic::error(error.to_string())
                .with_code(error_code(error))
                .with_primary_label(file_id, *loc, "may fall off the end of this function"),
        }
    }

    /// Emit the diagnostic to stderr with colors
    pub fn emit(
        &self,
        files: &SimpleFiles<String, String>,
    ) -> Result<(), codespan_reporting::files::Error> {
        let mut writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        term::emit(&mut writer, &config, files, &self.inner)
    }

    /// Get the underlying codespan diagnostic (for testing/custom rendering)
    pub fn inner(&self) -> &CsDiagnostic<usize> {
        &self.inner
    }

    /// Convert to JSON representation for IDE integration
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let json_diag = JsonDiagnostic {
            code: self.code.as_ref().map(|c| c.0.to_string()),
            severity: "error".to_string(),
            message: self.inner.message.clone(),
            labels: self
                .inner
                .labels
                .iter()
                .map(|label| JsonLabel {
                    start: label.range.start,
                    end: label.range.end,
                    message: label.message.clone(),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&json_diag)
    }
}

/// JSON representation of a diagnostic for IDE integration
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDiagnostic {
    /// Error code (e.g., "V1001")
    pub code: Option<String>,
    /// Severity level
    pub severity: String,
    /// Main error message
    pub message: String,
    /// Labelled byte ranges
    pub labels: Vec<JsonLabel>,
}

/// JSON representation of a diagnostic label
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonLabel {
    /// Start byte offset
    pub start: usize,
    /// End byte offset
    pub end: usize,
    /// Label message
    pub message: String,
}

/// Get the error code for an analysis error
pub fn error_code(error: &AnalysisError) -> ErrorCode {
    match error {
        AnalysisError::UseBeforeInit { .. } => ErrorCode("V1001"),
        AnalysisError::MissingReturn { .. } => ErrorCode("V1002"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_use_before_init() {
        let error = AnalysisError::UseBeforeInit {
            name: "x".to_string(),
            loc: Span::new(10, 11, 2, 3),
        };
        let diag = Diagnostic::from_analysis_error(&error, 0);
        assert_eq!(diag.code, Some(ErrorCode("V1001")));
        assert!(diag.inner().message.contains("'x'"));
        assert_eq!(diag.inner().labels.len(), 1);
    }

    #[test]
    fn test_json_output() {
        let error = AnalysisError::MissingReturn {
            loc: Span::new(0, 5, 1, 1),
        };
        let diag = Diagnostic::from_analysis_error(&error, 0);
        let json = diag.to_json().unwrap();
        assert!(json.contains("\"V1002\""));
        assert!(json.contains("\"message\""));
    }
}
