//! Structured failures reported back to the host.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Which layer a failure came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, detected before any network call.
    Validation,
    /// Parse, restrict or serialize failures from the credential engine.
    Credential,
    /// Auth service exchange failures.
    Registration,
    /// Bucket and object failures from the storage network.
    Storage,
    /// Everything else, including cancellation.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Credential => "credential",
            Self::Registration => "registration",
            Self::Storage => "storage",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported problem.
///
/// `detail` carries the upstream error text unmodified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub summary: String,
    pub detail: String,
}

/// The failure list of one operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// A single error diagnostic.
    pub fn error(kind: ErrorKind, summary: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self(vec![Diagnostic {
            severity: Severity::Error,
            kind,
            summary: summary.into(),
            detail: detail.to_string(),
        }])
    }

    /// The error returned when the host cancels an operation.
    pub fn cancelled(step: &str) -> Self {
        Self::error(ErrorKind::Internal, step, "operation cancelled")
    }

    /// Append a non-fatal problem next to the real error.
    pub fn push_warning(
        &mut self,
        kind: ErrorKind,
        summary: impl Into<String>,
        detail: impl fmt::Display,
    ) {
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            kind,
            summary: summary.into(),
            detail: detail.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    /// The first error diagnostic, if any.
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.0.iter().find(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let label = match d.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            write!(f, "{label}: {}: {}", d.summary, d.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}
