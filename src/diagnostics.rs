//! Structured diagnostics produced while resolving a backend.
//!
//! Every recoverable failure surfaces as a [`Diagnostic`] rather than a bare
//! string, so callers can render, filter, or assert on them by [`DiagnosticKind`].

use std::fmt;
use std::path::PathBuf;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// The class of problem a diagnostic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Declared or saved backend configuration is invalid.
    Config,
    /// The transition needs `init` before it may proceed.
    InitRequired,
    /// Configuration changed and neither migration nor reconfiguration was requested.
    MigrateOrReconfigure,
    /// Reading or writing persisted data failed.
    Io,
    /// The working directory still carries legacy remote state.
    LegacyRemoteState,
    /// State migration failed or was declined.
    Migration,
    /// Reported by a backend implementation.
    Backend,
    /// Workspace selection failed.
    Workspace,
}

/// Where in the declared configuration a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub filename: PathBuf,
    pub line: Option<usize>,
}

impl SourceRange {
    pub fn file(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            line: None,
        }
    }
}

impl fmt::Display for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.filename.display(), line),
            None => write!(f, "{}", self.filename.display()),
        }
    }
}

/// A single structured diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub summary: String,
    pub detail: String,
    pub subject: Option<SourceRange>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            summary: summary.into(),
            detail: detail.into(),
            subject: None,
        }
    }

    pub fn warning(
        kind: DiagnosticKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            summary: summary.into(),
            detail: detail.into(),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: SourceRange) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
        };
        write!(f, "{}: {}", label, self.summary)?;
        if let Some(subject) = &self.subject {
            write!(f, "\n\n  on {}", subject)?;
        }
        if !self.detail.is_empty() {
            write!(f, "\n\n{}", self.detail)?;
        }
        Ok(())
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    /// First error-severity diagnostic, if any.
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.0.iter().find(|d| d.is_error())
    }

    /// Whether any diagnostic of the given kind is present.
    pub fn has_kind(&self, kind: DiagnosticKind) -> bool {
        self.0.iter().any(|d| d.kind == kind)
    }

    /// Attach `subject` to every diagnostic that does not already carry one.
    pub fn in_config_body(mut self, subject: Option<&SourceRange>) -> Self {
        if let Some(subject) = subject {
            for diag in self.0.iter_mut().filter(|d| d.subject.is_none()) {
                diag.subject = Some(subject.clone());
            }
        }
        self
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diag) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
                writeln!(f)?;
            }
            write!(f, "{}", diag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_errors_ignores_warnings() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning(DiagnosticKind::Backend, "careful", ""));
        assert!(!diags.has_errors());

        diags.push(Diagnostic::error(DiagnosticKind::Config, "broken", ""));
        assert!(diags.has_errors());
        assert_eq!(diags.first_error().unwrap().summary, "broken");
    }

    #[test]
    fn test_in_config_body_keeps_existing_subject() {
        let own = SourceRange::file("own.toml");
        let body = SourceRange::file("main.toml");
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error(DiagnosticKind::Backend, "a", "").with_subject(own.clone()));
        diags.push(Diagnostic::error(DiagnosticKind::Backend, "b", ""));

        let diags = diags.in_config_body(Some(&body));
        let subjects: Vec<_> = diags.iter().map(|d| d.subject.clone().unwrap()).collect();
        assert_eq!(subjects, vec![own, body]);
    }

    #[test]
    fn test_display_includes_subject_and_detail() {
        let diag = Diagnostic::error(DiagnosticKind::Config, "Invalid backend type", "No such type.")
            .with_subject(SourceRange::file("main.toml"));
        let rendered = diag.to_string();
        assert!(rendered.starts_with("Error: Invalid backend type"));
        assert!(rendered.contains("on main.toml"));
        assert!(rendered.ends_with("No such type."));
    }
}
