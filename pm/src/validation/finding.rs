//! Validation findings and the report that accumulates them

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Validation phase a finding belongs to, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Structural,
    Path,
    Inheritance,
    Import,
    Template,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Structural => "structural",
            Self::Path => "path",
            Self::Inheritance => "inheritance",
            Self::Import => "import",
            Self::Template => "template",
        };
        write!(f, "{}", name)
    }
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Finding {
    pub fn warning(category: Category, file: &Path, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            file: file.to_path_buf(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<ResolveError> for Finding {
    fn from(err: ResolveError) -> Self {
        let category = match &err {
            ResolveError::Structural { .. } => Category::Structural,
            ResolveError::Path { .. } => Category::Path,
            ResolveError::Inheritance { .. } => Category::Inheritance,
            ResolveError::ImportConflict { .. } => Category::Import,
            ResolveError::Template { .. } => Category::Template,
        };
        Self {
            severity: Severity::Error,
            category,
            file: err.file().to_path_buf(),
            field: err.field(),
            message: err.message(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.severity, self.category, self.file.display())?;
        if let Some(field) = &self.field {
            write!(f, " ({})", field)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Accumulator shared by every validation phase
///
/// Phases push into the report instead of returning early, so the caller sees
/// the complete set of problems in one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding unless an identical one is already present
    pub fn push(&mut self, finding: Finding) {
        if !self.findings.contains(&finding) {
            self.findings.push(finding);
        }
    }

    pub fn error(&mut self, err: ResolveError) {
        self.push(Finding::from(err));
    }

    pub fn extend<I>(&mut self, findings: I)
    where
        I: IntoIterator<Item = Finding>,
    {
        for finding in findings {
            self.push(finding);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(Finding::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.is_error())
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.category == category)
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_resolve_error_maps_category() {
        let finding = Finding::from(ResolveError::path(Path::new("a.yaml"), Some("implements"), "missing"));
        assert_eq!(finding.category, Category::Path);
        assert_eq!(finding.severity, Severity::Error);
        assert_eq!(finding.field.as_deref(), Some("implements"));
        assert_eq!(finding.message, "missing");
    }

    #[test]
    fn test_report_deduplicates() {
        let mut report = ValidationReport::new();
        let err = ResolveError::template(Path::new("a.yaml"), None, "boom");
        report.error(err.clone());
        report.error(err);
        assert_eq!(report.len(), 1);
        assert!(report.has_errors());
    }

    #[test]
    fn test_warnings_do_not_count_as_errors() {
        let mut report = ValidationReport::new();
        report.push(Finding::warning(Category::Inheritance, Path::new("c.yaml"), None, "type inferred"));
        assert!(!report.has_errors());
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.errors().count(), 0);
    }

    #[test]
    fn test_display_format() {
        let finding = Finding::from(ResolveError::structural(Path::new("x.yaml"), Some("prompt"), "required"));
        assert_eq!(finding.to_string(), "error [structural] x.yaml (prompt): required");
    }
}
