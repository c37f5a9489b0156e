//! Resolution error taxonomy
//!
//! Every failure the engine can hit while loading, merging or expanding
//! documents is one of these variants. Errors never escape `Engine::compile`
//! directly; they are converted into [`crate::validation::Finding`]s.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised while resolving a prompt document graph
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{}: {message}", .file.display())]
    Structural {
        file: PathBuf,
        field: Option<String>,
        message: String,
    },

    #[error("{}: {message}", .file.display())]
    Path {
        file: PathBuf,
        field: Option<String>,
        message: String,
    },

    #[error("{}: {message}", .file.display())]
    Inheritance {
        file: PathBuf,
        field: Option<String>,
        message: String,
    },

    #[error(
        "{}: import `{import}` defines key `{key}` in both {} and {}",
        .file.display(),
        .first.display(),
        .second.display()
    )]
    ImportConflict {
        file: PathBuf,
        import: String,
        key: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{}: {message}", .file.display())]
    Template {
        file: PathBuf,
        field: Option<String>,
        message: String,
    },
}

impl ResolveError {
    pub fn structural(file: &Path, field: Option<&str>, message: impl Into<String>) -> Self {
        Self::Structural {
            file: file.to_path_buf(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn path(file: &Path, field: Option<&str>, message: impl Into<String>) -> Self {
        Self::Path {
            file: file.to_path_buf(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn inheritance(file: &Path, field: Option<&str>, message: impl Into<String>) -> Self {
        Self::Inheritance {
            file: file.to_path_buf(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn template(file: &Path, field: Option<&str>, message: impl Into<String>) -> Self {
        Self::Template {
            file: file.to_path_buf(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    /// Source file the error is reported against
    pub fn file(&self) -> &Path {
        match self {
            Self::Structural { file, .. }
            | Self::Path { file, .. }
            | Self::Inheritance { file, .. }
            | Self::ImportConflict { file, .. }
            | Self::Template { file, .. } => file,
        }
    }

    /// Document field the error is attached to, if any
    pub fn field(&self) -> Option<String> {
        match self {
            Self::Structural { field, .. }
            | Self::Path { field, .. }
            | Self::Inheritance { field, .. }
            | Self::Template { field, .. } => field.clone(),
            Self::ImportConflict { import, .. } => Some(format!("imports.{}", import)),
        }
    }

    /// Human-readable message without the file prefix
    pub fn message(&self) -> String {
        match self {
            Self::Structural { message, .. }
            | Self::Path { message, .. }
            | Self::Inheritance { message, .. }
            | Self::Template { message, .. } => message.clone(),
            Self::ImportConflict {
                import,
                key,
                first,
                second,
                ..
            } => format!(
                "import `{}` defines key `{}` in both {} and {}",
                import,
                key,
                first.display(),
                second.display()
            ),
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(self, Self::Path { .. })
    }

    pub fn is_template(&self) -> bool {
        matches!(self, Self::Template { .. })
    }
}
