//! Warnings and the final result of a conversion

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Non-fatal finding accumulated during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Warning {
    /// A metadata field fell back to a derived or default value
    Metadata {
        /// Field name
        field: String,
        /// What happened
        message: String,
    },
    /// No icon could be found
    Icon(String),
    /// A soname could not be mapped to a package
    Dependency {
        /// Unresolved soname
        soname: String,
    },
}

impl Warning {
    /// Metadata warning helper
    pub fn metadata(field: &str, message: impl Into<String>) -> Self {
        Self::Metadata {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata { field, message } => write!(f, "metadata: {}: {}", field, message),
            Self::Icon(message) => write!(f, "icon: {}", message),
            Self::Dependency { soname } => write!(
                f,
                "dependency: no package provides {}, it is left out of Requires",
                soname
            ),
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    success: bool,
    artifact: Option<PathBuf>,
    sha256: Option<String>,
    spec_path: Option<PathBuf>,
    stdout: String,
    stderr: String,
    warnings: Vec<Warning>,
}

impl BuildResult {
    /// Result of a successful build
    pub fn success(
        artifact: PathBuf,
        sha256: String,
        spec_path: Option<PathBuf>,
        stdout: String,
        stderr: String,
        warnings: Vec<Warning>,
    ) -> Self {
        Self {
            success: true,
            artifact: Some(artifact),
            sha256: Some(sha256),
            spec_path,
            stdout,
            stderr,
            warnings,
        }
    }

    /// Whether the run produced a package
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Path to the produced rpm
    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// SHA-256 of the produced rpm
    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    /// Path of the copied spec file, when requested
    pub fn spec_path(&self) -> Option<&Path> {
        self.spec_path.as_deref()
    }

    /// Captured rpmbuild stdout
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured rpmbuild stderr
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Warnings accumulated during the run
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_display() {
        let warning = Warning::Dependency {
            soname: "libfoo.so.1".into(),
        };
        assert!(warning.to_string().contains("libfoo.so.1"));

        let warning = Warning::metadata("version", "defaulted to 1.0.0");
        assert_eq!(warning.to_string(), "metadata: version: defaulted to 1.0.0");
    }
}
