//! Application metadata resolved from an AppImage

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::profiles::ProfileKind;

/// Where a metadata field value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSource {
    /// User override
    Override,
    /// Desktop entry
    DesktopEntry,
    /// AppStream metainfo
    AppStream,
    /// Derived from the AppImage filename
    Filename,
    /// Built-in default
    Default,
}

/// Application metadata for the produced package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Package name (sanitized)
    pub name: String,
    /// Human readable application name
    pub display_name: String,
    /// Package version (sanitized)
    pub version: String,
    /// Package release number
    pub release: String,
    /// One-line summary
    pub summary: String,
    /// Long description
    pub description: String,
    /// License identifier
    pub license: String,
    /// Project homepage
    pub url: Option<String>,
    /// Desktop categories
    pub categories: Vec<String>,
    /// Icon name declared by the desktop entry
    pub icon_name: Option<String>,
    /// Exec line declared by the desktop entry
    pub exec: Option<String>,
    /// Whether the application runs in a terminal
    pub terminal: bool,
    /// Target distribution profile
    pub profile: ProfileKind,
    /// Source of the name field
    pub name_source: FieldSource,
    /// Source of the version field
    pub version_source: FieldSource,
}

impl Metadata {
    /// Create metadata with the given name and version, sanitizing both
    pub fn new(name: &str, version: &str) -> Result<Self> {
        let package_name = sanitize_name(name)?;
        Ok(Self {
            display_name: name.trim().to_string(),
            name: package_name,
            version: sanitize_version(version)?,
            release: "1".to_string(),
            summary: String::new(),
            description: String::new(),
            license: "Proprietary".to_string(),
            url: None,
            categories: Vec::new(),
            icon_name: None,
            exec: None,
            terminal: false,
            profile: ProfileKind::default(),
            name_source: FieldSource::Default,
            version_source: FieldSource::Default,
        })
    }

    /// Summary with a fallback for bundles that declare none
    pub fn effective_summary(&self) -> String {
        if self.summary.trim().is_empty() {
            format!("{} packaged from AppImage", self.display_name)
        } else {
            self.summary.clone()
        }
    }

    /// Description with a fallback to the summary
    pub fn effective_description(&self) -> String {
        if self.description.trim().is_empty() {
            self.effective_summary()
        } else {
            self.description.clone()
        }
    }

    /// `version-release` string
    pub fn full_version(&self) -> String {
        format!("{}-{}", self.version, self.release)
    }
}

/// Turn an arbitrary application name into a valid RPM package name
pub fn sanitize_name(name: &str) -> Result<String> {
    let mut sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    // Collapse runs of separators produced by spaces and punctuation
    while sanitized.contains("--") {
        sanitized = sanitized.replace("--", "-");
    }
    let sanitized = sanitized.trim_end_matches('-').to_string();

    if sanitized.is_empty() || sanitized.chars().all(|c| matches!(c, '-' | '.')) {
        return Err(ConvertError::InvalidInput(format!(
            "Application name '{}' has no usable characters",
            name
        )));
    }

    if sanitized.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
        Ok(format!("app-{}", sanitized.trim_start_matches('-')))
    } else {
        Ok(sanitized)
    }
}

/// Turn an arbitrary version string into a valid RPM version
pub fn sanitize_version(version: &str) -> Result<String> {
    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(trimmed);

    let sanitized: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '~' | '^') {
                c
            } else {
                '.'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches('.').to_string();

    if sanitized.is_empty() {
        return Err(ConvertError::InvalidInput(format!(
            "Version '{}' has no usable characters",
            version
        )));
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Foo Bar").unwrap(), "foo-bar");
        assert_eq!(sanitize_name("my/app").unwrap(), "my-app");
        assert_eq!(sanitize_name("7zip").unwrap(), "app-7zip");
        assert!(sanitize_name("  ").is_err());
        assert!(sanitize_name("///").is_err());
    }

    #[test]
    fn test_sanitize_version() {
        assert_eq!(sanitize_version("v1.2.3").unwrap(), "1.2.3");
        assert_eq!(sanitize_version("1.2.3-beta").unwrap(), "1.2.3.beta");
        assert_eq!(sanitize_version("2024/01").unwrap(), "2024.01");
        assert_eq!(sanitize_version("version").unwrap(), "version");
        assert!(sanitize_version("--").is_err());
    }

    #[test]
    fn test_effective_summary_fallback() {
        let metadata = Metadata::new("Foo", "1.0").unwrap();
        assert_eq!(metadata.name, "foo");
        assert_eq!(metadata.effective_summary(), "Foo packaged from AppImage");
        assert_eq!(metadata.effective_description(), metadata.effective_summary());
        assert_eq!(metadata.full_version(), "1.0-1");
    }
}
