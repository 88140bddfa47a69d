//! Shared library dependencies and their package mapping

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConvertError, Result};

/// Version comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VersionOp {
    /// Equal to (=)
    Eq,
    /// Greater than or equal (>=)
    Ge,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Less than (<)
    Lt,
}

impl VersionOp {
    /// RPM operator spelling
    pub fn to_rpm_format(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }

    /// Parse an operator
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim() {
            "=" | "==" => Some(Self::Eq),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            ">" | ">>" => Some(Self::Gt),
            "<" | "<<" => Some(Self::Lt),
            _ => None,
        }
    }
}

impl fmt::Display for VersionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rpm_format())
    }
}

/// A version constraint on a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionConstraint {
    /// Comparison operator
    pub op: VersionOp,
    /// Version string
    pub version: String,
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op, self.version)
    }
}

/// A package reference with an optional constraint, e.g. `openssl-libs >= 3.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    /// Distribution package name
    pub name: String,
    /// Optional version constraint
    pub constraint: Option<VersionConstraint>,
}

impl PackageRef {
    /// Package reference without a constraint
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
        }
    }

    /// Parse `name [op version]`
    pub fn parse(s: &str) -> Result<Self> {
        lazy_static::lazy_static! {
            static ref REF_RE: Regex = Regex::new(
                r"^\s*([A-Za-z0-9][A-Za-z0-9+._-]*)\s*(?:(>=|<=|==|=|>|<)\s*([A-Za-z0-9.:_+~^-]+))?\s*$"
            ).unwrap();
        }

        let caps = REF_RE
            .captures(s)
            .ok_or_else(|| ConvertError::Config(format!("Invalid package reference: '{}'", s)))?;

        let name = caps[1].to_string();
        let constraint = match (caps.get(2), caps.get(3)) {
            (Some(op), Some(version)) => VersionOp::parse(op.as_str()).map(|op| VersionConstraint {
                op,
                version: version.as_str().to_string(),
            }),
            _ => None,
        };

        Ok(Self { name, constraint })
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some(constraint) => write!(f, "{} {}", self.name, constraint),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Where a soname mapping came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingSource {
    /// User configuration
    User,
    /// Built-in profile table
    Builtin,
    /// Package manager query
    PackageManager,
}

/// A shared library required by the bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Required soname, e.g. `libgtk-3.so.0`
    pub soname: String,
    /// Providing distribution package, if resolved
    pub package: Option<String>,
    /// Version constraint on the package
    pub constraint: Option<VersionConstraint>,
    /// Where the mapping came from
    pub source: Option<MappingSource>,
}

impl Dependency {
    /// Create an unresolved dependency
    pub fn new(soname: impl Into<String>) -> Self {
        Self {
            soname: soname.into(),
            package: None,
            constraint: None,
            source: None,
        }
    }

    /// Record the providing package
    pub fn resolve(&mut self, package: PackageRef, source: MappingSource) {
        self.package = Some(package.name);
        self.constraint = package.constraint;
        self.source = Some(source);
    }

    /// Check if this dependency has been mapped to a package
    pub fn is_resolved(&self) -> bool {
        self.package.is_some()
    }

    /// `Requires:` value for the spec, if resolved
    pub fn to_requires(&self) -> Option<String> {
        let package = self.package.as_ref()?;
        Some(match &self.constraint {
            Some(constraint) => format!("{} {}", package, constraint),
            None => package.clone(),
        })
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_requires() {
            Some(requires) => write!(f, "{} -> {}", self.soname, requires),
            None => write!(f, "{} -> (unresolved)", self.soname),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_ref() {
        let pkg = PackageRef::parse("gtk3").unwrap();
        assert_eq!(pkg.name, "gtk3");
        assert!(pkg.constraint.is_none());
    }

    #[test]
    fn test_parse_versioned_ref() {
        let pkg = PackageRef::parse("openssl-libs >= 3.0.1").unwrap();
        assert_eq!(pkg.name, "openssl-libs");
        let constraint = pkg.constraint.unwrap();
        assert_eq!(constraint.op, VersionOp::Ge);
        assert_eq!(constraint.version, "3.0.1");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PackageRef::parse("").is_err());
        assert!(PackageRef::parse("foo bar baz").is_err());
    }

    #[test]
    fn test_requires_rendering() {
        let mut dep = Dependency::new("libssl.so.3");
        assert_eq!(dep.to_requires(), None);

        dep.resolve(PackageRef::parse("openssl-libs >= 3.0").unwrap(), MappingSource::User);
        assert!(dep.is_resolved());
        assert_eq!(dep.to_requires().as_deref(), Some("openssl-libs >= 3.0"));
    }
}
