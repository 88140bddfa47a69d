//! Target distribution profiles
//!
//! A [`DistroProfile`] owns the soname lookup table, the rpm macros passed to
//! rpmbuild, and the scriptlet conventions used in `%post`/`%postun`. The
//! built-in profiles are all [`TableProfile`]s: the core soname table with
//! per-distribution override layers on top.

mod tables;

use tables::{Overrides, SonameTable, EL_OVERRIDES, FEDORA_OVERRIDES, RHEL_OVERRIDES};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ConvertError, Result};
use crate::models::PackageRef;

/// Supported target distributions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    /// Fedora
    #[default]
    Fedora,
    /// CentOS Stream
    Centos,
    /// Red Hat Enterprise Linux
    Rhel,
}

impl ProfileKind {
    /// All known profiles
    pub const ALL: [ProfileKind; 3] = [Self::Fedora, Self::Centos, Self::Rhel];

    /// Identifier used in configuration and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fedora => "fedora",
            Self::Centos => "centos",
            Self::Rhel => "rhel",
        }
    }

    /// Detect the host distribution from `/etc/os-release`
    pub fn detect() -> Option<Self> {
        Self::detect_from(Path::new("/etc/os-release"))
    }

    /// Detect from an os-release style file
    pub fn detect_from(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        Self::from_os_release(&content)
    }

    /// Match the `ID` key first, then each `ID_LIKE` entry
    pub fn from_os_release(content: &str) -> Option<Self> {
        let mut id = None;
        let mut id_like = Vec::new();

        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'').to_lowercase();
            match key.trim() {
                "ID" => id = Some(value),
                "ID_LIKE" => id_like = value.split_whitespace().map(str::to_string).collect(),
                _ => {}
            }
        }

        id.into_iter()
            .chain(id_like)
            .find_map(|candidate| candidate.parse().ok())
    }
}

impl FromStr for ProfileKind {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fedora" => Ok(Self::Fedora),
            "centos" | "centos-stream" => Ok(Self::Centos),
            "rhel" | "redhat" => Ok(Self::Rhel),
            other => Err(ConvertError::Config(format!(
                "Unknown distribution profile '{}' (expected fedora, centos or rhel)",
                other
            ))),
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-distribution packaging conventions
pub trait DistroProfile: Send + Sync {
    /// Which distribution this profile targets
    fn kind(&self) -> ProfileKind;

    /// Human readable name
    fn display_name(&self) -> &'static str;

    /// Value of the `%{dist}` macro
    fn dist_tag(&self) -> &'static str;

    /// Providing package for a soname, if the built-in table knows it
    fn lookup(&self, soname: &str) -> Option<PackageRef>;

    /// Number of sonames the built-in table knows
    fn table_size(&self) -> usize;

    /// Macros passed to rpmbuild with `--define`
    fn rpm_macros(&self) -> Vec<(String, String)> {
        vec![
            ("dist".to_string(), self.dist_tag().to_string()),
            ("__os_install_post".to_string(), "%{nil}".to_string()),
            ("_build_id_links".to_string(), "none".to_string()),
            ("debug_package".to_string(), "%{nil}".to_string()),
        ]
    }

    /// Body of `%post`
    fn post_scriptlet(&self, has_icon: bool) -> String {
        refresh_caches(has_icon)
    }

    /// Body of `%postun`
    fn postun_scriptlet(&self, has_icon: bool) -> String {
        refresh_caches(has_icon)
    }
}

/// Scriptlet refreshing the desktop database and, with an icon, the hicolor cache.
/// Every command is skipped when its tool is absent and never fails the transaction.
pub(crate) fn refresh_caches(has_icon: bool) -> String {
    let mut script = String::new();
    if has_icon {
        script.push_str(
            "if [ -x /usr/bin/gtk-update-icon-cache ]; then\n    \
             /usr/bin/gtk-update-icon-cache -f -t -q /usr/share/icons/hicolor &>/dev/null || :\n\
             fi\n",
        );
    }
    script.push_str(
        "if [ -x /usr/bin/update-desktop-database ]; then\n    \
         /usr/bin/update-desktop-database -q /usr/share/applications &>/dev/null || :\n\
         fi\n",
    );
    script
}

/// Profile backed by the core soname table plus override layers
#[derive(Debug, Clone)]
pub struct TableProfile {
    kind: ProfileKind,
    display_name: &'static str,
    dist_tag: &'static str,
    table: SonameTable,
}

impl TableProfile {
    fn new(
        kind: ProfileKind,
        display_name: &'static str,
        dist_tag: &'static str,
        overrides: &[Overrides],
    ) -> Self {
        Self {
            kind,
            display_name,
            dist_tag,
            table: SonameTable::with_overrides(overrides),
        }
    }
}

impl DistroProfile for TableProfile {
    fn kind(&self) -> ProfileKind {
        self.kind
    }

    fn display_name(&self) -> &'static str {
        self.display_name
    }

    fn dist_tag(&self) -> &'static str {
        self.dist_tag
    }

    fn lookup(&self, soname: &str) -> Option<PackageRef> {
        self.table.get(soname).map(PackageRef::new)
    }

    fn table_size(&self) -> usize {
        self.table.len()
    }
}

/// Profile implementation for a kind
pub fn profile_for(kind: ProfileKind) -> Box<dyn DistroProfile> {
    let profile = match kind {
        ProfileKind::Fedora => TableProfile::new(kind, "Fedora", ".fc", &[FEDORA_OVERRIDES]),
        ProfileKind::Centos => TableProfile::new(kind, "CentOS Stream", ".el9", &[EL_OVERRIDES]),
        ProfileKind::Rhel => TableProfile::new(
            kind,
            "Red Hat Enterprise Linux",
            ".el9",
            &[EL_OVERRIDES, RHEL_OVERRIDES],
        ),
    };
    Box::new(profile)
}

/// Every available profile
pub fn all_profiles() -> Vec<Box<dyn DistroProfile>> {
    ProfileKind::ALL.iter().map(|kind| profile_for(*kind)).collect()
}

/// Profile from configuration, else the host, else Fedora
pub fn resolve_kind(configured: Option<&str>) -> Result<ProfileKind> {
    match configured {
        Some(name) => name.parse(),
        None => Ok(ProfileKind::detect().unwrap_or_default()),
    }
}
