//! Application metadata resolution
//!
//! Sources, in order: user overrides, the preferred metadata file (desktop
//! entry by default), the other metadata file, the AppImage file name, and
//! finally built-in defaults. Resolution never fails on missing data; each
//! defaulted field is recorded as a [`Warning`].

pub mod appstream;
pub mod desktop;

pub use appstream::AppStreamInfo;
pub use desktop::DesktopEntry;

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info};

use crate::config::{release_value, ConversionConfig, MetadataPrecedence};
use crate::error::Result;
use crate::extractor::ExtractedTree;
use crate::models::{sanitize_name, sanitize_version, FieldSource, Metadata, Warning};
use crate::profiles::ProfileKind;

/// Version used when no source provides one
pub const DEFAULT_VERSION: &str = "1.0.0";

const FALLBACK_NAME: &str = "application";

lazy_static::lazy_static! {
    static ref VERSION_PATTERNS: Vec<Regex> = [
        r"[-_](\d+\.\d+\.\d+(?:-\w+(?:\.\d+)?)?)-",
        r"[-_]v(\d+\.\d+\.\d+(?:-\w+(?:\.\d+)?)?)-",
        r"[-_](\d+\.\d+)-",
        r"[-_](\d+)-",
        r"[-_]v?(\d+(?:\.\d+)+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect();

    static ref NAME_SUFFIX_RE: Regex = Regex::new(
        r"(?i)[-_ .](?:v?\d|x86[-_]64|amd64|aarch64|arm64|armhf|i[36]86|linux)"
    ).unwrap();
}

/// User supplied values that win over everything found in the bundle
#[derive(Debug, Clone, Default)]
pub struct MetadataOverrides {
    /// Package name
    pub name: Option<String>,
    /// Package version
    pub version: Option<String>,
    /// Package release
    pub release: Option<String>,
    /// License
    pub license: Option<String>,
}

/// Outcome of metadata resolution
#[derive(Debug, Clone)]
pub struct ResolvedMetadata {
    /// Resolved metadata
    pub metadata: Metadata,
    /// Desktop file found in the tree
    pub desktop_file: Option<PathBuf>,
    /// AppStream file found in the tree
    pub appstream_file: Option<PathBuf>,
    /// Fields that fell back to derived or default values
    pub warnings: Vec<Warning>,
}

/// Resolves [`Metadata`] from an extracted tree
#[derive(Debug, Clone)]
pub struct MetadataResolver {
    precedence: MetadataPrecedence,
    default_license: String,
    default_release: String,
    profile: ProfileKind,
}

/// One metadata file reduced to the fields both formats share
#[derive(Debug, Default)]
struct SourceFields {
    source: Option<FieldSource>,
    name: Option<String>,
    version: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    license: Option<String>,
    url: Option<String>,
    categories: Vec<String>,
}

impl SourceFields {
    fn from_desktop(entry: &DesktopEntry) -> Self {
        Self {
            source: Some(FieldSource::DesktopEntry),
            name: entry.app_name().map(str::to_string),
            version: entry.version().map(str::to_string),
            summary: entry.summary().map(str::to_string),
            description: None,
            license: None,
            url: None,
            categories: entry.categories(),
        }
    }

    fn from_appstream(info: &AppStreamInfo) -> Self {
        Self {
            source: Some(FieldSource::AppStream),
            name: info.name.clone(),
            version: info.version.clone(),
            summary: info.summary.clone(),
            description: info.description.clone(),
            license: info.license.clone(),
            url: info.homepage.clone(),
            categories: info.categories.clone(),
        }
    }
}

impl MetadataResolver {
    /// Create a resolver from the conversion settings
    ///
    /// The configured default release is cleaned here since a hand edited
    /// config file never went through [`Config::set`](crate::config::Config::set).
    pub fn new(config: &ConversionConfig, profile: ProfileKind) -> Result<Self> {
        Ok(Self {
            precedence: config.metadata_precedence,
            default_license: config.default_license.clone(),
            default_release: release_value(&config.default_release)?,
            profile,
        })
    }

    /// Resolve metadata for an extracted tree
    pub fn resolve(
        &self,
        tree: &ExtractedTree,
        overrides: &MetadataOverrides,
    ) -> Result<ResolvedMetadata> {
        let root = tree.root();
        let mut warnings = Vec::new();

        let desktop_file = find_desktop_file(root);
        let desktop = match &desktop_file {
            Some(path) => {
                info!("Reading desktop entry {}", path.display());
                match DesktopEntry::load(path) {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warnings.push(Warning::metadata("desktop", err.to_string()));
                        None
                    }
                }
            }
            None => {
                warnings.push(Warning::metadata("desktop", "no desktop entry in the bundle"));
                None
            }
        };

        let appstream_file = find_appstream_file(root);
        let appstream = match &appstream_file {
            Some(path) => {
                info!("Reading AppStream metadata {}", path.display());
                match AppStreamInfo::load(path) {
                    Ok(info) => Some(info),
                    Err(err) => {
                        warnings.push(Warning::metadata("appstream", err.to_string()));
                        None
                    }
                }
            }
            None => None,
        };

        let desktop_fields = desktop
            .as_ref()
            .map(SourceFields::from_desktop)
            .unwrap_or_default();
        let appstream_fields = appstream
            .as_ref()
            .map(SourceFields::from_appstream)
            .unwrap_or_default();
        let (primary, secondary) = match self.precedence {
            MetadataPrecedence::DesktopEntry => (&desktop_fields, &appstream_fields),
            MetadataPrecedence::Appstream => (&appstream_fields, &desktop_fields),
        };
        let sources = [primary, secondary];

        let stem = tree.source().stem();

        // Name: the first candidate that survives sanitization
        let mut name_candidates: Vec<(String, FieldSource)> = Vec::new();
        if let Some(name) = &overrides.name {
            name_candidates.push((name.clone(), FieldSource::Override));
        }
        for fields in sources {
            if let (Some(name), Some(source)) = (&fields.name, fields.source) {
                name_candidates.push((name.clone(), source));
            }
        }
        name_candidates.push((name_from_filename(&stem), FieldSource::Filename));

        let (display_name, package_name, name_source) = name_candidates
            .into_iter()
            .find_map(|(display, source)| {
                if source == FieldSource::Override {
                    // Overrides are taken as-is; an unusable one is an input error
                    return Some(sanitize_name(&display).map(|n| (display, n, source)));
                }
                sanitize_name(&display).ok().map(|n| Ok((display, n, source)))
            })
            .unwrap_or_else(|| {
                Ok((
                    FALLBACK_NAME.to_string(),
                    FALLBACK_NAME.to_string(),
                    FieldSource::Default,
                ))
            })?;
        if matches!(name_source, FieldSource::Filename | FieldSource::Default) {
            warnings.push(Warning::metadata(
                "name",
                format!("derived '{}' from the file name", package_name),
            ));
        }

        // Version
        let mut version_candidates: Vec<(String, FieldSource)> = Vec::new();
        if let Some(version) = &overrides.version {
            version_candidates.push((version.clone(), FieldSource::Override));
        }
        for fields in sources {
            if let (Some(version), Some(source)) = (&fields.version, fields.source) {
                version_candidates.push((version.clone(), source));
            }
        }
        if let Some(version) = version_from_filename(&stem) {
            version_candidates.push((version, FieldSource::Filename));
        }

        let mut version = None;
        for (candidate, source) in version_candidates {
            match sanitize_version(&candidate) {
                Ok(v) => {
                    version = Some((v, source));
                    break;
                }
                Err(err) if source == FieldSource::Override => return Err(err),
                Err(_) => debug!("Ignoring unusable version '{}'", candidate),
            }
        }
        let (version, version_source) = match version {
            Some(found) => found,
            None => (DEFAULT_VERSION.to_string(), FieldSource::Default),
        };
        match version_source {
            FieldSource::Filename => warnings.push(Warning::metadata(
                "version",
                format!("derived {} from the file name", version),
            )),
            FieldSource::Default => warnings.push(Warning::metadata(
                "version",
                format!("no version found, using {}", DEFAULT_VERSION),
            )),
            _ => {}
        }

        let mut metadata = Metadata::new(&package_name, &version)?;
        metadata.display_name = display_name.trim().to_string();
        metadata.name_source = name_source;
        metadata.version_source = version_source;
        metadata.profile = self.profile;

        metadata.release = match &overrides.release {
            Some(release) => sanitize_version(release)?,
            None => self.default_release.clone(),
        };

        metadata.summary = sources
            .iter()
            .find_map(|f| f.summary.clone())
            .unwrap_or_default();
        if metadata.summary.is_empty() {
            warnings.push(Warning::metadata("summary", "no summary in the bundle"));
        }
        metadata.description = sources
            .iter()
            .find_map(|f| f.description.clone())
            .unwrap_or_default();

        metadata.license = match &overrides.license {
            Some(license) => license.clone(),
            None => match sources.iter().find_map(|f| f.license.clone()) {
                Some(license) => license,
                None => {
                    warnings.push(Warning::metadata(
                        "license",
                        format!("no license declared, using {}", self.default_license),
                    ));
                    self.default_license.clone()
                }
            },
        };
        metadata.url = sources.iter().find_map(|f| f.url.clone());
        metadata.categories = sources
            .iter()
            .map(|f| f.categories.clone())
            .find(|c| !c.is_empty())
            .unwrap_or_default();

        if let Some(entry) = &desktop {
            metadata.icon_name = entry.icon().map(str::to_string);
            metadata.exec = entry.exec().map(str::to_string);
            metadata.terminal = entry.terminal();
        }

        info!(
            "Resolved {} {} ({:?} name, {:?} version)",
            metadata.name,
            metadata.full_version(),
            metadata.name_source,
            metadata.version_source
        );

        Ok(ResolvedMetadata {
            metadata,
            desktop_file,
            appstream_file,
            warnings,
        })
    }
}

/// `*.desktop` in the AppDir root, else `usr/share/applications`, else anywhere
pub fn find_desktop_file(root: &Path) -> Option<PathBuf> {
    first_with_extension(root, "desktop")
        .or_else(|| first_with_extension(&root.join("usr/share/applications"), "desktop"))
        .or_else(|| {
            walkdir::WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .find(|e| {
                    e.file_type().is_file()
                        && e.path().extension().is_some_and(|ext| ext == "desktop")
                })
                .map(|e| e.into_path())
        })
}

/// First AppStream file under `usr/share/metainfo` or `usr/share/appdata`
pub fn find_appstream_file(root: &Path) -> Option<PathBuf> {
    ["usr/share/metainfo", "usr/share/appdata"]
        .iter()
        .find_map(|dir| first_with_extension(&root.join(dir), "xml"))
}

fn first_with_extension(dir: &Path, extension: &str) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == extension))
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Application name from an AppImage file stem, without version and arch suffixes
pub fn name_from_filename(stem: &str) -> String {
    let name = match NAME_SUFFIX_RE.find(stem) {
        Some(m) if m.start() > 0 => &stem[..m.start()],
        _ => stem,
    };
    name.trim().to_string()
}

/// Version embedded in an AppImage file stem
pub fn version_from_filename(stem: &str) -> Option<String> {
    VERSION_PATTERNS
        .iter()
        .find_map(|re| re.captures(stem).map(|c| c[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractMethod;
    use crate::extractor::{Extractor, InputSource};
    use std::fs;
    use tempfile::TempDir;

    fn extract(appdir: &Path, work: &Path) -> ExtractedTree {
        let input = InputSource::from_path(appdir).unwrap();
        Extractor::new(ExtractMethod::Auto)
            .extract(&input, work)
            .unwrap()
    }

    fn resolver(precedence: MetadataPrecedence) -> MetadataResolver {
        let config = ConversionConfig {
            metadata_precedence: precedence,
            ..Default::default()
        };
        MetadataResolver::new(&config, ProfileKind::Fedora).unwrap()
    }

    fn appdir_with_both(temp: &TempDir) -> PathBuf {
        let appdir = temp.path().join("Foo-9.9.9-x86_64.AppDir");
        fs::create_dir_all(appdir.join("usr/share/metainfo")).unwrap();
        fs::write(
            appdir.join("foo.desktop"),
            "[Desktop Entry]\nName=Foo\nX-AppImage-Version=1.2.3\nComment=Desktop summary\n\
             Exec=AppRun %U\nIcon=foo\nCategories=Utility;\n",
        )
        .unwrap();
        fs::write(
            appdir.join("usr/share/metainfo/org.example.foo.appdata.xml"),
            "<component><name>Foo Pro</name><summary>AppStream summary</summary>\
             <description><p>Long text.</p></description>\
             <project_license>MIT</project_license>\
             <releases><release version=\"2.0.0\"/></releases></component>",
        )
        .unwrap();
        appdir
    }

    #[test]
    fn test_desktop_entry_precedence() {
        let temp = TempDir::new().unwrap();
        let appdir = appdir_with_both(&temp);
        let tree = extract(&appdir, &temp.path().join("work"));

        let resolved = resolver(MetadataPrecedence::DesktopEntry)
            .resolve(&tree, &MetadataOverrides::default())
            .unwrap();
        let m = &resolved.metadata;
        assert_eq!(m.name, "foo");
        assert_eq!(m.version, "1.2.3");
        assert_eq!(m.summary, "Desktop summary");
        // Only AppStream has these
        assert_eq!(m.description, "Long text.");
        assert_eq!(m.license, "MIT");
        assert_eq!(m.icon_name.as_deref(), Some("foo"));
        assert_eq!(m.name_source, FieldSource::DesktopEntry);
        assert!(resolved.desktop_file.is_some());
        assert!(resolved.appstream_file.is_some());
    }

    #[test]
    fn test_appstream_precedence() {
        let temp = TempDir::new().unwrap();
        let appdir = appdir_with_both(&temp);
        let tree = extract(&appdir, &temp.path().join("work"));

        let m = resolver(MetadataPrecedence::Appstream)
            .resolve(&tree, &MetadataOverrides::default())
            .unwrap()
            .metadata;
        assert_eq!(m.name, "foo-pro");
        assert_eq!(m.display_name, "Foo Pro");
        assert_eq!(m.version, "2.0.0");
        assert_eq!(m.summary, "AppStream summary");
        assert_eq!(m.version_source, FieldSource::AppStream);
    }

    #[test]
    fn test_overrides_win() {
        let temp = TempDir::new().unwrap();
        let appdir = appdir_with_both(&temp);
        let tree = extract(&appdir, &temp.path().join("work"));

        let overrides = MetadataOverrides {
            name: Some("bar".into()),
            version: Some("5.0".into()),
            release: Some("3".into()),
            license: Some("GPL-2.0-only".into()),
        };
        let m = resolver(MetadataPrecedence::DesktopEntry)
            .resolve(&tree, &overrides)
            .unwrap()
            .metadata;
        assert_eq!(m.name, "bar");
        assert_eq!(m.version, "5.0");
        assert_eq!(m.release, "3");
        assert_eq!(m.license, "GPL-2.0-only");
        assert_eq!(m.name_source, FieldSource::Override);
    }

    #[test]
    fn test_configured_release_is_cleaned() {
        let temp = TempDir::new().unwrap();
        let appdir = appdir_with_both(&temp);
        let tree = extract(&appdir, &temp.path().join("work"));

        let config = ConversionConfig {
            default_release: "1-beta build".into(),
            ..Default::default()
        };
        let m = MetadataResolver::new(&config, ProfileKind::Fedora)
            .unwrap()
            .resolve(&tree, &MetadataOverrides::default())
            .unwrap()
            .metadata;
        assert_eq!(m.release, "1.beta.build");

        let config = ConversionConfig {
            default_release: String::new(),
            ..Default::default()
        };
        let err = MetadataResolver::new(&config, ProfileKind::Fedora).unwrap_err();
        assert!(matches!(err, crate::error::ConvertError::Config(_)));
    }

    #[test]
    fn test_unusable_override_is_rejected() {
        let temp = TempDir::new().unwrap();
        let appdir = appdir_with_both(&temp);
        let tree = extract(&appdir, &temp.path().join("work"));

        let overrides = MetadataOverrides {
            name: Some("///".into()),
            ..Default::default()
        };
        assert!(resolver(MetadataPrecedence::DesktopEntry)
            .resolve(&tree, &overrides)
            .is_err());
    }

    #[test]
    fn test_bare_bundle_falls_back_with_warnings() {
        let temp = TempDir::new().unwrap();
        let appdir = temp.path().join("My_Tool-x86_64.AppDir");
        fs::create_dir_all(&appdir).unwrap();
        fs::write(appdir.join("AppRun"), "#!/bin/sh\n").unwrap();
        let tree = extract(&appdir, &temp.path().join("work"));

        let resolved = resolver(MetadataPrecedence::DesktopEntry)
            .resolve(&tree, &MetadataOverrides::default())
            .unwrap();
        let m = &resolved.metadata;
        assert_eq!(m.name, "my_tool");
        assert_eq!(m.version, DEFAULT_VERSION);
        assert_eq!(m.release, "1");
        assert_eq!(m.license, "Proprietary");
        assert_eq!(m.name_source, FieldSource::Filename);
        assert_eq!(m.version_source, FieldSource::Default);

        let fields: Vec<_> = resolved
            .warnings
            .iter()
            .filter_map(|w| match w {
                Warning::Metadata { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        for field in ["desktop", "name", "version", "summary", "license"] {
            assert!(fields.contains(&field), "missing warning for {}", field);
        }
    }

    #[test]
    fn test_version_from_filename() {
        assert_eq!(version_from_filename("Foo-1.2.3-x86_64").as_deref(), Some("1.2.3"));
        assert_eq!(version_from_filename("Foo-v2.0.1-x86_64").as_deref(), Some("2.0.1"));
        assert_eq!(version_from_filename("Foo_1.4-amd64").as_deref(), Some("1.4"));
        assert_eq!(version_from_filename("Foo-7-x86_64").as_deref(), Some("7"));
        assert_eq!(version_from_filename("Foo-1.2.3").as_deref(), Some("1.2.3"));
        assert_eq!(version_from_filename("Foo-x86_64"), None);
        assert_eq!(version_from_filename("Foo"), None);
    }

    #[test]
    fn test_name_from_filename() {
        assert_eq!(name_from_filename("Foo-1.2.3-x86_64"), "Foo");
        assert_eq!(name_from_filename("Foo_Bar-x86_64"), "Foo_Bar");
        assert_eq!(name_from_filename("Foo"), "Foo");
        assert_eq!(name_from_filename("7zip-x86_64"), "7zip");
    }
}
