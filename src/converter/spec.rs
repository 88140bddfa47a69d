//! RPM spec model and rendering

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};
use crate::models::{Architecture, Dependency, IconCandidate, Metadata};
use crate::profiles::DistroProfile;

use super::staging::{self, StagedLayout};

/// One `%files` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEntry {
    /// Regular file
    File(String),
    /// Executable installed with an explicit mode
    Executable(String),
    /// Directory, owned recursively
    Directory(String),
}

impl FileEntry {
    /// Absolute install path
    pub fn path(&self) -> &str {
        match self {
            Self::File(path) | Self::Executable(path) | Self::Directory(path) => path,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::File(path) => path.clone(),
            Self::Executable(path) => format!("%attr(0755,root,root) {}", path),
            Self::Directory(path) => format!("{}/", path.trim_end_matches('/')),
        }
    }
}

/// Immutable description of the package to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecModel {
    /// Package name
    pub name: String,
    /// Version
    pub version: String,
    /// Release, without the dist tag
    pub release: String,
    /// License
    pub license: String,
    /// One-line summary
    pub summary: String,
    /// Homepage
    pub url: Option<String>,
    /// Source archive file name
    pub source0: String,
    /// BuildArch
    pub build_arch: String,
    /// Requires, deduplicated, in soname order
    pub requires: Vec<String>,
    /// `%description` body
    pub description: String,
    /// `%files` entries
    pub files: Vec<FileEntry>,
    /// `%post` body
    pub post: String,
    /// `%postun` body
    pub postun: String,
    /// `%changelog` date, `Mon Jan 01 2024` format
    pub changelog_date: String,
}

impl SpecModel {
    /// Source archive name for a name and version
    pub fn source_archive_name(name: &str, version: &str) -> String {
        format!("{}-{}.tar.gz", name, version)
    }

    /// `name-version-release` without the dist tag
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }

    /// Render the spec text
    pub fn render(&self) -> String {
        let mut out = String::new();

        // writeln! on a String cannot fail
        let _ = writeln!(out, "Name:           {}", self.name);
        let _ = writeln!(out, "Version:        {}", self.version);
        let _ = writeln!(out, "Release:        {}%{{?dist}}", self.release);
        let _ = writeln!(out, "License:        {}", escape_line(&self.license));
        let _ = writeln!(out, "Summary:        {}", escape_line(&self.summary));
        if let Some(url) = &self.url {
            let _ = writeln!(out, "URL:            {}", escape_line(url));
        }
        let _ = writeln!(out, "Source0:        {}", self.source0);
        let _ = writeln!(out, "BuildArch:      {}", self.build_arch);
        let _ = writeln!(out, "AutoReqProv:    no");
        for requires in &self.requires {
            let _ = writeln!(out, "Requires:       {}", requires);
        }

        out.push_str("\n%description\n");
        out.push_str(&escape_text(&self.description));
        out.push('\n');

        out.push_str("\n%prep\n");
        out.push_str("\n%build\n");

        out.push_str("\n%install\n");
        out.push_str("mkdir -p %{buildroot}\n");
        out.push_str("tar -xzf %{SOURCE0} -C %{buildroot}\n");

        out.push_str("\n%files\n");
        for entry in &self.files {
            out.push_str(&entry.render());
            out.push('\n');
        }

        out.push_str("\n%post\n");
        out.push_str(&self.post);

        out.push_str("\n%postun\n");
        out.push_str(&self.postun);

        out.push_str("\n%changelog\n");
        let _ = writeln!(
            out,
            "* {} appimage2rpm <appimage2rpm@localhost> - {}-{}",
            self.changelog_date, self.version, self.release
        );
        out.push_str("- Converted from AppImage\n");

        out
    }
}

fn escape_line(text: &str) -> String {
    text.lines()
        .next()
        .unwrap_or_default()
        .trim()
        .replace('%', "%%")
}

fn escape_text(text: &str) -> String {
    text.trim().replace('%', "%%")
}

/// Builds a [`SpecModel`] and the install root it describes
pub struct SpecBuilder<'a> {
    metadata: &'a Metadata,
    profile: &'a dyn DistroProfile,
    icon: Option<&'a IconCandidate>,
    desktop_file: Option<&'a Path>,
    requires: Vec<String>,
    build_arch: Architecture,
    changelog_date: String,
}

impl<'a> SpecBuilder<'a> {
    /// Start a spec for the given metadata and profile
    pub fn new(metadata: &'a Metadata, profile: &'a dyn DistroProfile) -> Self {
        Self {
            metadata,
            profile,
            icon: None,
            desktop_file: None,
            requires: Vec::new(),
            build_arch: Architecture::default(),
            changelog_date: chrono::Local::now().format("%a %b %d %Y").to_string(),
        }
    }

    /// Selected icon
    pub fn icon(mut self, icon: Option<&'a IconCandidate>) -> Self {
        self.icon = icon;
        self
    }

    /// Desktop file shipped by the bundle
    pub fn desktop_file(mut self, path: Option<&'a Path>) -> Self {
        self.desktop_file = path;
        self
    }

    /// Requires from resolved dependencies; unresolved ones are left out
    pub fn dependencies(mut self, dependencies: &[Dependency]) -> Self {
        let mut seen = BTreeSet::new();
        self.requires = dependencies
            .iter()
            .filter_map(Dependency::to_requires)
            .filter(|r| seen.insert(r.clone()))
            .collect();
        self
    }

    /// BuildArch
    pub fn build_arch(mut self, arch: Architecture) -> Self {
        self.build_arch = arch;
        self
    }

    /// Changelog date, `Mon Jan 01 2024` format
    pub fn changelog_date(mut self, date: impl Into<String>) -> Self {
        self.changelog_date = date.into();
        self
    }

    /// Stage files under `install_root` and return the validated model
    pub fn stage(self, extracted_root: &Path, install_root: &Path) -> Result<SpecModel> {
        let layout = staging::stage(
            extracted_root,
            install_root,
            self.metadata,
            self.desktop_file,
            self.icon,
        )?;
        let model = self.model(&layout);
        verify_files(&model, install_root)?;
        Ok(model)
    }

    fn model(&self, layout: &StagedLayout) -> SpecModel {
        let metadata = self.metadata;
        let mut files = vec![
            FileEntry::Executable(layout.launcher.clone()),
            FileEntry::Directory(layout.payload_dir.clone()),
            FileEntry::File(layout.desktop_file.clone()),
        ];
        if let Some(icon) = &layout.icon {
            files.push(FileEntry::File(icon.clone()));
        }
        let has_icon = layout.icon.is_some();

        SpecModel {
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            release: metadata.release.clone(),
            license: metadata.license.clone(),
            summary: metadata.effective_summary(),
            url: metadata.url.clone(),
            source0: SpecModel::source_archive_name(&metadata.name, &metadata.version),
            build_arch: self.build_arch.to_rpm_name().to_string(),
            requires: self.requires.clone(),
            description: metadata.effective_description(),
            files,
            post: self.profile.post_scriptlet(has_icon),
            postun: self.profile.postun_scriptlet(has_icon),
            changelog_date: self.changelog_date.clone(),
        }
    }
}

/// Every `%files` path must exist under the install root
pub fn verify_files(model: &SpecModel, install_root: &Path) -> Result<()> {
    for entry in &model.files {
        let staged: PathBuf = install_root.join(entry.path().trim_start_matches('/'));
        let exists = staged.symlink_metadata().is_ok();
        let kind_ok = match entry {
            FileEntry::Directory(_) => staged.is_dir(),
            _ => exists,
        };
        if !kind_ok {
            return Err(ConvertError::spec(format!(
                "{} is listed in %files but was not staged",
                entry.path()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IconFormat, IconMatch, MappingSource, PackageRef};
    use crate::profiles::{profile_for, ProfileKind};
    use std::fs;
    use tempfile::TempDir;

    fn extracted(temp: &TempDir) -> PathBuf {
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("AppRun"), "#!/bin/sh\n").unwrap();
        root
    }

    fn section<'s>(spec: &'s str, name: &str) -> Vec<&'s str> {
        spec.split(&format!("\n{}\n", name))
            .nth(1)
            .unwrap_or_default()
            .split("\n\n")
            .next()
            .unwrap_or_default()
            .lines()
            .filter(|l| !l.is_empty())
            .collect()
    }

    #[test]
    fn test_minimal_spec_without_icon() {
        let temp = TempDir::new().unwrap();
        let root = extracted(&temp);
        let metadata = Metadata::new("foo", "1.0").unwrap();
        let profile = profile_for(ProfileKind::Fedora);

        let model = SpecBuilder::new(&metadata, profile.as_ref())
            .changelog_date("Mon Jan 01 2024")
            .stage(&root, &temp.path().join("install"))
            .unwrap();
        let spec = model.render();

        assert!(spec.contains("Name:           foo\n"));
        assert!(spec.contains("Version:        1.0\n"));
        assert!(spec.contains("Release:        1%{?dist}\n"));
        assert_eq!(
            section(&spec, "%files"),
            vec![
                "%attr(0755,root,root) /usr/bin/foo",
                "/usr/lib/foo/",
                "/usr/share/applications/foo.desktop",
            ]
        );
        assert!(!spec.contains("/usr/share/icons"));
        assert!(!spec.contains("gtk-update-icon-cache"));
    }

    #[test]
    fn test_section_order() {
        let temp = TempDir::new().unwrap();
        let root = extracted(&temp);
        let metadata = Metadata::new("foo", "1.0").unwrap();
        let profile = profile_for(ProfileKind::Fedora);
        let spec = SpecBuilder::new(&metadata, profile.as_ref())
            .stage(&root, &temp.path().join("install"))
            .unwrap()
            .render();

        let positions: Vec<usize> = [
            "Name:", "Version:", "Release:", "License:", "Summary:", "BuildArch:",
            "%description", "%files", "%post", "%postun",
        ]
        .iter()
        .map(|marker| spec.find(marker).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", spec);
    }

    #[test]
    fn test_requires_and_icon() {
        let temp = TempDir::new().unwrap();
        let root = extracted(&temp);
        let icon_path = root.join("foo.png");
        fs::write(&icon_path, "png").unwrap();
        let icon = IconCandidate::new(icon_path, IconFormat::Png, 256, IconMatch::ApplicationName);

        let mut deps = vec![
            Dependency::new("libc.so.6"),
            Dependency::new("libm.so.6"),
            Dependency::new("libmystery.so.1"),
        ];
        deps[0].resolve(PackageRef::new("glibc"), MappingSource::Builtin);
        deps[1].resolve(PackageRef::new("glibc"), MappingSource::Builtin);

        let mut metadata = Metadata::new("foo", "1.0").unwrap();
        metadata.summary = "100% foo".into();
        let profile = profile_for(ProfileKind::Rhel);
        let model = SpecBuilder::new(&metadata, profile.as_ref())
            .icon(Some(&icon))
            .dependencies(&deps)
            .build_arch(Architecture::Aarch64)
            .stage(&root, &temp.path().join("install"))
            .unwrap();

        assert_eq!(model.requires, vec!["glibc"]);
        let spec = model.render();
        assert_eq!(spec.matches("Requires:").count(), 1);
        assert!(!spec.contains("libmystery"));
        assert!(spec.contains("BuildArch:      aarch64\n"));
        assert!(spec.contains("Summary:        100%% foo\n"));
        assert!(spec.contains("/usr/share/icons/hicolor/256x256/apps/foo.png\n"));
        assert!(spec.contains("gtk-update-icon-cache"));
    }

    #[test]
    fn test_verify_rejects_unstaged_paths() {
        let temp = TempDir::new().unwrap();
        let model = SpecModel {
            name: "foo".into(),
            version: "1.0".into(),
            release: "1".into(),
            license: "MIT".into(),
            summary: "s".into(),
            url: None,
            source0: "foo-1.0.tar.gz".into(),
            build_arch: "x86_64".into(),
            requires: vec![],
            description: "d".into(),
            files: vec![FileEntry::File("/usr/bin/foo".into())],
            post: String::new(),
            postun: String::new(),
            changelog_date: "Mon Jan 01 2024".into(),
        };
        let err = verify_files(&model, temp.path()).unwrap_err();
        assert!(matches!(err, ConvertError::SpecGeneration(_)));
    }
}
