//! Per-run state

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::deps::DependencyReport;
use crate::error::{ConvertError, Result};
use crate::extractor::{ExtractedTree, InputSource};
use crate::icons::IconSelection;
use crate::metadata::ResolvedMetadata;
use crate::models::Warning;
use crate::profiles::{DistroProfile, ProfileKind};

const WORK_DIR_PREFIX: &str = "appimage2rpm_";
const INSTALL_DIR: &str = "install";

/// Temporary working directory, removed on drop unless retained
#[derive(Debug)]
pub struct WorkDir {
    dir: Option<TempDir>,
    path: PathBuf,
    retain: bool,
}

impl WorkDir {
    /// Create a fresh directory under `parent`, or the system temp dir
    pub fn create(parent: Option<&Path>, retain: bool) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORK_DIR_PREFIX);
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().to_path_buf();
        debug!("Working directory {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            retain,
        })
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if self.retain {
                let kept = dir.keep();
                info!("Keeping working directory {}", kept.display());
            } else {
                debug!("Removing working directory {}", self.path.display());
            }
        }
    }
}

/// Everything one pipeline run accumulates. Dropping it removes the work dir.
pub struct BuildContext {
    work: WorkDir,
    input: InputSource,
    output_dir: PathBuf,
    profile_kind: ProfileKind,
    profile: Box<dyn DistroProfile>,
    tree: Option<ExtractedTree>,
    metadata: Option<ResolvedMetadata>,
    icons: IconSelection,
    dependencies: DependencyReport,
    warnings: Vec<Warning>,
}

impl BuildContext {
    /// New context owning a fresh working directory
    pub fn new(
        input: InputSource,
        output_dir: PathBuf,
        profile_kind: ProfileKind,
        work: WorkDir,
    ) -> Self {
        Self {
            work,
            input,
            output_dir,
            profile_kind,
            profile: crate::profiles::profile_for(profile_kind),
            tree: None,
            metadata: None,
            icons: IconSelection::default(),
            dependencies: DependencyReport::default(),
            warnings: Vec::new(),
        }
    }

    /// Working directory
    pub fn work_path(&self) -> &Path {
        self.work.path()
    }

    /// Staged install root inside the working directory
    pub fn install_root(&self) -> PathBuf {
        self.work.path().join(INSTALL_DIR)
    }

    /// Input being converted
    pub fn input(&self) -> &InputSource {
        &self.input
    }

    /// Where the package is copied to
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Target distribution
    pub fn profile_kind(&self) -> ProfileKind {
        self.profile_kind
    }

    /// Target distribution strategy
    pub fn profile(&self) -> &dyn DistroProfile {
        self.profile.as_ref()
    }

    /// Extracted tree; set after `Extracting`
    pub fn tree(&self) -> Result<&ExtractedTree> {
        self.tree
            .as_ref()
            .ok_or_else(|| ConvertError::Other("Bundle has not been extracted".into()))
    }

    /// Record the extracted tree
    pub fn set_tree(&mut self, tree: ExtractedTree) {
        self.tree = Some(tree);
    }

    /// Resolved metadata; set after `ResolvingMetadata`
    pub fn metadata(&self) -> Result<&ResolvedMetadata> {
        self.metadata
            .as_ref()
            .ok_or_else(|| ConvertError::Other("Metadata has not been resolved".into()))
    }

    /// Record resolved metadata and its warnings
    pub fn set_metadata(&mut self, mut resolved: ResolvedMetadata) {
        self.warnings.append(&mut resolved.warnings);
        self.metadata = Some(resolved);
    }

    /// Ranked icons
    pub fn icons(&self) -> &IconSelection {
        &self.icons
    }

    /// Record ranked icons; an empty selection is a warning
    pub fn set_icons(&mut self, icons: IconSelection) {
        if icons.selected().is_none() {
            self.warnings
                .push(Warning::Icon("no icon found in the bundle".into()));
        }
        self.icons = icons;
    }

    /// Dependency report
    pub fn dependencies(&self) -> &DependencyReport {
        &self.dependencies
    }

    /// Record the dependency report and its warnings
    pub fn set_dependencies(&mut self, mut report: DependencyReport) {
        self.warnings.append(&mut report.warnings);
        self.dependencies = report;
    }

    /// Warnings accumulated so far
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Take the accumulated warnings
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_dir_removed_on_drop() {
        let parent = TempDir::new().unwrap();
        let work = WorkDir::create(Some(parent.path()), false).unwrap();
        let path = work.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORK_DIR_PREFIX));
        drop(work);
        assert!(!path.exists());
    }

    #[test]
    fn test_work_dir_retained() {
        let parent = TempDir::new().unwrap();
        let work = WorkDir::create(Some(parent.path()), true).unwrap();
        let path = work.path().to_path_buf();
        drop(work);
        assert!(path.is_dir());
    }

    #[test]
    fn test_missing_icon_becomes_warning() {
        let parent = TempDir::new().unwrap();
        let input = InputSource::from_path(parent.path()).unwrap();
        let work = WorkDir::create(Some(parent.path()), false).unwrap();
        let mut ctx = BuildContext::new(input, parent.path().into(), ProfileKind::Fedora, work);
        ctx.set_icons(IconSelection::default());
        assert!(matches!(ctx.warnings(), [Warning::Icon(_)]));
        assert!(ctx.tree().is_err());
    }
}
