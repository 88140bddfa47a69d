//! rpmbuild driver
//!
//! Packs the install root into the Source0 tarball, lays out an rpmbuild
//! top directory, runs `rpmbuild -bb` and collects the binary package.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tar::Builder as TarBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::error::{ConvertError, Result};
use crate::pipeline::Stage;
use crate::process::{ToolCommand, ToolRun};
use crate::profiles::DistroProfile;

use super::spec::SpecModel;

const TOPDIR_LAYOUT: [&str; 6] = ["BUILD", "BUILDROOT", "RPMS", "SOURCES", "SPECS", "SRPMS"];

/// What a successful build produced
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Binary package copied to the output directory
    pub artifact: PathBuf,
    /// Hex sha256 of the artifact
    pub sha256: String,
    /// Spec file copied to the output directory, when requested
    pub spec_path: Option<PathBuf>,
    /// rpmbuild stdout
    pub stdout: String,
    /// rpmbuild stderr
    pub stderr: String,
}

/// Runs rpmbuild for a staged install root
pub struct PackageBuilder {
    rpmbuild: String,
    timeout: Option<std::time::Duration>,
    write_spec: bool,
    cancel: CancellationToken,
}

impl PackageBuilder {
    /// Create a builder from the build settings
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            rpmbuild: config.rpmbuild.clone(),
            timeout: config.timeout(),
            write_spec: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Terminate rpmbuild when this token fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Keep a copy of the spec next to the package
    pub fn write_spec(mut self, write: bool) -> Self {
        self.write_spec = write;
        self
    }

    /// Build the package described by `model` from `install_root`
    pub fn build(
        &self,
        model: &SpecModel,
        install_root: &Path,
        work_dir: &Path,
        output_dir: &Path,
        profile: &dyn DistroProfile,
    ) -> Result<BuildOutcome> {
        if !install_root.is_dir() {
            return Err(ConvertError::file_not_found(install_root));
        }
        let rpmbuild = which::which(&self.rpmbuild).map_err(|_| {
            ConvertError::build(
                format!("{} not found; install the rpm-build package", self.rpmbuild),
                String::new(),
            )
        })?;

        let topdir = work_dir.join("rpmbuild");
        for dir in TOPDIR_LAYOUT {
            fs::create_dir_all(topdir.join(dir))?;
        }

        let source = topdir.join("SOURCES").join(&model.source0);
        let entries = create_source_archive(install_root, &source)?;
        debug!("Wrote {} with {} entries", source.display(), entries);

        let spec_file = topdir.join("SPECS").join(format!("{}.spec", model.name));
        fs::write(&spec_file, model.render())?;

        let mut command = ToolCommand::new(&rpmbuild)
            .arg("-bb")
            .arg("--define")
            .arg(format!("_topdir {}", topdir.display()))
            .timeout(self.timeout)
            .current_dir(work_dir);
        for (name, value) in profile.rpm_macros() {
            command = command.arg("--define").arg(format!("{} {}", name, value));
        }
        command = command.arg(&spec_file);

        info!("Building {} with {}", model.nvr(), rpmbuild.display());
        let run = command.run(&self.cancel).map_err(|e| {
            ConvertError::build(format!("Failed to run {}: {}", command.display(), e), String::new())
        })?;

        let output = match run {
            ToolRun::Finished(output) if output.success() => output,
            ToolRun::Finished(output) => {
                let status = output
                    .code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                return Err(ConvertError::build(
                    format!("rpmbuild exited with status {}", status),
                    output.combined(),
                ));
            }
            ToolRun::Cancelled(_) => {
                return Err(ConvertError::Cancelled {
                    stage: Stage::Building,
                })
            }
            ToolRun::TimedOut(output) => {
                return Err(ConvertError::build(
                    format!(
                        "rpmbuild timed out after {}s",
                        self.timeout.map(|t| t.as_secs()).unwrap_or_default()
                    ),
                    output.combined(),
                ))
            }
        };

        let built = find_binary_rpm(&topdir.join("RPMS"))?.ok_or_else(|| {
            ConvertError::build("rpmbuild produced no binary package", output.combined())
        })?;

        fs::create_dir_all(output_dir)?;
        let file_name = built
            .file_name()
            .ok_or_else(|| ConvertError::build("Invalid artifact path", String::new()))?;
        let artifact = output_dir.join(file_name);
        fs::copy(&built, &artifact)?;
        let sha256 = sha256_file(&artifact)?;
        info!("Created {}", artifact.display());

        let spec_path = if self.write_spec {
            let dest = output_dir.join(format!("{}.spec", model.name));
            fs::copy(&spec_file, &dest)?;
            Some(dest)
        } else {
            None
        };

        Ok(BuildOutcome {
            artifact,
            sha256,
            spec_path,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// First non-source `.rpm` below `rpms`, in path order
fn find_binary_rpm(rpms: &Path) -> Result<Option<PathBuf>> {
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(rpms).sort_by_file_name() {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_file() && name.ends_with(".rpm") && !name.ends_with(".src.rpm") {
            found.push(entry.into_path());
        }
    }
    Ok(found.into_iter().next())
}

/// Hex sha256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Gzipped tarball of `root` with every entry owned by root
pub fn create_source_archive(root: &Path, output: &Path) -> Result<u64> {
    let file = File::create(output)?;
    let encoder = flate2::write::GzEncoder::new(BufWriter::new(file), flate2::Compression::default());
    let mut tar = TarBuilder::new(encoder);

    let mut count = 0;
    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let Ok(rel_path) = path.strip_prefix(root) else {
            continue;
        };

        if entry.file_type().is_symlink() {
            let target = fs::read_link(path)?;
            append_symlink_with_root_owner(&mut tar, rel_path, &target)?;
        } else if entry.file_type().is_dir() {
            append_dir_with_root_owner(&mut tar, path, rel_path)?;
        } else if entry.file_type().is_file() {
            append_file_with_root_owner(&mut tar, path, rel_path)?;
        } else {
            continue;
        }
        count += 1;
    }

    tar.into_inner()?.finish()?.flush()?;
    Ok(count)
}

fn root_header(metadata: &fs::Metadata, entry_type: tar::EntryType, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_size(size);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(
        metadata
            .modified()
            .ok()
            .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
            .unwrap_or_default()
            .as_secs(),
    );
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        header.set_mode(metadata.permissions().mode() & 0o7777);
    }
    #[cfg(not(unix))]
    header.set_mode(if metadata.is_dir() { 0o755 } else { 0o644 });
    header.set_entry_type(entry_type);
    header
}

fn append_file_with_root_owner<W: Write>(
    tar: &mut TarBuilder<W>,
    path: &Path,
    name: &Path,
) -> Result<()> {
    let metadata = path.metadata()?;
    let mut header = root_header(&metadata, tar::EntryType::Regular, metadata.len());
    tar.append_data(&mut header, name, File::open(path)?)?;
    Ok(())
}

fn append_dir_with_root_owner<W: Write>(
    tar: &mut TarBuilder<W>,
    path: &Path,
    name: &Path,
) -> Result<()> {
    let metadata = path.metadata()?;
    let mut header = root_header(&metadata, tar::EntryType::Directory, 0);
    let name = format!("{}/", name.to_string_lossy().trim_end_matches('/'));
    tar.append_data(&mut header, Path::new(&name), std::io::empty())?;
    Ok(())
}

fn append_symlink_with_root_owner<W: Write>(
    tar: &mut TarBuilder<W>,
    name: &Path,
    target: &Path,
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(0);
    header.set_mode(0o777);
    header.set_entry_type(tar::EntryType::Symlink);
    tar.append_link(&mut header, name, target)?;
    Ok(())
}
