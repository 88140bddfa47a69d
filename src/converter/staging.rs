//! Install root staging
//!
//! Layout produced under the install root:
//! - `usr/lib/<name>/`: the AppDir payload
//! - `usr/bin/<name>`: launcher script
//! - `usr/share/applications/<name>.desktop`
//! - `usr/share/icons/hicolor/<size>/apps/<name>.<ext>` or `usr/share/pixmaps/`

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConvertError, Result};
use crate::fsutil;
use crate::metadata::desktop::{self, DesktopEntry};
use crate::models::{IconCandidate, IconFormat, Metadata};

/// Absolute install paths of the staged files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedLayout {
    /// `/usr/bin/<name>`
    pub launcher: String,
    /// `/usr/lib/<name>`
    pub payload_dir: String,
    /// `/usr/share/applications/<name>.desktop`
    pub desktop_file: String,
    /// Installed icon, if any
    pub icon: Option<String>,
    /// Entry point relative to the payload directory
    pub entry_point: PathBuf,
}

/// Locate the program the launcher should exec, relative to `root`.
///
/// Order: `AppRun`, the desktop `Exec` target, a file named after the application.
pub fn find_main_executable(root: &Path, metadata: &Metadata) -> Result<PathBuf> {
    let app_run = PathBuf::from("AppRun");
    if root.join(&app_run).exists() {
        return Ok(app_run);
    }

    let exec_program = metadata
        .exec
        .as_deref()
        .and_then(|exec| DesktopEntry::parse(&format!("[Desktop Entry]\nExec={}\n", exec)).exec_program());

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(program) = &exec_program {
        let program = program.trim_start_matches('/');
        if program.contains('/') {
            candidates.push(PathBuf::from(program));
        } else {
            candidates.push(Path::new("usr/bin").join(program));
            candidates.push(PathBuf::from(program));
        }
    }
    for name in [&metadata.name, &metadata.display_name] {
        candidates.push(Path::new("usr/bin").join(name));
        candidates.push(PathBuf::from(name));
    }

    candidates
        .into_iter()
        .filter(|c| is_contained(c))
        .find(|c| root.join(c).is_file())
        .ok_or_else(|| {
            ConvertError::spec(format!(
                "No main executable found in {} (no AppRun, Exec target or '{}')",
                root.display(),
                metadata.name
            ))
        })
}

/// Relative path without `..` or root components
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Copy payload, write launcher and desktop file, place the icon
pub fn stage(
    extracted_root: &Path,
    install_root: &Path,
    metadata: &Metadata,
    desktop_source: Option<&Path>,
    icon: Option<&IconCandidate>,
) -> Result<StagedLayout> {
    let name = &metadata.name;
    let entry_point = find_main_executable(extracted_root, metadata)?;
    debug!("Main executable: {}", entry_point.display());

    // Payload
    let payload_rel = Path::new("usr/lib").join(name);
    let payload = install_root.join(&payload_rel);
    if payload.exists() {
        fs::remove_dir_all(&payload)?;
    }
    let copied = fsutil::copy_tree(extracted_root, &payload, |rel| {
        rel.parent() == Some(Path::new(""))
            && (rel == Path::new(".DirIcon")
                || rel.extension().is_some_and(|ext| ext == "desktop"))
    })?;
    info!("Staged {} payload entries under /{}", copied, payload_rel.display());

    let entry = payload.join(&entry_point);
    if entry.is_file() && !fsutil::is_executable(&entry) {
        fsutil::set_mode(&entry, 0o755)?;
    }

    // Launcher
    let launcher_rel = Path::new("usr/bin").join(name);
    let launcher = install_root.join(&launcher_rel);
    create_parent(&launcher)?;
    fs::write(&launcher, launcher_script(&payload_rel, &entry_point))?;
    fsutil::set_mode(&launcher, 0o755)?;

    // Icon
    let icon_rel = match icon {
        Some(candidate) => {
            let rel = icon_install_path(candidate, name);
            let dest = install_root.join(&rel);
            create_parent(&dest)?;
            fs::copy(&candidate.path, &dest)?;
            fsutil::set_mode(&dest, 0o644)?;
            debug!("Installed icon {}", rel.display());
            Some(rel)
        }
        None => None,
    };
    let icon_name = icon_rel.as_ref().map(|_| name.as_str());

    // Desktop file
    let desktop_rel = Path::new("usr/share/applications").join(format!("{}.desktop", name));
    let desktop_dest = install_root.join(&desktop_rel);
    create_parent(&desktop_dest)?;
    let content = match desktop_source {
        Some(source) => {
            let bytes = fs::read(source)?;
            desktop::rewrite(&String::from_utf8_lossy(&bytes), name, icon_name)
        }
        None => desktop::generate(metadata, icon_name),
    };
    fs::write(&desktop_dest, content)?;
    fsutil::set_mode(&desktop_dest, 0o644)?;

    Ok(StagedLayout {
        launcher: absolute(&launcher_rel),
        payload_dir: absolute(&payload_rel),
        desktop_file: absolute(&desktop_rel),
        icon: icon_rel.as_deref().map(absolute),
        entry_point,
    })
}

/// Install path of an icon, relative to the install root
pub fn icon_install_path(icon: &IconCandidate, name: &str) -> PathBuf {
    match icon.format {
        IconFormat::Svg => {
            let ext = if icon.is_compressed() { "svgz" } else { "svg" };
            PathBuf::from(format!(
                "usr/share/icons/hicolor/scalable/apps/{}.{}",
                name, ext
            ))
        }
        IconFormat::Png => PathBuf::from(format!(
            "usr/share/icons/hicolor/{}/apps/{}.png",
            icon.hicolor_dir(),
            name
        )),
        IconFormat::Xpm | IconFormat::Other => match icon.format.extension() {
            Some(ext) => PathBuf::from(format!("usr/share/pixmaps/{}.{}", name, ext)),
            None => PathBuf::from("usr/share/pixmaps").join(name),
        },
    }
}

fn launcher_script(payload_rel: &Path, entry_point: &Path) -> String {
    format!(
        "#!/bin/sh\n\
         APPDIR=\"/{}\"\n\
         export APPDIR\n\
         exec \"$APPDIR/{}\" \"$@\"\n",
        payload_rel.display(),
        entry_point.display()
    )
}

fn absolute(rel: &Path) -> String {
    format!("/{}", rel.display())
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
