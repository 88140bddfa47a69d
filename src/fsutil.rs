//! Filesystem helpers shared by extraction and staging

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Copy a directory tree, keeping symlinks as symlinks and file modes intact.
/// `skip` receives paths relative to `source`; a skipped directory is not descended.
pub fn copy_tree<F>(source: &Path, dest: &Path, skip: F) -> Result<u64>
where
    F: Fn(&Path) -> bool,
{
    fs::create_dir_all(dest)?;
    let mut copied = 0;

    let walker = walkdir::WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.path()
                .strip_prefix(source)
                .map(|rel| !skip(rel))
                .unwrap_or(true)
        });

    for entry in walker {
        let entry = entry?;
        let Ok(rel_path) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(rel_path);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_symlink() {
            #[cfg(unix)]
            {
                let link = fs::read_link(entry.path())?;
                if target.symlink_metadata().is_ok() {
                    fs::remove_file(&target)?;
                }
                std::os::unix::fs::symlink(link, &target)?;
                copied += 1;
            }
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Set the unix permission bits of a file
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

/// Whether a file has any execute bit set
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
