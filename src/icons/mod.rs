//! Icon discovery and ranking

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info};

use crate::models::{IconCandidate, IconFormat, IconMatch, Metadata};

lazy_static::lazy_static! {
    static ref SIZE_DIR_RE: Regex = Regex::new(r"^(\d{1,5})x(\d{1,5})(?:@\d+)?$").unwrap();
}

const DIR_ICON: &str = ".DirIcon";
const ICON_DIRS: [&str; 2] = ["usr/share/icons", "usr/share/pixmaps"];

/// Ranked icon candidates of one tree
#[derive(Debug, Clone, Default)]
pub struct IconSelection {
    candidates: Vec<IconCandidate>,
}

impl IconSelection {
    /// Highest ranked candidate
    pub fn selected(&self) -> Option<&IconCandidate> {
        self.candidates.first()
    }

    /// All candidates, best first
    pub fn candidates(&self) -> &[IconCandidate] {
        &self.candidates
    }

    /// Consume into the ranked list
    pub fn into_candidates(self) -> Vec<IconCandidate> {
        self.candidates
    }
}

/// Finds icon files in an extracted tree and ranks them
#[derive(Debug, Clone, Default)]
pub struct IconResolver;

impl IconResolver {
    /// Create a resolver
    pub fn new() -> Self {
        Self
    }

    /// Collect and rank every icon candidate under `root`
    pub fn resolve(&self, root: &Path, metadata: &Metadata) -> IconSelection {
        let declared = metadata.icon_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let declared_stem = declared.map(declared_stem);
        let app_names = [metadata.name.as_str(), metadata.display_name.as_str()];

        let mut candidates: Vec<IconCandidate> = Vec::new();
        for path in candidate_paths(root) {
            let is_dir_icon = path.file_name().is_some_and(|n| n == DIR_ICON);
            let format = if is_dir_icon {
                sniff_file(&path)
            } else {
                match IconFormat::from_path(&path) {
                    Some(format) => format,
                    None => continue,
                }
            };
            // Unknown bytes are never installed under an icon extension
            if format == IconFormat::Other {
                debug!("Skipping {}: not a PNG, SVG or XPM image", path.display());
                continue;
            }

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let rel_path = path.strip_prefix(root).unwrap_or(&path);

            let matched = if declared_stem.as_deref() == Some(stem.as_str())
                && format == IconFormat::Svg
            {
                IconMatch::DeclaredVector
            } else if declared_stem.as_deref() == Some(stem.as_str()) && format == IconFormat::Png {
                IconMatch::DeclaredRaster
            } else if declared.is_some_and(|d| references(d, rel_path)) {
                IconMatch::DesktopReference
            } else if is_dir_icon || app_names.iter().any(|n| n.eq_ignore_ascii_case(&stem)) {
                IconMatch::ApplicationName
            } else {
                IconMatch::CommonDirectory
            };

            let size = measure(&path, format).unwrap_or_else(|| declared_size(rel_path));
            candidates.push(IconCandidate::new(path, format, size, matched));
        }

        candidates.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| a.path.cmp(&b.path)));

        match candidates.first() {
            Some(best) => info!(
                "Selected icon {} ({}, {:?}, size {})",
                best.path.display(),
                best.format,
                best.matched,
                best.size
            ),
            None => info!("No icon found"),
        }
        debug!("{} icon candidates", candidates.len());

        IconSelection { candidates }
    }
}

/// Files directly in the AppDir root plus everything under the icon directories
fn candidate_paths(root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(entries) = fs::read_dir(root) {
        let mut top: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        top.sort();
        paths.extend(top);
    }

    for dir in ICON_DIRS {
        let dir = root.join(dir);
        if !dir.is_dir() {
            continue;
        }
        paths.extend(
            walkdir::WalkDir::new(&dir)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.into_path()),
        );
    }

    paths
}

/// `foo` for `foo`, `foo.png` and `usr/share/icons/foo.svg`
fn declared_stem(declared: &str) -> String {
    let path = Path::new(declared);
    if IconFormat::from_path(path).is_some() {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| declared.to_string())
    } else {
        path.file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| declared.to_string())
    }
}

/// Whether the desktop `Icon=` value points at this file by path or file name
fn references(declared: &str, rel_path: &Path) -> bool {
    let declared_path = Path::new(declared.trim_start_matches('/'));
    if declared.contains('/') {
        return rel_path.ends_with(declared_path);
    }
    IconFormat::from_path(declared_path).is_some()
        && rel_path.file_name() == declared_path.file_name()
}

fn sniff_file(path: &Path) -> IconFormat {
    let mut head = [0u8; 512];
    let read = fs::File::open(path)
        .and_then(|mut f| f.read(&mut head))
        .unwrap_or(0);
    IconFormat::sniff(&head[..read])
}

/// Pixel width read from a PNG IHDR chunk
fn measure(path: &Path, format: IconFormat) -> Option<u32> {
    if format != IconFormat::Png {
        return None;
    }
    let mut head = [0u8; 24];
    fs::File::open(path).ok()?.read_exact(&mut head).ok()?;
    if IconFormat::sniff(&head) != IconFormat::Png || &head[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([head[16], head[17], head[18], head[19]]);
    let height = u32::from_be_bytes([head[20], head[21], head[22], head[23]]);
    Some(width.max(height))
}

/// Size from an `NxN` path component, else 0
fn declared_size(rel_path: &Path) -> u32 {
    rel_path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter_map(|c| SIZE_DIR_RE.captures(c))
        .filter_map(|caps| caps[1].parse().ok())
        .last()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn png(size: u32) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&size.to_be_bytes());
        bytes.extend_from_slice(&size.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    const SVG: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\"/>";

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn metadata(icon: Option<&str>) -> Metadata {
        let mut metadata = Metadata::new("foo", "1.0").unwrap();
        metadata.icon_name = icon.map(str::to_string);
        metadata
    }

    #[test]
    fn test_svg_beats_large_png_named_after_app() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "foo.png", &png(256));
        write(temp.path(), "foo.svg", SVG.as_bytes());

        let selection = IconResolver::new().resolve(temp.path(), &metadata(None));
        let selected = selection.selected().unwrap();
        assert_eq!(selected.format, IconFormat::Svg);
        assert_eq!(selected.matched, IconMatch::ApplicationName);
        assert_eq!(selection.candidates().len(), 2);
    }

    #[test]
    fn test_unrecognized_dir_icon_falls_through() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".DirIcon", b"\xff\xd8\xff\xe0\x00\x10JFIF");
        write(temp.path(), "usr/share/pixmaps/other.png", &png(32));

        let selection = IconResolver::new().resolve(temp.path(), &metadata(None));
        let selected = selection.selected().unwrap();
        assert_eq!(selected.format, IconFormat::Png);
        assert!(selected.path.ends_with("usr/share/pixmaps/other.png"));
        assert!(selection.candidates().iter().all(|c| c.format != IconFormat::Other));
    }

    #[test]
    fn test_only_unrecognized_dir_icon_means_no_icon() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".DirIcon", b"\xff\xd8\xff\xe0\x00\x10JFIF");

        let selection = IconResolver::new().resolve(temp.path(), &metadata(None));
        assert!(selection.selected().is_none());
    }

    #[test]
    fn test_declared_name_tiers() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "usr/share/icons/hicolor/48x48/apps/foo-icon.png", &png(48));
        write(temp.path(), "usr/share/icons/hicolor/256x256/apps/foo-icon.png", &png(256));
        write(temp.path(), "foo.svg", SVG.as_bytes());

        let selection = IconResolver::new().resolve(temp.path(), &metadata(Some("foo-icon")));
        let selected = selection.selected().unwrap();
        assert_eq!(selected.matched, IconMatch::DeclaredRaster);
        assert_eq!(selected.size, 256);
        assert!(selected.path.ends_with("256x256/apps/foo-icon.png"));

        write(temp.path(), "usr/share/icons/hicolor/scalable/apps/foo-icon.svg", SVG.as_bytes());
        let selection = IconResolver::new().resolve(temp.path(), &metadata(Some("foo-icon")));
        assert_eq!(selection.selected().unwrap().matched, IconMatch::DeclaredVector);
    }

    #[test]
    fn test_desktop_reference_by_relative_path() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "usr/share/pixmaps/logo.xpm", b"/* XPM */\n");
        write(temp.path(), "usr/share/pixmaps/other.png", &png(64));

        let selection =
            IconResolver::new().resolve(temp.path(), &metadata(Some("usr/share/pixmaps/logo.xpm")));
        let selected = selection.selected().unwrap();
        assert_eq!(selected.matched, IconMatch::DesktopReference);
        assert_eq!(selected.format, IconFormat::Xpm);
    }

    #[test]
    fn test_dir_icon_is_sniffed() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), ".DirIcon", &png(128));
        write(temp.path(), "usr/share/icons/misc.png", &png(512));

        let selection = IconResolver::new().resolve(temp.path(), &metadata(None));
        let selected = selection.selected().unwrap();
        assert!(selected.path.ends_with(".DirIcon"));
        assert_eq!(selected.format, IconFormat::Png);
        assert_eq!(selected.size, 128);
    }

    #[test]
    fn test_size_from_path_when_unmeasurable() {
        assert_eq!(
            declared_size(Path::new("usr/share/icons/hicolor/64x64/apps/foo.png")),
            64
        );
        assert_eq!(declared_size(Path::new("usr/share/pixmaps/foo.png")), 0);
    }

    #[test]
    fn test_no_icons() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "AppRun", b"#!/bin/sh\n");
        let selection = IconResolver::new().resolve(temp.path(), &metadata(Some("foo")));
        assert!(selection.selected().is_none());
    }
}
