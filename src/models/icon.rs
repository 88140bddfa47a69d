//! Icon candidates and their ranking

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Icon file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IconFormat {
    /// Scalable vector graphics (plain or gzipped)
    Svg,
    /// Portable network graphics
    Png,
    /// X pixmap
    Xpm,
    /// Anything else
    Other,
}

impl IconFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_lowercase().as_str() {
            "svg" | "svgz" => Some(Self::Svg),
            "png" => Some(Self::Png),
            "xpm" => Some(Self::Xpm),
            _ => None,
        }
    }

    /// Detect the format from the first bytes of the file
    pub fn sniff(bytes: &[u8]) -> Self {
        const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

        if bytes.starts_with(PNG_SIGNATURE) {
            return Self::Png;
        }
        if bytes.starts_with(&[0x1f, 0x8b]) {
            // gzip, as used by .svgz
            return Self::Svg;
        }
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_lowercase();
        if head.contains("<svg") || (head.starts_with("<?xml") && head.contains("svg")) {
            Self::Svg
        } else if head.starts_with("/* xpm */") {
            Self::Xpm
        } else {
            Self::Other
        }
    }

    /// File extension used when installing, `None` for unknown formats
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Svg => Some("svg"),
            Self::Png => Some("png"),
            Self::Xpm => Some("xpm"),
            Self::Other => None,
        }
    }

    /// Preference within a tier: vector > raster > other
    pub fn weight(&self) -> u64 {
        match self {
            Self::Svg => 3,
            Self::Png => 2,
            Self::Xpm => 1,
            Self::Other => 0,
        }
    }
}

impl fmt::Display for IconFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Svg => write!(f, "svg"),
            Self::Png => write!(f, "png"),
            Self::Xpm => write!(f, "xpm"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Why a file was considered as an icon; higher tiers win
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IconMatch {
    /// Image file in a common icon directory
    CommonDirectory = 1,
    /// File stem equals the application name
    ApplicationName = 2,
    /// Path referenced by the desktop entry
    DesktopReference = 3,
    /// PNG named after the declared icon
    DeclaredRaster = 4,
    /// SVG named after the declared icon
    DeclaredVector = 5,
}

/// An icon file found in the extracted tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconCandidate {
    /// Path of the icon inside the extracted tree
    pub path: PathBuf,
    /// File format
    pub format: IconFormat,
    /// Pixel size (measured, else declared by the path, else 0)
    pub size: u32,
    /// Match tier
    pub matched: IconMatch,
    /// Rank computed from tier, format and size
    pub rank: u64,
}

impl IconCandidate {
    /// Create a candidate and compute its rank
    pub fn new(path: PathBuf, format: IconFormat, size: u32, matched: IconMatch) -> Self {
        let rank = Self::compute_rank(matched, format, size);
        Self {
            path,
            format,
            size,
            matched,
            rank,
        }
    }

    /// Rank: tier first, then format, then size
    pub fn compute_rank(matched: IconMatch, format: IconFormat, size: u32) -> u64 {
        (matched as u64) * 1_000_000 + format.weight() * 100_000 + u64::from(size.min(99_999))
    }

    /// Whether the file is gzip compressed (`.svgz`, or a sniffed `.DirIcon`)
    pub fn is_compressed(&self) -> bool {
        if self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("svgz"))
        {
            return true;
        }
        let mut magic = [0u8; 2];
        std::fs::File::open(&self.path)
            .and_then(|mut f| std::io::Read::read_exact(&mut f, &mut magic))
            .is_ok_and(|_| magic == [0x1f, 0x8b])
    }

    /// hicolor size directory (`scalable` or `NxN`)
    pub fn hicolor_dir(&self) -> String {
        match self.format {
            IconFormat::Svg => "scalable".to_string(),
            _ => {
                let size = if self.size == 0 { 48 } else { self.size };
                format!("{}x{}", size, size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_beats_large_raster_in_same_tier() {
        let svg = IconCandidate::new("a.svg".into(), IconFormat::Svg, 0, IconMatch::ApplicationName);
        let png = IconCandidate::new("a.png".into(), IconFormat::Png, 256, IconMatch::ApplicationName);
        assert!(svg.rank > png.rank);
    }

    #[test]
    fn test_tier_beats_format() {
        let declared_png =
            IconCandidate::new("a.png".into(), IconFormat::Png, 16, IconMatch::DeclaredRaster);
        let other_svg =
            IconCandidate::new("b.svg".into(), IconFormat::Svg, 0, IconMatch::CommonDirectory);
        assert!(declared_png.rank > other_svg.rank);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(IconFormat::sniff(b"\x89PNG\r\n\x1a\n...."), IconFormat::Png);
        assert_eq!(IconFormat::sniff(b"<?xml version=\"1.0\"?><svg>"), IconFormat::Svg);
        assert_eq!(IconFormat::sniff(b"GIF89a"), IconFormat::Other);
    }

    #[test]
    fn test_hicolor_dir() {
        let png = IconCandidate::new("a.png".into(), IconFormat::Png, 0, IconMatch::ApplicationName);
        assert_eq!(png.hicolor_dir(), "48x48");
        let svg = IconCandidate::new("a.svg".into(), IconFormat::Svg, 0, IconMatch::ApplicationName);
        assert_eq!(svg.hicolor_dir(), "scalable");
    }
}
