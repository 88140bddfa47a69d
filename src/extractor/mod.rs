//! AppImage payload extraction
//!
//! An AppImage is an ELF runtime with a filesystem image appended. Type 2
//! images carry `AI\x02` at offset 8 of the ELF header and a squashfs image
//! starting right after the runtime's section header table; type 1 images
//! carry `AI\x01` and an ISO 9660 image that only the runtime can unpack.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExtractMethod;
use crate::error::{ConvertError, Result};
use crate::fsutil;
use crate::pipeline::Stage;
use crate::process::{ToolCommand, ToolRun};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const EXTRACT_DIR: &str = "extract";
const SQUASHFS_ROOT: &str = "squashfs-root";

/// AppImage format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppImageType {
    /// ISO 9660 payload
    Type1,
    /// squashfs payload
    Type2,
}

/// What the pipeline was asked to convert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A single-file AppImage
    AppImage(PathBuf),
    /// An already unpacked AppDir
    Directory(PathBuf),
}

impl InputSource {
    /// Classify a path; it must exist
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|_| ConvertError::file_not_found(path))?;
        let path = path.canonicalize()?;

        if metadata.is_dir() {
            Ok(Self::Directory(path))
        } else {
            Ok(Self::AppImage(path))
        }
    }

    /// Path as given
    pub fn path(&self) -> &Path {
        match self {
            Self::AppImage(path) | Self::Directory(path) => path,
        }
    }

    /// File name without the `.AppImage` extension, used for name/version derivation
    pub fn stem(&self) -> String {
        let name = self
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let lower = name.to_lowercase();
        for ext in [".appimage", ".appdir"] {
            if lower.ends_with(ext) {
                return name[..name.len() - ext.len()].to_string();
            }
        }
        name
    }
}

/// Result of a successful extraction
#[derive(Debug, Clone)]
pub struct ExtractedTree {
    root: PathBuf,
    source: InputSource,
    kind: Option<AppImageType>,
}

impl ExtractedTree {
    /// AppDir root inside the working directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Input the tree was produced from
    pub fn source(&self) -> &InputSource {
        &self.source
    }

    /// AppImage type, `None` for directory input
    pub fn kind(&self) -> Option<AppImageType> {
        self.kind
    }
}

/// Check the ELF and AppImage magic numbers
pub fn detect_type(path: &Path) -> Result<AppImageType> {
    let mut header = [0u8; 11];
    let mut file = fs::File::open(path)?;
    let read = read_up_to(&mut file, &mut header)?;

    if read < header.len() || header[..4] != ELF_MAGIC {
        return Err(ConvertError::extract(format!(
            "{} is not an ELF file",
            path.display()
        )));
    }

    match &header[8..11] {
        [b'A', b'I', 0x01] => Ok(AppImageType::Type1),
        [b'A', b'I', 0x02] => Ok(AppImageType::Type2),
        _ => Err(ConvertError::extract(format!(
            "{} has no AppImage magic",
            path.display()
        ))),
    }
}

/// Offset of the squashfs image: the end of the runtime's section header table
pub fn payload_offset(path: &Path) -> Result<u64> {
    let mut header = [0u8; 64];
    let mut file = fs::File::open(path)?;
    let read = read_up_to(&mut file, &mut header)?;

    let header = goblin::elf::Elf::parse_header(&header[..read])
        .map_err(|e| ConvertError::extract(format!("Unreadable runtime header: {}", e)))?;

    Ok(header.e_shoff + u64::from(header.e_shnum) * u64::from(header.e_shentsize))
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Unpacks an input into a working directory
#[derive(Debug, Clone)]
pub struct Extractor {
    method: ExtractMethod,
    unsquashfs: Option<PathBuf>,
    cancel: CancellationToken,
}

impl Extractor {
    /// Create an extractor using the given method
    pub fn new(method: ExtractMethod) -> Self {
        Self {
            method,
            unsquashfs: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Use this unsquashfs binary instead of the one found in PATH
    pub fn with_unsquashfs(mut self, path: impl Into<PathBuf>) -> Self {
        self.unsquashfs = Some(path.into());
        self
    }

    /// Terminate the extraction tool when this token fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extract `input` below `work_dir`
    pub fn extract(&self, input: &InputSource, work_dir: &Path) -> Result<ExtractedTree> {
        let target = work_dir.join(EXTRACT_DIR);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::create_dir_all(&target)?;

        let kind = match input {
            InputSource::Directory(dir) => {
                info!("Copying AppDir {}", dir.display());
                let copied = fsutil::copy_tree(dir, &target.join(SQUASHFS_ROOT), |_| false)?;
                debug!("Copied {} entries", copied);
                None
            }
            InputSource::AppImage(path) => {
                let kind = detect_type(path)?;
                info!("Extracting {:?} AppImage {}", kind, path.display());
                self.extract_appimage(path, kind, &target)?;
                Some(kind)
            }
        };

        let root = find_root(&target)?;
        debug!("Extracted root: {}", root.display());

        Ok(ExtractedTree {
            root,
            source: input.clone(),
            kind,
        })
    }

    fn extract_appimage(&self, path: &Path, kind: AppImageType, target: &Path) -> Result<()> {
        match self.method {
            ExtractMethod::Runtime => self.run_runtime(path, target),
            ExtractMethod::Unsquashfs => self.run_unsquashfs(path, kind, target),
            ExtractMethod::Auto => match self.run_runtime(path, target) {
                Err(err) if !err.is_cancelled() && kind == AppImageType::Type2 => {
                    if self.unsquashfs_path().is_err() {
                        return Err(err);
                    }
                    warn!("Runtime extraction failed ({}), retrying with unsquashfs", err);
                    fs::remove_dir_all(target)?;
                    fs::create_dir_all(target)?;
                    self.run_unsquashfs(path, kind, target)
                }
                other => other,
            },
        }
    }

    fn run_runtime(&self, path: &Path, target: &Path) -> Result<()> {
        if !fsutil::is_executable(path) {
            debug!("Marking {} executable", path.display());
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = fs::metadata(path)?.permissions().mode();
                fsutil::set_mode(path, mode | 0o111)?;
            }
        }

        let command = ToolCommand::new(path)
            .arg("--appimage-extract")
            .current_dir(target)
            .env_remove("DISPLAY");
        self.run_tool(command)
    }

    fn run_unsquashfs(&self, path: &Path, kind: AppImageType, target: &Path) -> Result<()> {
        if kind != AppImageType::Type2 {
            return Err(ConvertError::extract(
                "unsquashfs can only extract type 2 AppImages",
            ));
        }
        let unsquashfs = self.unsquashfs_path()?;
        let offset = payload_offset(path)?;
        debug!("squashfs payload at offset {}", offset);

        let command = ToolCommand::new(unsquashfs)
            .arg("-f")
            .arg("-d")
            .arg(target.join(SQUASHFS_ROOT))
            .arg("-o")
            .arg(offset.to_string())
            .arg(path);
        self.run_tool(command)
    }

    fn unsquashfs_path(&self) -> Result<PathBuf> {
        match &self.unsquashfs {
            Some(path) => Ok(path.clone()),
            None => which::which("unsquashfs")
                .map_err(|_| ConvertError::extract("unsquashfs not found in PATH")),
        }
    }

    fn run_tool(&self, command: ToolCommand) -> Result<()> {
        let run = command
            .run(&self.cancel)
            .map_err(|e| ConvertError::extract(format!("Failed to run {}: {}", command.display(), e)))?;

        match run {
            ToolRun::Finished(output) if output.success() => Ok(()),
            ToolRun::Finished(output) => Err(ConvertError::extract(format!(
                "{} exited with status {}: {}",
                command.display(),
                output
                    .code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                output.stderr.trim()
            ))),
            ToolRun::Cancelled(_) => Err(ConvertError::Cancelled {
                stage: Stage::Extracting,
            }),
            ToolRun::TimedOut(_) => Err(ConvertError::extract(format!(
                "{} timed out",
                command.display()
            ))),
        }
    }
}

/// `squashfs-root` if present, else the first directory
fn find_root(target: &Path) -> Result<PathBuf> {
    let expected = target.join(SQUASHFS_ROOT);
    if expected.is_dir() {
        return Ok(expected);
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(target)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    dirs.into_iter()
        .next()
        .ok_or_else(|| ConvertError::extract("Extraction produced no directory"))
}
