//! Error types for appimage2rpm

use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::Stage;

/// Main error type for conversion operations
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Filesystem or process I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal failure
    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// The AppImage could not be unpacked
    #[error("Failed to extract AppImage: {0}")]
    Extraction(String),

    /// Staging or `%files` verification failed
    #[error("Failed to generate RPM spec: {0}")]
    SpecGeneration(String),

    /// rpmbuild failed or produced no package
    #[error("RPM build failed: {message}")]
    Build {
        /// Short description of the failure
        message: String,
        /// Captured build tool output, verbatim
        output: String,
    },

    /// The run was cancelled
    #[error("Conversion cancelled during {stage}")]
    Cancelled {
        /// Stage boundary where the cancellation was observed
        stage: Stage,
    },

    /// An error tagged with the stage it came from
    #[error("{stage} failed: {source}")]
    Stage {
        /// Stage that raised the error
        stage: Stage,
        /// Underlying error
        #[source]
        source: Box<ConvertError>,
    },

    /// Unusable input or override
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A required file does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// Missing path
        path: PathBuf,
    },

    /// Invalid configuration key or value
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parse failure
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid regular expression
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Malformed XML metadata
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

/// Result type alias for conversion operations
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create a new extraction error
    pub fn extract(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create a new spec generation error
    pub fn spec(msg: impl Into<String>) -> Self {
        Self::SpecGeneration(msg.into())
    }

    /// Create a new build error carrying the tool output
    pub fn build(msg: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Build {
            message: msg.into(),
            output: output.into(),
        }
    }

    /// Create a file not found error
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Attach the originating stage, unless one is already attached
    pub fn at_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } | Self::Cancelled { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error originated from, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } | Self::Cancelled { stage } => Some(*stage),
            _ => None,
        }
    }

    /// The error with any stage wrapper removed
    pub fn root(&self) -> &ConvertError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this is a cooperative cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled { .. })
    }

    /// Whether this is one of the conversion failure kinds: extraction,
    /// spec generation or build. Other errors come from the environment.
    pub fn is_fatal_kind(&self) -> bool {
        matches!(
            self.root(),
            Self::Extraction(_) | Self::SpecGeneration(_) | Self::Build { .. }
        )
    }

    /// Captured build tool output, for build failures
    pub fn build_output(&self) -> Option<&str> {
        match self.root() {
            Self::Build { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }
}
