//! appimage2rpm - Convert AppImage bundles into native RPM packages
//!
//! The conversion runs as a pipeline of stages: the AppImage payload is
//! extracted, metadata and icons are recovered from the bundle, the bundled
//! ELF files are scanned for the sonames they need and those are mapped to
//! packages of the target distribution. Finally an install root and an RPM
//! spec are generated and handed to `rpmbuild`.
//!
//! # Quick Start
//!
//! ```bash
//! # Convert an AppImage
//! appimage2rpm convert Foo-1.2.3-x86_64.AppImage
//!
//! # See what would be packaged
//! appimage2rpm inspect Foo-1.2.3-x86_64.AppImage --format json
//!
//! # Target RHEL from a Fedora host
//! appimage2rpm convert Foo.AppImage --profile rhel
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod converter;
pub mod deps;
pub mod error;
pub mod extractor;
pub mod fsutil;
pub mod icons;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod process;
pub mod profiles;

// Re-export commonly used types
pub use error::{ConvertError, Result};
pub use models::{Architecture, BuildResult, Dependency, Metadata, Warning};
pub use pipeline::{
    convert, ConversionPipeline, ConversionRequest, ConversionTask, ProgressEvent, ProgressSink,
    Stage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Inspect an input without building
///
/// # Example
///
/// ```no_run
/// let report = appimage2rpm::inspect(std::path::Path::new("Foo.AppImage"))?;
/// println!("{} {}", report.metadata.name, report.metadata.version);
/// # Ok::<(), appimage2rpm::ConvertError>(())
/// ```
pub fn inspect(input: &std::path::Path) -> Result<pipeline::InspectionReport> {
    let config = config::Config::load()?;
    ConversionPipeline::new(config, std::sync::Arc::new(pipeline::NullSink))
        .inspect(&ConversionRequest::new(input))
}
