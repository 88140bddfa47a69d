//! Command-line interface for appimage2rpm

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// appimage2rpm - Convert AppImage bundles into native RPM packages
///
/// Extracts the bundle, recovers metadata and icons, maps bundled binaries'
/// library requirements to distribution packages and runs rpmbuild.
#[derive(Parser, Debug)]
#[command(name = "appimage2rpm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "APPIMAGE2RPM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of threads for the ELF scan (default: number of CPUs)
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert an AppImage into an RPM
    Convert(ConvertArgs),

    /// Show what a conversion would produce, without building
    Inspect(InspectArgs),

    /// List distribution profiles
    Profiles,

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the convert command
#[derive(Parser, Debug, Clone)]
pub struct ConvertArgs {
    /// AppImage file or extracted AppDir
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output directory (default: configured or current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Package name override
    #[arg(long)]
    pub name: Option<String>,

    /// Version override
    #[arg(long)]
    pub version_override: Option<String>,

    /// Release override
    #[arg(long)]
    pub release: Option<String>,

    /// License override
    #[arg(long)]
    pub license: Option<String>,

    /// Target distribution (fedora, centos, rhel)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Skip dependency detection
    #[arg(long)]
    pub no_deps: bool,

    /// Keep the working directory after conversion
    #[arg(long)]
    pub keep_temp: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the inspect command
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// AppImage file or extracted AppDir
    #[arg(required = true)]
    pub input: PathBuf,

    /// Target distribution (fedora, centos, rhel)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Skip dependency detection
    #[arg(long)]
    pub no_deps: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Pretty)]
    pub format: ReportFormat,
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable pretty output
    Pretty,
    /// JSON output
    Json,
    /// TOML output
    Toml,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Reset configuration to defaults
    Reset,
    /// Set a configuration value
    Set {
        /// Configuration key, e.g. `conversion.auto_deps` or `mappings.libfoo.so.1`
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Initialize configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_convert_args() {
        let cli = Cli::try_parse_from([
            "appimage2rpm",
            "-v",
            "convert",
            "Foo.AppImage",
            "--profile",
            "rhel",
            "--no-deps",
            "--version-override",
            "2.0",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Convert(args) => {
                assert_eq!(args.input, PathBuf::from("Foo.AppImage"));
                assert_eq!(args.profile.as_deref(), Some("rhel"));
                assert_eq!(args.version_override.as_deref(), Some("2.0"));
                assert!(args.no_deps);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["appimage2rpm", "-v", "-q", "profiles"]).is_err());
    }
}
