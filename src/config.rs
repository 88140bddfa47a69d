//! Configuration management for appimage2rpm

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Conversion settings
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// rpmbuild invocation settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// User soname -> package mappings, consulted before the profile tables
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output directory
    pub output_dir: Option<PathBuf>,
    /// Parent directory for per-run working directories
    pub work_dir: Option<PathBuf>,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
    /// Keep the working directory after a run
    pub keep_temp: bool,
}

/// Which metadata source wins when both define a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataPrecedence {
    /// Desktop entry first, AppStream second
    #[default]
    DesktopEntry,
    /// AppStream first, desktop entry second
    Appstream,
}

impl std::str::FromStr for MetadataPrecedence {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "desktop-entry" | "desktop" => Ok(Self::DesktopEntry),
            "appstream" | "metainfo" => Ok(Self::Appstream),
            other => Err(ConvertError::Config(format!(
                "Unknown metadata precedence: {}",
                other
            ))),
        }
    }
}

/// How the AppImage payload is unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractMethod {
    /// Runtime first, unsquashfs as fallback
    #[default]
    Auto,
    /// `<appimage> --appimage-extract`
    Runtime,
    /// `unsquashfs -o <offset>`
    Unsquashfs,
}

impl std::str::FromStr for ExtractMethod {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "runtime" => Ok(Self::Runtime),
            "unsquashfs" => Ok(Self::Unsquashfs),
            other => Err(ConvertError::Config(format!(
                "Unknown extract method: {}",
                other
            ))),
        }
    }
}

/// Conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Target distribution profile (fedora, centos, rhel); detected when unset
    pub profile: Option<String>,
    /// Detect library dependencies automatically
    pub auto_deps: bool,
    /// Ask dnf for sonames missing from the built-in tables
    pub query_package_manager: bool,
    /// License used when the bundle declares none
    pub default_license: String,
    /// Release used when no override is given
    pub default_release: String,
    /// Metadata source precedence
    pub metadata_precedence: MetadataPrecedence,
    /// Extraction method
    pub extract_method: ExtractMethod,
    /// Copy the rendered spec next to the produced rpm
    pub write_spec: bool,
}

/// rpmbuild configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// rpmbuild binary name or path
    pub rpmbuild: String,
    /// Build timeout in seconds (0 disables)
    pub timeout_secs: u64,
    /// BuildArch override
    pub build_arch: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable colored output
    pub color: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            profile: None,
            auto_deps: true,
            query_package_manager: false,
            default_license: "Proprietary".to_string(),
            default_release: "1".to_string(),
            metadata_precedence: MetadataPrecedence::DesktopEntry,
            extract_method: ExtractMethod::Auto,
            write_spec: false,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            rpmbuild: "rpmbuild".to_string(),
            timeout_secs: 1800,
            build_arch: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            color: true,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| ConvertError::Config(format!("Invalid boolean for {}", key)))
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConvertError::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("appimage2rpm").join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConvertError::Config(e.to_string()))?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Reset configuration to defaults
    pub fn reset() -> Result<()> {
        Self::default().save()
    }

    /// Initialize configuration file
    pub fn init(force: bool) -> Result<()> {
        let path = Self::config_path()?;

        if path.exists() && !force {
            return Err(ConvertError::Config(
                "Configuration file already exists. Use --force to overwrite.".into(),
            ));
        }

        Self::default().save()
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(soname) = key.strip_prefix("mappings.") {
            return self.mappings.get(soname).cloned();
        }

        match key {
            "general.output_dir" => self.general.output_dir.as_ref().map(|p| p.display().to_string()),
            "general.work_dir" => self.general.work_dir.as_ref().map(|p| p.display().to_string()),
            "general.jobs" => self.general.jobs.map(|j| j.to_string()),
            "general.keep_temp" => Some(self.general.keep_temp.to_string()),

            "conversion.profile" => self.conversion.profile.clone(),
            "conversion.auto_deps" => Some(self.conversion.auto_deps.to_string()),
            "conversion.query_package_manager" => {
                Some(self.conversion.query_package_manager.to_string())
            }
            "conversion.default_license" => Some(self.conversion.default_license.clone()),
            "conversion.default_release" => Some(self.conversion.default_release.clone()),
            "conversion.metadata_precedence" => Some(
                match self.conversion.metadata_precedence {
                    MetadataPrecedence::DesktopEntry => "desktop-entry",
                    MetadataPrecedence::Appstream => "appstream",
                }
                .to_string(),
            ),
            "conversion.extract_method" => Some(
                match self.conversion.extract_method {
                    ExtractMethod::Auto => "auto",
                    ExtractMethod::Runtime => "runtime",
                    ExtractMethod::Unsquashfs => "unsquashfs",
                }
                .to_string(),
            ),
            "conversion.write_spec" => Some(self.conversion.write_spec.to_string()),

            "build.rpmbuild" => Some(self.build.rpmbuild.clone()),
            "build.timeout_secs" => Some(self.build.timeout_secs.to_string()),
            "build.build_arch" => self.build.build_arch.clone(),

            "logging.level" => Some(self.logging.level.clone()),
            "logging.color" => Some(self.logging.color.to_string()),

            _ => None,
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(soname) = key.strip_prefix("mappings.") {
            if value.is_empty() {
                self.mappings.remove(soname);
            } else {
                self.mappings.insert(soname.to_string(), value.to_string());
            }
            return Ok(());
        }

        match key {
            "general.output_dir" => {
                self.general.output_dir = optional(value).map(PathBuf::from);
            }
            "general.work_dir" => {
                self.general.work_dir = optional(value).map(PathBuf::from);
            }
            "general.jobs" => {
                self.general.jobs = Some(value.parse().map_err(|_| {
                    ConvertError::Config("Invalid number for jobs".into())
                })?);
            }
            "general.keep_temp" => {
                self.general.keep_temp = parse_bool(key, value)?;
            }

            "conversion.profile" => {
                if let Some(profile) = optional(value) {
                    profile.parse::<crate::profiles::ProfileKind>()?;
                    self.conversion.profile = Some(profile);
                } else {
                    self.conversion.profile = None;
                }
            }
            "conversion.auto_deps" => {
                self.conversion.auto_deps = parse_bool(key, value)?;
            }
            "conversion.query_package_manager" => {
                self.conversion.query_package_manager = parse_bool(key, value)?;
            }
            "conversion.default_license" => {
                self.conversion.default_license = value.to_string();
            }
            "conversion.default_release" => {
                self.conversion.default_release = release_value(value)?;
            }
            "conversion.metadata_precedence" => {
                self.conversion.metadata_precedence = value.parse()?;
            }
            "conversion.extract_method" => {
                self.conversion.extract_method = value.parse()?;
            }
            "conversion.write_spec" => {
                self.conversion.write_spec = parse_bool(key, value)?;
            }

            "build.rpmbuild" => {
                self.build.rpmbuild = value.to_string();
            }
            "build.timeout_secs" => {
                self.build.timeout_secs = value.parse().map_err(|_| {
                    ConvertError::Config("Invalid number for timeout_secs".into())
                })?;
            }
            "build.build_arch" => {
                self.build.build_arch = optional(value);
            }

            "logging.level" => {
                self.logging.level = value.to_string();
            }
            "logging.color" => {
                self.logging.color = parse_bool(key, value)?;
            }

            _ => {
                return Err(ConvertError::Config(format!(
                    "Unknown configuration key: {}",
                    key
                )));
            }
        }

        Ok(())
    }
}

/// Clean a configured release the same way a version is cleaned
pub fn release_value(value: &str) -> Result<String> {
    crate::models::sanitize_version(value)
        .map_err(|_| ConvertError::Config(format!("Invalid release '{}'", value)))
}

impl BuildConfig {
    /// Timeout for the rpmbuild invocation
    pub fn timeout(&self) -> Option<std::time::Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(std::time::Duration::from_secs(secs)),
        }
    }
}
