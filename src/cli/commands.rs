//! Command execution handlers

use std::path::Path;
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::error::{ConvertError, Result};
use crate::models::BuildResult;
use crate::pipeline::{ConversionPipeline, ConversionRequest, ConversionTask, InspectionReport, NullSink};
use crate::profiles::{self, ProfileKind};

use super::{ConfigArgs, ConfigCommands, ConvertArgs, InspectArgs, ReportFormat};

/// Load the configuration from `path`, or the default location
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Execute the convert command
pub async fn execute_convert(args: &ConvertArgs, config: Config, quiet: bool) -> Result<()> {
    let mut request = ConversionRequest::new(&args.input).keep_temp(args.keep_temp);
    request.overrides.name = args.name.clone();
    request.overrides.version = args.version_override.clone();
    request.overrides.release = args.release.clone();
    request.overrides.license = args.license.clone();
    request.profile = args.profile.clone();
    request.output_dir = args.output.clone();
    if args.no_deps {
        request.auto_deps = Some(false);
    }

    let pb = if args.json || quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::with_template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}% {msg}")
                .map_err(|e| ConvertError::Other(e.to_string()))?
                .progress_chars("█▓▒░ "),
        );
        pb.set_prefix(
            args.input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        pb
    };

    let mut handle = ConversionTask::spawn(config, request);
    let cancel = handle.cancellation_token();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => {
                    pb.set_position(u64::from(event.percent));
                    pb.set_message(event.message);
                }
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                cancel.cancel();
                pb.set_message("Cancelling...");
            }
        }
    }

    let result = handle.wait().await;
    match &result {
        Ok(_) => pb.finish_and_clear(),
        Err(_) => pb.abandon(),
    }
    let result = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !quiet {
        print_build_result(&result);
    }

    Ok(())
}

fn print_build_result(result: &BuildResult) {
    if let Some(artifact) = result.artifact() {
        println!("{} {}", style("Created").green().bold(), artifact.display());
    }
    if let Some(sha256) = result.sha256() {
        println!("  sha256: {}", style(sha256).dim());
    }
    if let Some(spec) = result.spec_path() {
        println!("  spec:   {}", spec.display());
    }
    print_warnings(result.warnings());
}

fn print_warnings(warnings: &[crate::models::Warning]) {
    if warnings.is_empty() {
        return;
    }
    println!("\n{} ({})", style("Warnings").yellow().bold(), warnings.len());
    for warning in warnings {
        println!("  {} {}", style("!").yellow(), warning);
    }
}

/// Execute the inspect command
pub async fn execute_inspect(args: &InspectArgs, config: Config) -> Result<()> {
    let mut request = ConversionRequest::new(&args.input);
    request.profile = args.profile.clone();
    if args.no_deps {
        request.auto_deps = Some(false);
    }

    let report = tokio::task::spawn_blocking(move || {
        ConversionPipeline::new(config, Arc::new(NullSink)).inspect(&request)
    })
    .await
    .map_err(|e| ConvertError::Other(e.to_string()))??;

    match args.format {
        ReportFormat::Pretty => print_report(&report),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Toml => println!(
            "{}",
            toml::to_string_pretty(&report).map_err(|e| ConvertError::Other(e.to_string()))?
        ),
    }

    Ok(())
}

fn print_report(report: &InspectionReport) {
    let metadata = &report.metadata;

    println!("{}", style("Package").bold());
    println!("═══════════════════════════════════════");
    println!("Name:         {} ({:?})", metadata.name, metadata.name_source);
    println!("Version:      {} ({:?})", metadata.full_version(), metadata.version_source);
    println!("Summary:      {}", metadata.effective_summary());
    println!("License:      {}", metadata.license);
    if let Some(url) = &metadata.url {
        println!("URL:          {}", url);
    }
    if !metadata.categories.is_empty() {
        println!("Categories:   {}", metadata.categories.join(";"));
    }
    println!("Profile:      {}", report.profile);
    if let Some(desktop) = &report.desktop_file {
        println!("Desktop file: {}", desktop.display());
    }
    if let Some(appstream) = &report.appstream_file {
        println!("AppStream:    {}", appstream.display());
    }

    println!("\n{}", style("Icon").bold());
    match report.selected_icon() {
        Some(icon) => println!(
            "  {} ({}, {}px, {:?})",
            icon.path.display(),
            icon.format,
            icon.size,
            icon.matched
        ),
        None => println!("  (none)"),
    }
    if report.icons.len() > 1 {
        println!("  {} other candidates", report.icons.len() - 1);
    }

    let deps = &report.dependencies;
    println!("\n{}", style("Dependencies").bold());
    if let Some(arch) = deps.architecture {
        println!("  Architecture: {}", arch);
    }
    println!(
        "  {} ELF files, {} bundled libraries",
        deps.elf_files,
        deps.bundled.len()
    );
    for dep in &deps.dependencies {
        if dep.is_resolved() {
            println!("  {} {}", style("✓").green(), dep);
        } else {
            println!("  {} {}", style("✗").red(), dep);
        }
    }

    print_warnings(&report.warnings);
}

/// Execute the profiles command
pub async fn execute_profiles() -> Result<()> {
    let detected = ProfileKind::detect();

    println!("{}", style("Distribution profiles").bold());
    for profile in profiles::all_profiles() {
        let marker = if Some(profile.kind()) == detected {
            style("*").green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {:<8} {:<26} dist {:<6} {} soname mappings",
            marker,
            profile.kind().as_str(),
            profile.display_name(),
            profile.dist_tag(),
            profile.table_size()
        );
    }

    match detected {
        Some(kind) => println!("\nDetected host: {}", kind),
        None => println!("\nHost not recognized; fedora is used unless configured"),
    }
    Ok(())
}

/// Execute the config command
pub async fn execute_config(args: &ConfigArgs, path: Option<&Path>) -> Result<()> {
    match &args.command {
        ConfigCommands::Show => {
            let config = load_config(path)?;
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| ConvertError::Config(e.to_string()))?
            );
        }
        ConfigCommands::Reset => {
            match path {
                Some(path) => Config::default().save_to(path)?,
                None => Config::reset()?,
            }
            println!("Configuration reset to defaults");
        }
        ConfigCommands::Set { key, value } => {
            let mut config = load_config(path)?;
            config.set(key, value)?;
            match path {
                Some(path) => config.save_to(path)?,
                None => config.save()?,
            }
            println!("Set {} = {}", key, value);
        }
        ConfigCommands::Get { key } => {
            let config = load_config(path)?;
            match config.get(key) {
                Some(value) => println!("{}", value),
                None => println!("Key '{}' is not set", key),
            }
        }
        ConfigCommands::Init { force } => {
            match path {
                Some(path) if path.exists() && !force => {
                    return Err(ConvertError::Config(
                        "Configuration file already exists. Use --force to overwrite.".into(),
                    ))
                }
                Some(path) => Config::default().save_to(path)?,
                None => Config::init(*force)?,
            }
            println!("Configuration initialized");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_set_and_get_with_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let set = ConfigArgs {
            command: ConfigCommands::Set {
                key: "conversion.profile".into(),
                value: "centos".into(),
            },
        };
        execute_config(&set, Some(&path)).await.unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.conversion.profile.as_deref(), Some("centos"));

        let bad = ConfigArgs {
            command: ConfigCommands::Set {
                key: "no.such.key".into(),
                value: "1".into(),
            },
        };
        assert!(execute_config(&bad, Some(&path)).await.is_err());
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let init = |force| ConfigArgs {
            command: ConfigCommands::Init { force },
        };

        execute_config(&init(false), Some(&path)).await.unwrap();
        assert!(execute_config(&init(false), Some(&path)).await.is_err());
        execute_config(&init(true), Some(&path)).await.unwrap();
    }
}
