//! appimage2rpm command-line entry point

use std::process::ExitCode;

use console::style;
use tracing_subscriber::EnvFilter;

use appimage2rpm::cli::{self, Cli, Commands};
use appimage2rpm::config::Config;
use appimage2rpm::error::Result;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    setup_logging(&cli, &config);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(output) = e.build_output() {
                if !output.trim().is_empty() {
                    eprintln!("\n{}\n{}", style("rpmbuild output:").dim(), output.trim_end());
                }
            }
            if e.is_cancelled() {
                ExitCode::from(130)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Set up logging based on CLI arguments and the configured level
fn setup_logging(cli: &Cli, config: &Config) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(config.logging.color)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    if let Some(jobs) = cli.jobs.or(config.general.jobs) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .ok();
    }

    match cli.command {
        Commands::Convert(args) => cli::execute_convert(&args, config, cli.quiet).await,
        Commands::Inspect(args) => cli::execute_inspect(&args, config).await,
        Commands::Profiles => cli::execute_profiles().await,
        Commands::Config(args) => cli::execute_config(&args, cli.config.as_deref()).await,
    }
}
