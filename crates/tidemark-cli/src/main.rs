//! Tidemark CLI - Version-aware upgrades for Tidemark installations

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};

mod commands;
mod confirm;
mod display;
mod error;
mod exit_codes;
mod logging;
mod settings;

use display::OutputFormat;
use error::{CliError, Result};
use logging::LogFormat;
use settings::Settings;

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author = "Tidemark Contributors")]
#[command(version)]
#[command(about = "Version-aware upgrades for Tidemark installations on Kubernetes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Diagnostic log format
    #[arg(long, global = true, value_enum, env = "TIDEMARK_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Kubeconfig context to use
    #[arg(long, global = true, env = "TIDEMARK_KUBE_CONTEXT")]
    kube_context: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade (or downgrade) the installation in the current cluster
    Upgrade {
        /// Version to move to (defaults to this binary's version)
        #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
        target_version: String,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "yes")]
        yes: bool,

        /// Report format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                std::process::exit(exit_codes::USAGE_ERROR);
            }
        },
    };

    let code = match run(cli) {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load()?;

    logging::init(
        cli.debug,
        cli.log_format.or(settings.log_format).unwrap_or_default(),
    );
    tracing::debug!(?settings, "settings loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::internal(format!("failed to start async runtime: {}", e)))?;

    match cli.command {
        Commands::Upgrade {
            target_version,
            yes,
            output,
        } => runtime.block_on(commands::upgrade::run(commands::upgrade::UpgradeArgs {
            target_version,
            assume_yes: yes || settings.assume_yes,
            output: output.or(settings.output).unwrap_or_default(),
            kube_context: cli.kube_context.or(settings.kube_context),
            debug: cli.debug,
        })),
    }
}
