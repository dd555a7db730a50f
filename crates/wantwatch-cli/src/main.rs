#![forbid(unsafe_code)]

mod channels;
mod cmd;
mod discogs;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wantwatch_core::config::resolve_config;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "wantwatch: notify when wanted releases get new marketplace listings",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/wantwatch/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Check listing counts, save them, and notify about increases",
        after_help = "EXAMPLES:\n    # Scheduled run\n    wantwatch run\n\n    # Preview without saving or sending\n    wantwatch run --dry-run"
    )]
    Run(cmd::run::RunArgs),

    #[command(about = "Inspect or reset the stored listing counts")]
    Baseline(cmd::baseline::BaselineArgs),

    #[command(about = "Show the effective configuration with secrets masked")]
    Config(cmd::config::ConfigArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("WANTWATCH_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "wantwatch=debug,info"
        } else {
            "wantwatch=info,warn"
        })
    });

    let format = env::var("WANTWATCH_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        debug!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(ref args) => cmd::run::run_run(args, &config, output),
        Commands::Baseline(ref args) => cmd::baseline::run_baseline(args, &config, output),
        Commands::Config(ref args) => cmd::config::run_config(args, &config, output),
    }
}
