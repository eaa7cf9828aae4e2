//! etlpipe command-line interface.

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use etlpipe::config::Config;
use etlpipe::constants::{DEFAULT_CONFIG_FILE, DEFAULT_LOG_LEVEL};
use etlpipe::ui;

#[derive(Parser)]
#[command(name = "etlpipe", version, about = "Batch-correlated download, load and transform pipeline")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log filter (overrides the config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run download, load and transform in sequence
    Run(RunArgs),
    /// Stage 1: download sources into storage
    Download {
        /// Only download this source
        #[arg(long)]
        source: Option<String>,
    },
    /// Stage 2: load one staged batch into the warehouse
    Load {
        /// Batch key (YYYY-MM-DD_HH-MM-SS) or ISO-8601 timestamp
        #[arg(long)]
        batch: Option<String>,
        /// Latest batch of this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
    /// Stage 3: rebuild views filtered to one batch
    Transform {
        /// ISO-8601 batch timestamp (default: most recent)
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// List staged batches
    Batches {
        /// Only this month (YYYY-MM)
        #[arg(long)]
        month: Option<String>,
    },
    /// List batch timestamps loaded in the warehouse
    Timestamps,
    /// Show storage and warehouse status
    Status,
    /// Validate the configuration file
    Validate,
}

#[derive(Args)]
pub struct RunArgs {
    /// Only download this source
    #[arg(long)]
    pub source: Option<String>,
    /// ISO-8601 batch timestamp for the views (default: most recent)
    #[arg(long)]
    pub timestamp: Option<String>,
    /// Skip stage 1
    #[arg(long)]
    pub skip_download: bool,
    /// Skip stage 2
    #[arg(long)]
    pub skip_load: bool,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(cli.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL), cli.log_json);
            ui::print_error_box(
                "Cannot load configuration",
                &format!("{e:#}"),
                &["Pass --config <PATH> or create etlpipe.toml in the current directory"],
            );
            return ExitCode::FAILURE;
        },
    };
    init_tracing(
        cli.log_level.as_deref().unwrap_or(config.log_level()),
        cli.log_json,
    );

    let outcome = match cli.command {
        Command::Validate => commands::validate::execute(&config),
        command => match commands::validated(&config) {
            Ok(()) => dispatch(command, &config).await,
            Err(e) => Err(e),
        },
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            ui::print_error_box("etlpipe failed", &format!("{e:#}"), &[]);
            ExitCode::FAILURE
        },
    }
}

async fn dispatch(command: Command, config: &Config) -> anyhow::Result<bool> {
    match command {
        Command::Run(args) => commands::run::execute(config, args).await,
        Command::Download { source } => commands::download::execute(config, source.as_deref()).await,
        Command::Load { batch, date } => {
            commands::load::execute(config, batch.as_deref(), date.as_deref()).await
        },
        Command::Transform { timestamp } => {
            commands::transform::execute(config, timestamp.as_deref()).await
        },
        Command::Batches { month } => commands::inspect::batches(config, month.as_deref()).await,
        Command::Timestamps => commands::inspect::timestamps(config).await,
        Command::Status => commands::inspect::status(config).await,
        Command::Validate => commands::validate::execute(config),
    }
}
