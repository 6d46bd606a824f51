mod kb_commands;

use std::{path::PathBuf, process::ExitCode};

use {
    clap::{Parser, Subcommand},
    tracing::{debug, warn},
    tracing_subscriber::{
        EnvFilter, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
    },
};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Parser)]
#[command(name = "finrag", version, about = "finrag: finance knowledge-base retrieval")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (finrag.toml/.yaml/.json). Defaults to one in the working directory.
    #[arg(long, global = true, env = "FINRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Kb(kb_commands::KbAction),
    /// Print the effective configuration.
    Config,
}

/// Level used until the config file is loaded: `--log-level`, then
/// `LOG_LEVEL`, then info.
fn bootstrap_level(cli_level: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> String {
    cli_level
        .map(str::to_string)
        .or_else(|| lookup("LOG_LEVEL").filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "info".into())
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the subscriber. The returned handle swaps the level filter once
/// the configured level is known.
fn init_telemetry(level: &str, json: bool) -> FilterHandle {
    let (filter, handle) = reload::Layer::new(level_filter(level));

    // Logs go to stderr so query output stays pipeable.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
    handle
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let bootstrap = bootstrap_level(cli.log_level.as_deref(), |k| std::env::var(k).ok());
    let filter = init_telemetry(&bootstrap, cli.json_logs);
    let config = finrag_config::discover_and_load(cli.config.as_deref())?;

    let level = cli.log_level.as_deref().unwrap_or(&config.app.log_level);
    if level != bootstrap
        && let Err(e) = filter.reload(level_filter(level))
    {
        warn!(error = %e, configured = level, "could not apply configured log level");
    }
    debug!(version = env!("CARGO_PKG_VERSION"), "finrag starting");

    match cli.command {
        Commands::Kb(action) => kb_commands::handle_kb(action, &config).await,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        },
    }
}
