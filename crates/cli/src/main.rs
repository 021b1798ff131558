mod config_commands;
mod generate_commands;
mod project;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "gqlbus", about = "gqlbus: GraphQL over a message bus", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: discover gqlbus.{toml,yaml,yml,json}).
    #[arg(long, short, global = true, env = "GQLBUS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate typed client bindings for the configured services.
    Generate {
        /// Only generate these services.
        #[arg(long = "client")]
        clients: Vec<String>,
    },
    /// Write the server entrypoint unless it already exists.
    InitServer {
        /// Target file, overriding `[server].output`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate the config and check query documents against the catalogues.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
        /// Only validate the config file, do not fetch catalogues.
        #[arg(long)]
        offline: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "gqlbus starting");

    let config = cli.config.as_deref();
    match &cli.command {
        Commands::Generate { clients } => generate_commands::generate(config, clients).await,
        Commands::InitServer { output } => generate_commands::init_server(config, output.clone()),
        Commands::Check { verbose, offline } => {
            config_commands::check(config, *verbose, *offline).await
        },
    }
}
