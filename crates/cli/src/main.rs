mod config_commands;
mod echo;
#[cfg(feature = "metrics")]
mod metrics_server;
mod pairing_commands;
mod serve;
mod usage_commands;

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    hookrelay_config::HookrelayConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "hookrelay", about = "hookrelay: bidirectional webhook bridge", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and the user config dir).
    #[arg(long, short, global = true, env = "HOOKRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides `storage.dataDir`).
    #[arg(long, global = true, env = "HOOKRELAY_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook bridge (default when no subcommand is provided).
    Serve,
    /// Validate the configuration and report problems.
    Check {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Check the outbound endpoint settings, optionally sending a test message.
    Probe {
        /// Text to deliver to the outbound URL.
        #[arg(long)]
        send: Option<String>,
        /// Recipient placed in the message's `to` field.
        #[arg(long, default_value = "probe")]
        to: String,
    },
    /// Token usage counters.
    Usage {
        #[command(subcommand)]
        action: usage_commands::UsageAction,
    },
    /// DM pairing requests.
    Pairing {
        #[command(subcommand)]
        action: pairing_commands::PairingAction,
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
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the explicit config file, or discover one, then apply CLI overrides.
fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<HookrelayConfig> {
    let mut config = match path {
        Some(path) => hookrelay_config::load_config(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => hookrelay_config::discover_and_load(),
    };
    if data_dir.is_some() {
        config.storage.data_dir = data_dir;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    let config_path = cli.config.clone();
    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "hookrelay starting");
            let config = load_config(config_path.as_deref(), cli.data_dir)?;
            serve::run(config).await
        },
        Some(Commands::Check { verbose }) => config_commands::check(config_path.as_deref(), verbose),
        Some(Commands::Probe { send, to }) => {
            let config = load_config(config_path.as_deref(), cli.data_dir)?;
            config_commands::probe(&config, send, &to).await
        },
        Some(Commands::Usage { action }) => {
            let config = load_config(config_path.as_deref(), cli.data_dir)?;
            usage_commands::handle_usage(&config, action).await
        },
        Some(Commands::Pairing { action }) => {
            let config = load_config(config_path.as_deref(), cli.data_dir)?;
            pairing_commands::handle_pairing(&config, action).await
        },
    }
}
