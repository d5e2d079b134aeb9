use std::{path::PathBuf, process::ExitCode};

use channel_purger::{AppState, build_app, config, observability};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// CLI arguments for the channel purger
#[derive(Parser, Debug)]
#[command(version, about = "Empties chat channels through the platform REST API", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to the built-in configuration, which
    /// reads the bot token from DISCORD_BOT_TOKEN)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Purge a single channel and print the report as JSON
    Purge {
        /// Id of the channel to empty
        channel_id: String,
    },
    /// Write the default configuration file
    Init {
        /// Path to create the config file
        #[arg(short, long, default_value = "channel-purger.toml")]
        output: PathBuf,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => run_init(&output, force),
        Some(Command::Purge { channel_id }) => run_purge(args.config.as_deref(), &channel_id).await,
        Some(Command::Serve) | None => run_server(args.config.as_deref()).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<config::PurgerConfig, ExitCode> {
    let loaded = match path {
        Some(path) => config::PurgerConfig::from_file(path),
        None => config::PurgerConfig::from_str(config::default_config_toml()),
    };

    loaded.map_err(|e| {
        eprintln!("Failed to load config: {e}");
        ExitCode::FAILURE
    })
}

fn bootstrap(path: Option<&std::path::Path>) -> Result<config::PurgerConfig, ExitCode> {
    let config = load_config(path)?;
    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {e}");
        return Err(ExitCode::FAILURE);
    }
    Ok(config)
}

async fn run_server(config_path: Option<&std::path::Path>) -> ExitCode {
    let config = match bootstrap(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    if config.server.api_key.is_none() && !config.server.host.is_loopback() {
        tracing::warn!(
            bind_address = %config.server.host,
            "No server.api_key configured on a non-loopback address. \
             Anyone who can reach this address can purge channels."
        );
    }

    let state = match AppState::new(config.clone()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build message store client");
            return ExitCode::FAILURE;
        }
    };
    let shutdown = state.shutdown.clone();
    let app = build_app(&config, state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
    {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn run_purge(config_path: Option<&std::path::Path>, channel_id: &str) -> ExitCode {
    let config = match bootstrap(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build message store client");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(shutdown_signal(state.shutdown.clone()));

    let (report, code) = match state.purger.purge(channel_id, &state.shutdown).await {
        Ok(report) => (report, ExitCode::SUCCESS),
        Err(aborted) => {
            eprintln!("{aborted}");
            (aborted.report, ExitCode::FAILURE)
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize report: {e}"),
    }
    code
}

fn run_init(output: &std::path::Path, force: bool) -> ExitCode {
    if output.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output.display()
        );
        return ExitCode::FAILURE;
    }

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        return ExitCode::FAILURE;
    }

    if let Err(e) = std::fs::write(output, config::default_config_toml()) {
        eprintln!("Failed to write config file: {e}");
        return ExitCode::FAILURE;
    }

    println!("Created config file: {}", output.display());
    println!();
    println!("Set DISCORD_BOT_TOKEN, then run:");
    println!("  channel-purger --config {} serve", output.display());
    ExitCode::SUCCESS
}

/// Resolve on Ctrl-C or SIGTERM and cancel `shutdown`.
///
/// In-flight purges stop at their next cooldown and answer with a partial report.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling in-flight purges");
    shutdown.cancel();
}
