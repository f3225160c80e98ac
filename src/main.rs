//! Pulsoid OSC Bridge
//!
//! Streams live heart-rate readings from Pulsoid and re-emits each one to
//! VRChat as a batch of OSC avatar parameters.

mod auth;
mod bridge;
mod cli;
mod config;
mod error;
mod logging;
mod osc;
mod stream;
mod types;
mod version;

use clap::Parser;
use tracing::{info, warn};

use crate::auth::{FileTokenProvider, TokenStore};
use crate::bridge::Bridge;
use crate::cli::{AuthSubcommand, Cli, Commands, ConfigSubcommand};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            // Config commands use minimal logging
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Auth { subcommand } => {
            logging::init_simple(if cli.verbose > 0 {
                tracing::Level::DEBUG
            } else {
                tracing::Level::WARN
            })?;
            handle_auth_command(subcommand)
        }
        Commands::Run { config, token } => {
            let config = BridgeConfig::load(config.as_deref())?;

            // The guards must be kept alive for the lifetime of the program
            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

            let build = version::build_info();
            info!(
                version = %build.full_version(),
                build_target = %build.target,
                profile = %build.profile,
                "Starting Pulsoid OSC bridge"
            );

            run_bridge(config, token)
        }
    }
}

/// Run the bridge in normal operation mode
fn run_bridge(config: BridgeConfig, token: Option<String>) -> Result<()> {
    info!(
        stream_url = %config.stream.url,
        osc_host = %config.osc.host,
        osc_port = config.osc.port,
        max_attempts = config.reconnect.max_attempts,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("pulsoid-bridge")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async {
        let provider = FileTokenProvider::new(&config.auth).with_explicit_token(token);
        let mut bridge = Bridge::from_config(&config);
        bridge.run(&provider, shutdown_signal()).await
    })
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Handle auth subcommands
fn handle_auth_command(subcommand: AuthSubcommand) -> Result<()> {
    match subcommand {
        AuthSubcommand::Login { config, force } => {
            let cfg = BridgeConfig::load(config.as_deref())?;
            let store = TokenStore::from_settings(&cfg.auth);

            if !force && store.read()?.is_some() {
                println!(
                    "A token is already stored at {}. Use --force to replace it.",
                    store.path().display()
                );
                return Ok(());
            }

            auth::interactive_login(&cfg.auth, &store)?;
            println!("Token saved to {}", store.path().display());
        }
        AuthSubcommand::Status { config } => {
            let cfg = BridgeConfig::load(config.as_deref())?;
            let store = TokenStore::from_settings(&cfg.auth);

            match store.read()? {
                Some(token) => println!(
                    "Token stored at {} (fingerprint {})",
                    store.path().display(),
                    auth::token_fingerprint(&token)
                ),
                None => println!(
                    "No token stored at {}. Run 'pulsoid-osc-bridge auth login' to authorize.",
                    store.path().display()
                ),
            }
        }
        AuthSubcommand::Clear { config } => {
            let cfg = BridgeConfig::load(config.as_deref())?;
            let store = TokenStore::from_settings(&cfg.auth);

            if store.clear()? {
                println!("Token removed from {}", store.path().display());
            } else {
                println!("No token stored at {}", store.path().display());
            }
        }
        AuthSubcommand::Url { config } => {
            let cfg = BridgeConfig::load(config.as_deref())?;
            println!("{}", auth::authorization_url(&cfg.auth)?);
        }
    }

    Ok(())
}

/// Handle config subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = BridgeConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate { config } => {
            BridgeConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
