//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the Pulsoid OSC bridge.

use clap::{Parser, Subcommand};

/// Pulsoid OSC Bridge - heart rate from Pulsoid to VRChat
///
/// Receives live heart-rate readings from the Pulsoid real-time API and
/// forwards them to VRChat as OSC avatar parameters.
#[derive(Parser, Debug)]
#[command(name = "pulsoid-osc-bridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bridge until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "PULSOID_BRIDGE_CONFIG")]
        config: Option<String>,

        /// Pulsoid access token (skips the stored token and login)
        #[arg(long, env = "PULSOID_BRIDGE_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Manage the Pulsoid access token
    Auth {
        #[command(subcommand)]
        subcommand: AuthSubcommand,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version,
}

/// Token subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AuthSubcommand {
    /// Authorize with Pulsoid and store the access token
    Login {
        /// Path to configuration file
        #[arg(short, long, env = "PULSOID_BRIDGE_CONFIG")]
        config: Option<String>,

        /// Replace an existing token
        #[arg(short, long)]
        force: bool,
    },

    /// Show whether a token is stored
    Status {
        /// Path to configuration file
        #[arg(short, long, env = "PULSOID_BRIDGE_CONFIG")]
        config: Option<String>,
    },

    /// Delete the stored token
    Clear {
        /// Path to configuration file
        #[arg(short, long, env = "PULSOID_BRIDGE_CONFIG")]
        config: Option<String>,
    },

    /// Print the authorization URL without waiting for a token
    Url {
        /// Path to configuration file
        #[arg(short, long, env = "PULSOID_BRIDGE_CONFIG")]
        config: Option<String>,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
