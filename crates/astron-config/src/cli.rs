//! Command-line argument parsing for Astron processes.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Astron process command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "astron", about = "Astron distributed-object process")]
pub struct CliArgs {
    /// Message director / client agent address.
    #[arg(long)]
    pub host: Option<String>,

    /// Message director port for internal connections.
    #[arg(long)]
    pub internal_port: Option<u16>,

    /// Client agent port for client connections.
    #[arg(long)]
    pub client_port: Option<u16>,

    /// Path to the DC file.
    #[arg(long)]
    pub dc_file: Option<PathBuf>,

    /// Fixed AI channel instead of an allocated one.
    #[arg(long)]
    pub ai_channel: Option<u64>,

    /// Datagram polls per second.
    #[arg(long)]
    pub poll_rate: Option<f64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref host) = args.host {
            self.network.host = host.clone();
        }
        if let Some(port) = args.internal_port {
            self.network.internal_port = port;
        }
        if let Some(port) = args.client_port {
            self.network.client_port = port;
        }
        if let Some(ref path) = args.dc_file {
            self.schema.dc_file = path.clone();
        }
        if let Some(channel) = args.ai_channel {
            self.cluster.ai_channel = Some(channel);
        }
        if let Some(rate) = args.poll_rate {
            self.network.poll_rate_hz = rate;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
