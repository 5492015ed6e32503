//! Demo Astron process.
//!
//! Runs as an AI server (the default) against the message director, or as a
//! game client with `--client` against the client agent. Configuration is
//! loaded from `config.ron` and can be overridden via CLI flags.
//!
//! Run with `cargo run -p astron-demo -- --dc-file crates/astron-demo/example.dc`.

mod views;

use std::process::ExitCode;

use astron_config::{CliArgs, Config};
use astron_net::{ConnectionError, DoId, Zone};
use astron_repository::{ObjectRepository, RepositoryConfig, RepositoryError};
use clap::Parser;
use tracing::{error, info, warn};

/// CLI arguments for the demo binary.
#[derive(Parser, Debug)]
#[command(name = "astron-demo", about = "Astron demo AI / client process")]
struct DemoArgs {
    #[command(flatten)]
    common: CliArgs,

    /// Connect to the client agent as a game client instead of as an AI.
    #[arg(long)]
    client: bool,

    /// Parent object of the interest opened in client mode.
    #[arg(long, default_value_t = 10_000)]
    interest_parent: DoId,

    /// Zone of the interest opened in client mode.
    #[arg(long, default_value_t = 0)]
    interest_zone: Zone,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = DemoArgs::parse();

    let config_dir = match args.common.config.clone().map_or_else(Config::default_dir, Ok) {
        Ok(dir) => Some(dir),
        Err(e) => {
            eprintln!("{e}, using defaults");
            None
        }
    };
    let mut config = config_dir
        .as_deref()
        .map(Config::load_or_create)
        .transpose()
        .unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}, using defaults");
            None
        })
        .unwrap_or_default();
    config.apply_cli_overrides(&args.common);

    let log_dir = config_dir.as_ref().map(|dir| dir.join("logs"));
    astron_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let result = if args.client {
        run_client(&config, args.interest_parent, args.interest_zone).await
    } else {
        run_ai(&config).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(RepositoryError::Connection(ConnectionError::Refused { addr })) => {
            info!(%addr, "nothing is listening, exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "repository stopped");
            ExitCode::FAILURE
        }
    }
}

/// Create the world root and a world object, then serve until disconnected.
async fn run_ai(config: &Config) -> Result<(), RepositoryError> {
    let mut repo = ObjectRepository::connect(RepositoryConfig::internal(config), &views::factories()).await?;
    info!(channel = repo.channel(), "AI connected");

    let root = repo.create_object("Root", 0, 0)?;
    repo.set_object_ai(root)?;
    let world = repo.create_object_with_required(
        "DistributedWorld",
        root,
        0,
        &[("worldName", vec!["Demo".into()])],
    )?;
    repo.set_object_ai(world)?;
    info!(root, world, "world created");

    let result = repo.poll_forever().await;
    if repo.is_connected() {
        if let Err(e) = repo.delete_ai_objects() {
            warn!(error = %e, "could not delete AI objects");
        }
        repo.disconnect();
    }
    result
}

/// Say hello, open one interest and log whatever the client agent shows us.
async fn run_client(config: &Config, parent_id: DoId, zone_id: Zone) -> Result<(), RepositoryError> {
    let mut repo = ObjectRepository::connect(RepositoryConfig::client(config), &views::factories()).await?;
    let context = repo.add_interest(1, parent_id, zone_id)?;
    info!(context, parent_id, zone_id, "interest requested");

    let mut reported = 0;
    repo.add_task(move |repo| {
        for (context, interest_id) in &repo.completed_interests()[reported..] {
            info!(context, interest_id, objects = repo.object_count(), "interest complete");
        }
        reported = repo.completed_interests().len();
        Ok(())
    });
    repo.poll_forever().await
}
