//! Binary entry point: load configuration, connect to the panel, and
//! run the poll loop until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use paradox_bridge::{Config, LoggingNotifier, RunState, Supervisor};

#[derive(Parser)]
#[command(name = "paradox-bridge")]
#[command(version)]
#[command(about = "Bridge between a Paradox IP150 alarm panel and a notification layer")]
struct Cli {
    /// Load configuration from this file instead of the platform config directory.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Connect, run one poll iteration, then exit. Useful for smoke-testing a config.
    #[arg(long)]
    once: bool,

    /// Pause immediately after connecting, rather than entering the poll loop.
    #[arg(long)]
    pause: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load().context("loading config")?,
    };

    let supervisor = Arc::new(Supervisor::new(config, Arc::new(LoggingNotifier)));

    let ctrlc_supervisor = supervisor.clone();
    ctrlc::set_handler(move || {
        log::info!("received interrupt, disconnecting");
        ctrlc_supervisor.disconnect();
    })
    .context("installing signal handler")?;

    if !supervisor.connect() {
        anyhow::bail!("failed to connect to panel");
    }

    if cli.pause {
        supervisor.pause();
    }

    if cli.once {
        supervisor.run_once();
        supervisor.disconnect();
        return Ok(());
    }

    loop {
        match supervisor.run_state() {
            RunState::Run => supervisor.run(),
            RunState::Pause => std::thread::sleep(Duration::from_secs(5)),
            RunState::Stop | RunState::Error => break,
        }
    }

    Ok(())
}
