// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod inputs;
mod net;
mod outputs;
mod pipeline;
mod supervisor;
mod tls;
mod watcher;

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use awesant_app::init_logging;
use awesant_core::DynResult;

use config::AgentConfig;
use supervisor::Supervisor;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - log shipping agent");

#[derive(Debug, Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
    /// Override the position-file directory
    #[arg(long = "libdir", value_name = "DIR")]
    libdir: Option<PathBuf>,
}

async fn wait_for_signal(shutdown_tx: watch::Sender<bool>) {
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("cannot install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", AgentConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        (AgentConfig::load_from_file(path)?, Some(path.clone()))
    } else {
        AgentConfig::load_from_default_paths()?
    };
    if let Some(libdir) = &cli.libdir {
        cfg.agent.libdir = libdir.display().to_string();
    }
    cfg.validate()
        .map_err(|e| format!("Invalid agent configuration: {}", e))?;

    init_logging(cli.log_level.as_deref().or(cfg.agent.log_level.as_deref()));
    tls::install_crypto_provider();

    if let Some(path) = &config_path {
        info!("Loaded configuration from {}", path.display());
    }
    info!(
        "Starting awesant ({} input(s), {} output(s), libdir {})",
        cfg.inputs.len(),
        cfg.outputs.len(),
        cfg.agent.libdir
    );

    if let Err(e) = std::fs::create_dir_all(&cfg.agent.libdir) {
        warn!(
            "cannot create libdir {}: {} (position files may not persist)",
            cfg.agent.libdir, e
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(wait_for_signal(shutdown_tx));

    let supervisor = Supervisor::from_config(&cfg).await?;
    supervisor.run(shutdown_rx).await
}
