//! Entry point for `distort-dispatch`.
//!
//! Parses CLI arguments and starts one of the three roles. All protocol work
//! lives in the library; `main.rs` owns only process setup (logging, signal
//! handling, argument parsing).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::watch;

use distort_dispatch::client::ClientSession;
use distort_dispatch::command::run_interactive;
use distort_dispatch::config::{ClientConfig, CoordinatorConfig, CoordinatorOptions, WorkerConfig};
use distort_dispatch::coordinator::Coordinator;
use distort_dispatch::worker::WorkerSession;

/// File-distortion dispatch over fixed-size TCP frames.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand)]
enum Role {
    /// Route client requests to registered workers.
    Coordinator {
        /// Config file: client ip, client port, worker ip, worker port.
        config: PathBuf,
        /// Per-frame read/write deadline in seconds.
        #[arg(long)]
        io_timeout_secs: Option<u64>,
        /// Mark a worker unavailable once its registration connection ends.
        #[arg(long)]
        clear_on_disconnect: bool,
    },
    /// Register with the coordinator and serve clients.
    Worker {
        /// Config file: coordinator ip, coordinator port, ip, port, folder, category.
        config: PathBuf,
        #[arg(long)]
        io_timeout_secs: Option<u64>,
    },
    /// Interactive client reading commands from stdin.
    Client {
        /// Config file: username, folder, coordinator ip, coordinator port.
        config: PathBuf,
        #[arg(long)]
        io_timeout_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.role {
        Role::Coordinator {
            config,
            io_timeout_secs,
            clear_on_disconnect,
        } => {
            let cfg = CoordinatorConfig::from_file(&config)?;
            let options = CoordinatorOptions {
                io_timeout: io_timeout_secs.map(Duration::from_secs),
                clear_on_disconnect,
            };
            let addrs = cfg.listen_addrs();
            let coordinator = Coordinator::bind(addrs.as_slice(), options)
                .await
                .context("starting coordinator")?;
            coordinator.run(shutdown_signal()).await?;
        }
        Role::Worker {
            config,
            io_timeout_secs,
        } => {
            let cfg = WorkerConfig::from_file(&config)?;
            let worker = WorkerSession::start(&cfg, io_timeout_secs.map(Duration::from_secs))
                .await
                .context("registering worker")?;
            worker.run(shutdown_signal()).await?;
        }
        Role::Client {
            config,
            io_timeout_secs,
        } => {
            let cfg = ClientConfig::from_file(&config)?;
            let session =
                ClientSession::new(cfg).with_timeout(io_timeout_secs.map(Duration::from_secs));
            run_interactive(session, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
        }
    }
    Ok(())
}

/// Flips to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Ctrl-C received, shutting down");
                let _ = tx.send(true);
            }
            Err(e) => {
                log::warn!("cannot listen for Ctrl-C: {e}");
                // Keep the sender alive; a dropped sender also means shutdown.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}
