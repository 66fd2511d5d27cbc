//! `ohros` – openHAB ⇄ ROS bridge daemon
//!
//! 1. Initialises logging (see [`ohros_runtime::telemetry`]).
//! 2. Loads the config from the path given as the first argument, or
//!    `~/.ohros/config.toml`; defaults are used when the file is absent.
//!    `ohros --init [PATH]` writes a default config file and exits.
//! 3. Starts the rosbridge WebSocket endpoint, the command router and the
//!    poll loop.
//! 4. Ctrl-C stops the poll loop between cycles; a second Ctrl-C exits
//!    immediately.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ohros_kernel::StatsReporter;
use ohros_middleware::{EventBus, RosBridge, Topic};
use ohros_runtime::{CommandRouter, OpenHabClient, PollingEngine, SourceClient, StatsPublisher};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;

fn main() -> ExitCode {
    let _telemetry = ohros_runtime::init_tracing("ohros");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("--init") {
        return write_default_config(args.get(1).map(PathBuf::from));
    }

    let path = args.first().map(PathBuf::from).unwrap_or_else(config::config_path);
    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            info!(path = %path.display(), "config loaded");
            cfg
        }
        Ok(None) => {
            warn!(path = %path.display(), "no config file; using defaults");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(error = %e, "config error");
            return ExitCode::FAILURE;
        }
    };
    info!(config = ?cfg, "starting ohros v{}", env!("CARGO_PKG_VERSION"));

    // ── Shutdown ──────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Held for the life of the process so the flag stays open even when the
    // handler cannot be installed.
    let _shutdown_keepalive = shutdown_tx.clone();
    let requested = AtomicBool::new(false);
    if let Err(e) = ctrlc::set_handler(move || {
        if requested.swap(true, Ordering::SeqCst) {
            eprintln!("[ohros] second interrupt; exiting now");
            std::process::exit(130);
        }
        info!("shutdown requested; stopping after the current poll cycle");
        let _ = shutdown_tx.send(true);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; graceful shutdown unavailable");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start tokio runtime");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(cfg, shutdown_rx))
}

async fn run(cfg: Config, shutdown: watch::Receiver<bool>) -> ExitCode {
    let client: Arc<dyn SourceClient> = match OpenHabClient::new(cfg.source_settings()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "cannot build openHAB client");
            return ExitCode::FAILURE;
        }
    };

    let bus = Arc::new(EventBus::default());
    let stats = StatsPublisher::new(
        Arc::new(StatsReporter::new(cfg.stats_interval())),
        Arc::clone(&bus),
        Arc::clone(&client),
        cfg.stats_sink(),
    );

    let engine = PollingEngine::new(
        Arc::clone(&client),
        Arc::clone(&bus),
        stats.clone(),
        cfg.polling_config(),
    );
    let router = CommandRouter::new(client, engine.detector(), stats);

    // Subscribe before the WebSocket endpoint can accept a client.
    let commands = bus.subscribe_to(Topic::Commands);
    tokio::spawn(router.run(commands));

    let bridge = RosBridge::new(Arc::clone(&bus), cfg.bridge_topics());
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.rosbridge_port));
    tokio::spawn(async move {
        if let Err(e) = bridge.run_ws_server(addr).await {
            error!(error = %e, "rosbridge endpoint stopped");
        }
    });

    engine.run(shutdown).await;
    info!("ohros stopped");
    ExitCode::SUCCESS
}

fn write_default_config(path: Option<PathBuf>) -> ExitCode {
    let path = path.unwrap_or_else(config::config_path);
    if path.exists() {
        error!(path = %path.display(), "refusing to overwrite existing config");
        return ExitCode::FAILURE;
    }
    match config::save_to(&Config::default(), &path) {
        Ok(()) => {
            info!(path = %path.display(), "default config written");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "could not write config");
            ExitCode::FAILURE
        }
    }
}
