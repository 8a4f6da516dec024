// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! onvifeye — ONVIF camera event monitor and clip recorder daemon.
//!
//! Usage:
//!   onvifeye
//!   onvifeye -v --config-dir /etc/onvifeye
//!   onvifeye --create-config cam1.conf
//!   onvifeye --camera_clip_seconds 45 --camera_username admin

use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use onvifeye::config::{self, CameraConfigOverrides};
use onvifeye::manager::Supervisor;

#[derive(Parser)]
#[command(name = "onvifeye", about = "ONVIF camera event monitor and clip recorder", version)]
struct Cli {
    /// Elevate log level to debug.
    #[arg(short, long)]
    verbose: bool,

    /// Write a default CameraConfig as JSON to <config-dir>/camera_conf/<path>
    /// (filename must end in .conf) and exit.
    #[arg(short = 'c', long, value_name = "PATH")]
    create_config: Option<PathBuf>,

    /// Root config directory (default: OS config dir / onvifeye).
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(flatten)]
    overrides: CameraConfigOverrides,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if cli.verbose { "debug" } else { "info" })
        }))
        .init();

    std::panic::set_hook(Box::new(|info| {
        error!(panic = %info, "uncaught panic, exiting");
        std::process::exit(70);
    }));

    let config_root = cli
        .config_dir
        .clone()
        .unwrap_or_else(config::default_config_root);

    if let Some(name) = &cli.create_config {
        match config::create_config(&config_root, name) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "wrote default camera config");
                std::process::exit(0);
            }
            Err(e) => {
                error!(error = %e, "failed to create config");
                std::process::exit(1);
            }
        }
    }

    let mut configs = match config::discover_configs(&config_root) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load camera configuration");
            std::process::exit(1);
        }
    };
    for cfg in &mut configs {
        cfg.apply_overrides(&cli.overrides);
        if let Err(e) = cfg.validate() {
            error!(camera = cfg.id(), error = %e, "invalid camera configuration");
            std::process::exit(1);
        }
    }

    tracing::info!(cameras = configs.len(), "starting onvifeye");
    let supervisor = Supervisor::start(configs).await;
    supervisor.run_until_shutdown().await;
    std::process::exit(0);
}
