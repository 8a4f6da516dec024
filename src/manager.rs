// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Supervisor: loads every configured camera, spawns its task group,
//! installs SIGINT/SIGHUP handlers, and waits for a clean shutdown.
//! Each camera's task group retries its own ONVIF connection internally;
//! the supervisor never respawns a group once started.

use std::io::IsTerminal;
use std::time::Duration;

use nix::sys::termios::{self, Termios};
use tracing::{error, info, warn};

use crate::camera::CameraGroup;
use crate::config::CameraConfig;
use crate::shutdown::StopSignal;

/// How long to wait for task groups to drain after `stop_requested` before
/// giving up and returning anyway.
const DRAIN_WINDOW: Duration = Duration::from_secs(5);

pub struct Supervisor {
    groups: Vec<CameraGroup>,
    stop: StopSignal,
    tty_state: Option<Termios>,
}

impl Supervisor {
    /// Connect every configured camera and spawn its task group. A camera
    /// that fails its initial handshake is logged and skipped — it does not
    /// abort startup for the rest of the fleet.
    pub async fn start(configs: Vec<CameraConfig>) -> Self {
        let stop = StopSignal::new();
        let tty_state = snapshot_tty();

        let mut groups = Vec::with_capacity(configs.len());
        for cfg in configs {
            let camera_id = cfg.id().to_string();
            match CameraGroup::spawn(cfg, stop.clone()).await {
                Ok(group) => groups.push(group),
                Err(e) => error!(camera = camera_id, error = %e, "camera failed to start, skipping"),
            }
        }

        Self { groups, stop, tty_state }
    }

    /// Wait for a shutdown signal (SIGINT or SIGHUP), then set `stop` on
    /// every component and wait up to [`DRAIN_WINDOW`] for task groups to
    /// exit before restoring TTY state and returning.
    pub async fn run_until_shutdown(self) {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, draining camera task groups");
        self.stop.set();

        let join_all = async {
            for group in self.groups {
                group.join().await;
            }
        };

        if tokio::time::timeout(DRAIN_WINDOW, join_all).await.is_err() {
            warn!("camera task groups did not drain within the grace window, exiting anyway");
        }

        restore_tty(self.tty_state);
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGINT handler");
            return;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot install SIGHUP handler");
            return;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT"),
        _ = sighup.recv() => info!("received SIGHUP"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Snapshot the controlling terminal's attributes, if stdin is a tty.
/// ffmpeg occasionally leaves the terminal in raw mode after an abrupt kill;
/// this lets the supervisor restore it on shutdown.
fn snapshot_tty() -> Option<Termios> {
    if !std::io::stdin().is_terminal() {
        return None;
    }
    match termios::tcgetattr(std::io::stdin()) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "cannot snapshot TTY state");
            None
        }
    }
}

fn restore_tty(state: Option<Termios>) {
    let Some(state) = state else { return };
    if let Err(e) = termios::tcsetattr(std::io::stdin(), termios::SetArg::TCSANOW, &state) {
        warn!(error = %e, "cannot restore TTY state");
    }
}
