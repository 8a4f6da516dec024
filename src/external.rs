// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! External handler dispatch: spawns `camera_event_exec` with
//! `[camera-id, "<name>/<timestamp>", ...]` for every targeted detection.
//! Shared by the `ExternalExecutor` handler component and by
//! [`crate::video::VideoWriter`]'s synthetic `VideoEnded` dispatch.

use std::path::Path;

use tracing::{error, info};

use crate::config::CameraConfig;
use crate::detection::{DetectionTable, HandledLedger, Seen};
use crate::error::{NvrError, Result};
use crate::handler::{incident_timestamp, run_poll_loop};
use crate::shutdown::StopSignal;

/// Validate the handler path is spawnable before the caller commits to it:
/// exists, is not a directory, is executable by this process.
fn check_preconditions(camera_id: &str, path: &str) -> Result<()> {
    let p = Path::new(path);
    if !p.exists() {
        return Err(NvrError::PolicyRefusal {
            id: camera_id.to_string(),
            reason: format!("handler path does not exist: {path}"),
        });
    }
    if p.is_dir() {
        return Err(NvrError::PolicyRefusal {
            id: camera_id.to_string(),
            reason: format!("handler path is a directory: {path}"),
        });
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let meta = std::fs::metadata(p).map_err(|e| NvrError::PolicyRefusal {
            id: camera_id.to_string(),
            reason: e.to_string(),
        })?;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(NvrError::PolicyRefusal {
                id: camera_id.to_string(),
                reason: format!("handler path is not executable: {path}"),
            });
        }
    }
    Ok(())
}

/// Spawn `camera_event_exec` with one positional per triggered event. A
/// no-op (not an error) when `camera_event_exec` is empty. Detached:
/// exit status is never observed.
pub async fn spawn_handler(
    cfg: &CameraConfig,
    camera_id: &str,
    triggers: &[(String, Seen)],
) -> Result<()> {
    if cfg.camera_event_exec.is_empty() || triggers.is_empty() {
        return Ok(());
    }
    check_preconditions(camera_id, &cfg.camera_event_exec)?;

    let mut args: Vec<String> = vec![camera_id.to_string()];
    for (name, seen) in triggers {
        args.push(format!("{name}/{}", incident_timestamp(*seen)));
    }

    match tokio::process::Command::new(&cfg.camera_event_exec)
        .args(&args)
        .spawn()
    {
        Ok(_child) => {
            info!(camera_id, exe = %cfg.camera_event_exec, argv = ?args, "external handler spawned");
            Ok(())
        }
        Err(e) => {
            error!(camera_id, exe = %cfg.camera_event_exec, error = %e, "failed to spawn external handler");
            Err(NvrError::PolicyRefusal {
                id: camera_id.to_string(),
                reason: format!("failed to spawn external handler: {e}"),
            })
        }
    }
}

/// Per-camera component: polls the detection table and dispatches the
/// configured external handler for every fresh, targeted trigger.
pub struct ExternalExecutor {
    camera_id: String,
    cfg: CameraConfig,
    table: DetectionTable,
}

impl ExternalExecutor {
    pub fn new(camera_id: String, cfg: CameraConfig, table: DetectionTable) -> Self {
        Self {
            camera_id,
            cfg,
            table,
        }
    }

    pub async fn run(self, stop: StopSignal) {
        let mut ledger = HandledLedger::new();
        run_poll_loop(
            &self.table,
            &self.cfg.camera_target_events,
            &mut ledger,
            &stop,
            |snapshot| async move {
                if let Err(e) = spawn_handler(&self.cfg, &self.camera_id, &snapshot).await {
                    error!(camera = self.camera_id, error = %e, "external handler dispatch failed");
                }
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Seen;

    #[tokio::test]
    async fn refuses_nonexistent_handler_path() {
        let mut cfg = CameraConfig::default();
        cfg.camera_event_exec = "/no/such/handler".into();
        let err = spawn_handler(&cfg, "cam1", &[("IsPeople".into(), Seen::now())])
            .await
            .unwrap_err();
        assert!(matches!(err, NvrError::PolicyRefusal { .. }));
    }

    #[tokio::test]
    async fn empty_exec_path_is_a_noop() {
        let cfg = CameraConfig::default();
        let result = spawn_handler(&cfg, "cam1", &[("IsPeople".into(), Seen::now())]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn spawns_real_executable_with_expected_argv() {
        let mut cfg = CameraConfig::default();
        cfg.camera_event_exec = "/bin/echo".into();
        let seen = Seen::now();
        let result = spawn_handler(&cfg, "cam1", &[("IsPeople".into(), seen)]).await;
        assert!(result.is_ok());
    }
}
