// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! ImageWriter: on a fresh relevant detection, saves a single still JPEG.
//! Two modes, chosen by `camera_grab_stills_from_video`:
//!
//! - `true`: wait for the VideoWriter's clip for the same incident to land,
//!   then extract frame zero from it.
//! - `false`: grab a frame directly off `camera_stills_stream_name`.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::CameraConfig;
use crate::detection::{DetectionTable, HandledLedger, Seen};
use crate::ffmpeg;
use crate::handler::{incident_path, inject_rtsp_credentials, prepare_incident_path, redact_rtsp_url, run_poll_loop};
use crate::onvif::SharedOnvif;
use crate::shutdown::StopSignal;

/// Initial wait before the first look for the companion video clip.
const CLIP_WAIT_INITIAL: Duration = Duration::from_secs(4);
/// Additional 1s polls if the clip hasn't landed yet.
const CLIP_WAIT_RETRIES: u32 = 4;

pub struct ImageWriter {
    camera_id: String,
    cfg: CameraConfig,
    table: DetectionTable,
    onvif: SharedOnvif,
}

impl ImageWriter {
    pub fn new(camera_id: String, cfg: CameraConfig, table: DetectionTable, onvif: SharedOnvif) -> Self {
        Self {
            camera_id,
            cfg,
            table,
            onvif,
        }
    }

    pub async fn run(self, stop: StopSignal) {
        let mut ledger = HandledLedger::new();
        run_poll_loop(
            &self.table,
            &self.cfg.camera_target_events,
            &mut ledger,
            &stop,
            |snapshot| async move { self.save_still(&snapshot).await },
        )
        .await;
    }

    async fn save_still(&self, snapshot: &[(String, Seen)]) {
        let incident = earliest(snapshot);
        let path = incident_path(&self.cfg, "images", incident, "jpg");

        let Ok(Some(path)) = prepare_incident_path(&path).map_err(|e| {
            error!(camera = self.camera_id, error = %e, "cannot prepare image directory")
        }) else {
            if path.exists() {
                warn!(camera = self.camera_id, path = %path.display(), "still already exists, skipping");
            }
            return;
        };

        let source = if self.cfg.camera_grab_stills_from_video {
            wait_for_clip(&self.camera_id, &self.cfg, incident).await
        } else {
            self.stream_grab_source().await
        };

        let Some(source) = source else {
            error!(camera = self.camera_id, "no still source available, skipping");
            return;
        };

        let args = ffmpeg::still_args(&source, &path.to_string_lossy());
        match ffmpeg::run(&self.camera_id, &args, Duration::from_secs(15)).await {
            Ok(()) => info!(camera = self.camera_id, path = %path.display(), "still saved"),
            Err(e) => error!(camera = self.camera_id, error = %e, "still extraction failed"),
        }
    }

    async fn stream_grab_source(&self) -> Option<String> {
        let rtsp = {
            let onvif = self.onvif.read().await;
            onvif.stream_uri(&self.cfg.camera_stills_stream_name).await
        };
        match rtsp {
            Ok(uri) => {
                let uri = inject_rtsp_credentials(&uri, &self.cfg.camera_username, &self.cfg.camera_password);
                info!(camera = self.camera_id, uri = %redact_rtsp_url(&uri), "grabbing still from stream");
                Some(uri)
            }
            Err(e) => {
                error!(camera = self.camera_id, error = %e, "cannot resolve stills stream URI");
                None
            }
        }
    }
}

/// Poll for the VideoWriter's clip for this exact incident. Returns the
/// clip path once it exists, or `None` after the retry budget is spent.
async fn wait_for_clip(camera_id: &str, cfg: &CameraConfig, incident: Seen) -> Option<String> {
    let clip_path = incident_path(cfg, "videos", incident, "mp4");

    tokio::time::sleep(CLIP_WAIT_INITIAL).await;
    if clip_path.exists() {
        return Some(clip_path.to_string_lossy().into_owned());
    }

    for _ in 0..CLIP_WAIT_RETRIES {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if clip_path.exists() {
            return Some(clip_path.to_string_lossy().into_owned());
        }
    }

    warn!(
        camera_id,
        path = %clip_path.display(),
        "companion video clip did not appear in time"
    );
    None
}

fn earliest(snapshot: &[(String, Seen)]) -> Seen {
    *snapshot
        .iter()
        .map(|(_, s)| s)
        .min_by_key(|s| s.at)
        .expect("snapshot is non-empty")
}
