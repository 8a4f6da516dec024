// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! VideoWriter: on a fresh relevant detection, records `clip_seconds` of the
//! primary RTSP stream to a bounded-duration MPEG-TS clip in an isolated
//! ffmpeg subprocess.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::CameraConfig;
use crate::detection::{DetectionTable, HandledLedger, Seen};
use crate::external;
use crate::ffmpeg;
use crate::handler::{incident_path, inject_rtsp_credentials, prepare_incident_path, redact_rtsp_url, run_poll_loop};
use crate::onvif::SharedOnvif;
use crate::shutdown::StopSignal;

pub struct VideoWriter {
    camera_id: String,
    cfg: CameraConfig,
    table: DetectionTable,
    onvif: SharedOnvif,
}

impl VideoWriter {
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
            |snapshot| async move { self.record_incident(&snapshot).await },
        )
        .await;
    }

    async fn record_incident(&self, snapshot: &[(String, Seen)]) {
        let incident = earliest(snapshot);
        let path = incident_path(&self.cfg, "videos", incident, "mp4");

        let Ok(Some(path)) = prepare_incident_path(&path).map_err(|e| {
            error!(camera = self.camera_id, error = %e, "cannot prepare video directory")
        }) else {
            if path.exists() {
                error!(camera = self.camera_id, path = %path.display(), "video file already exists, skipping");
            }
            self.notify_video_ended().await;
            return;
        };

        let rtsp = {
            let onvif = self.onvif.read().await;
            onvif.stream_uri(&self.cfg.camera_stream_name).await
        };
        let rtsp = match rtsp {
            Ok(uri) => inject_rtsp_credentials(&uri, &self.cfg.camera_username, &self.cfg.camera_password),
            Err(e) => {
                error!(camera = self.camera_id, error = %e, "cannot resolve stream URI, skipping recording");
                self.notify_video_ended().await;
                return;
            }
        };

        info!(
            camera = self.camera_id,
            path = %path.display(),
            uri = %redact_rtsp_url(&rtsp),
            "recording clip"
        );

        let args = ffmpeg::record_args(&rtsp, self.cfg.camera_clip_seconds, &path.to_string_lossy());
        let timeout = Duration::from_secs(self.cfg.camera_clip_seconds + 30);

        // The incident is considered handled regardless of the outcome —
        // intentional, to avoid a retry storm against a permanently broken
        // encoder — but a failure is still logged at error level.
        match ffmpeg::run(&self.camera_id, &args, timeout).await {
            Ok(()) => info!(camera = self.camera_id, path = %path.display(), "clip recorded"),
            Err(e) => error!(camera = self.camera_id, error = %e, "recording failed"),
        }

        self.notify_video_ended().await;
    }

    /// Emit the synthetic `VideoEnded` event through the same dispatch path
    /// ExternalExecutor uses, if the camera targets it.
    async fn notify_video_ended(&self) {
        if !self.cfg.camera_target_events.matches("VideoEnded") {
            return;
        }
        let trigger = vec![("VideoEnded".to_string(), Seen::now())];
        if let Err(e) = external::spawn_handler(&self.cfg, &self.camera_id, &trigger).await {
            warn!(camera = self.camera_id, error = %e, "VideoEnded dispatch failed");
        }
    }
}

/// The incident time is the first-seen instant of *any* key in the
/// triggering set, i.e. the earliest.
fn earliest(snapshot: &[(String, Seen)]) -> Seen {
    *snapshot
        .iter()
        .map(|(_, s)| s)
        .min_by_key(|s| s.at)
        .expect("snapshot is non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn earliest_picks_minimum_instant_in_snapshot() {
        let t0 = Instant::now();
        let wall = chrono::Local::now();
        let a = Seen { at: t0, wall };
        let b = Seen {
            at: t0 + Duration::from_secs(5),
            wall,
        };
        let snapshot = vec![("IsCar".to_string(), b), ("IsPeople".to_string(), a)];
        assert_eq!(earliest(&snapshot).at, t0);
    }
}
