// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera component bundle: wires one [`CameraConfig`] into its
//! `OnvifClient`, `DetectionTable`, `NotificationPuller` and the handful of
//! `EventHandler` tasks (`VideoWriter`, `ImageWriter`, `ExternalExecutor`)
//! that share it. One task group per camera, rather than one shared loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::CameraConfig;
use crate::detection::DetectionTable;
use crate::error::Result;
use crate::image::ImageWriter;
use crate::onvif::{OnvifClient, SharedOnvif};
use crate::puller::NotificationPuller;
use crate::shutdown::StopSignal;
use crate::video::VideoWriter;
use crate::external::ExternalExecutor;

/// Detections older than this are evicted; also the PullMessages timeout
/// (the two must not drift apart).
const DETECTION_EXPIRY: Duration = Duration::from_secs(60);

/// One camera's task group: the puller plus whichever handlers this
/// camera's config actually needs.
pub struct CameraGroup {
    pub camera_id: String,
    tasks: Vec<JoinHandle<()>>,
}

impl CameraGroup {
    /// Connect to the camera and spawn its full task group. Returns once the
    /// initial ONVIF handshake (service discovery) has succeeded; the tasks
    /// themselves keep running until `stop` is set.
    pub async fn spawn(cfg: CameraConfig, stop: StopSignal) -> Result<Self> {
        let camera_id = cfg.id().to_string();

        let onvif = OnvifClient::connect(
            &camera_id,
            &cfg.camera_ip_addr,
            &cfg.camera_onvif_port,
            &cfg.camera_username,
            &cfg.camera_password,
        )
        .await?;
        let onvif: SharedOnvif = Arc::new(tokio::sync::RwLock::new(onvif));

        let table = DetectionTable::new();
        let mut tasks = Vec::new();

        let puller = NotificationPuller::new(camera_id.clone(), onvif.clone(), table.clone(), DETECTION_EXPIRY);
        tasks.push(tokio::spawn(puller.run(stop.clone())));

        // camera_stream_name always carries a default, so VideoWriter is
        // effectively always instantiated.
        if !cfg.camera_stream_name.is_empty() {
            let writer = VideoWriter::new(camera_id.clone(), cfg.clone(), table.clone(), onvif.clone());
            tasks.push(tokio::spawn(writer.run(stop.clone())));
        }

        // When the stills stream is unset, no ImageWriter is spawned at all.
        if !cfg.camera_stills_stream_name.is_empty() {
            let writer = ImageWriter::new(camera_id.clone(), cfg.clone(), table.clone(), onvif.clone());
            tasks.push(tokio::spawn(writer.run(stop.clone())));
        }

        if !cfg.camera_event_exec.is_empty() {
            let executor = ExternalExecutor::new(camera_id.clone(), cfg.clone(), table.clone());
            tasks.push(tokio::spawn(executor.run(stop.clone())));
        }

        info!(camera = camera_id, tasks = tasks.len(), "camera task group started");

        Ok(Self { camera_id, tasks })
    }

    /// Wait for every task in the group to finish (normally only after
    /// `stop` is set).
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(camera = self.camera_id, error = %e, "camera task panicked");
            }
        }
    }
}
