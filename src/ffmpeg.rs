// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! ffmpeg subprocess harness. Every invocation is a genuine child OS process
//! (`kill_on_drop`), never a thread — a wedged or crashed encoder must not
//! be able to stall or crash the daemon's async executor.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{NvrError, Result};

/// Run `ffmpeg` with `args` and wait up to `timeout`. On timeout the child is
/// killed. Non-zero exit and timeout are both reported as
/// [`NvrError::Encoder`]; stderr is captured and included for diagnosis.
pub async fn run(camera_id: &str, args: &[String], timeout: Duration) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(args);
    cmd.kill_on_drop(true);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| NvrError::Encoder {
        id: camera_id.to_string(),
        reason: format!("failed to spawn ffmpeg: {e}"),
    })?;

    let stderr = child.stderr.take();
    let camera_id_owned = camera_id.to_string();
    let stderr_task = stderr.map(|stderr| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: Vec<String> = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(camera = camera_id_owned, "ffmpeg: {line}");
                tail.push(line);
                if tail.len() > 20 {
                    tail.remove(0);
                }
            }
            tail.join("\n")
        })
    });

    let wait = child.wait();
    let status = match tokio::time::timeout(timeout, wait).await {
        Ok(status) => status.map_err(|e| NvrError::Encoder {
            id: camera_id.to_string(),
            reason: format!("failed to wait on ffmpeg: {e}"),
        })?,
        Err(_) => {
            warn!(camera = camera_id, ?timeout, "ffmpeg did not finish in time, killing");
            let _ = child.kill().await;
            return Err(NvrError::Encoder {
                id: camera_id.to_string(),
                reason: format!("timed out after {timeout:?}"),
            });
        }
    };

    let tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if !status.success() {
        return Err(NvrError::Encoder {
            id: camera_id.to_string(),
            reason: format!("exited with {status}: {tail}"),
        });
    }

    Ok(())
}

/// Build the low-latency MPEG-TS recording command line for `clip_seconds`
/// of `rtsp_url`, writing to `output`.
pub fn record_args(rtsp_url: &str, clip_seconds: u64, output: &str) -> Vec<String> {
    vec![
        "-y".into(),
        "-rtsp_transport".into(),
        "tcp".into(),
        "-i".into(),
        rtsp_url.into(),
        "-t".into(),
        clip_seconds.to_string(),
        "-f".into(),
        "mpegts".into(),
        "-vcodec".into(),
        "h264".into(),
        "-acodec".into(),
        "aac".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-tune".into(),
        "zerolatency".into(),
        output.into(),
    ]
}

/// Build the single-frame JPEG extraction command line, either from an
/// already-recorded clip (`input` = local path) or directly off an RTSP
/// stream (`input` = `rtsp://...`).
pub fn still_args(input: &str, output: &str) -> Vec<String> {
    let mut args = vec!["-y".into()];
    if input.starts_with("rtsp://") {
        args.push("-rtsp_transport".into());
        args.push("tcp".into());
    }
    args.extend([
        "-i".into(),
        input.into(),
        "-ss".into(),
        "0".into(),
        "-vframes".into(),
        "1".into(),
        "-qscale:v".into(),
        "2".into(),
        output.into(),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_args_use_low_latency_profile() {
        let args = record_args("rtsp://cam/stream1", 30, "/tmp/out.mp4");
        assert!(args.windows(2).any(|w| w == ["-rtsp_transport", "tcp"]));
        assert!(args.windows(2).any(|w| w == ["-preset", "ultrafast"]));
        assert!(args.windows(2).any(|w| w == ["-tune", "zerolatency"]));
        assert!(args.windows(2).any(|w| w == ["-t", "30"]));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
    }

    #[test]
    fn still_args_force_tcp_only_for_rtsp_input() {
        let from_stream = still_args("rtsp://cam/stills", "/tmp/still.jpg");
        assert!(from_stream.windows(2).any(|w| w == ["-rtsp_transport", "tcp"]));

        let from_file = still_args("/tmp/clip.mp4", "/tmp/still.jpg");
        assert!(!from_file.windows(2).any(|w| w == ["-rtsp_transport", "tcp"]));
        assert!(from_file.windows(2).any(|w| w == ["-qscale:v", "2"]));
    }
}
