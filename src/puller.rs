// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! NotificationPuller: drives one camera's PullPoint subscription lifecycle
//! and decodes `NotificationMessage` payloads into `DetectionTable` entries.
//! One `async fn run` loop per camera, state held in a plain enum rather
//! than a generic state-machine framework.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::detection::{DetectionTable, Seen, INACTIVE_SUFFIX};
use crate::onvif::{PullOutcome, PullPointSession, SharedOnvif};
use crate::shutdown::StopSignal;

/// Message-count cap per `PullMessages` call.
const MESSAGE_LIMIT: u32 = 5000;
/// Fixed backoff after a transport error while (re)connecting.
const RETRY_WAIT: Duration = Duration::from_secs(5);
/// Sleep when a `PullMessages` call returns with nothing queued.
const NO_MESSAGES_SLEEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullerState {
    Disconnected,
    Connecting,
    Listening,
    Decoding,
    Evicting,
    Teardown,
    Stopped,
}

pub struct NotificationPuller {
    camera_id: String,
    onvif: SharedOnvif,
    table: DetectionTable,
    expiry: Duration,
}

impl NotificationPuller {
    pub fn new(camera_id: String, onvif: SharedOnvif, table: DetectionTable, expiry: Duration) -> Self {
        Self {
            camera_id,
            onvif,
            table,
            expiry,
        }
    }

    pub async fn run(mut self, stop: StopSignal) {
        let mut state = PullerState::Disconnected;
        let mut session: Option<PullPointSession> = None;
        let mut warned_this_outage = false;
        let mut pending: Vec<(String, String)> = Vec::new();

        loop {
            if stop.is_set() && !matches!(state, PullerState::Teardown) {
                state = PullerState::Teardown;
            }

            state = match state {
                PullerState::Disconnected => PullerState::Connecting,

                PullerState::Connecting => {
                    match self.connect().await {
                        Ok(s) => {
                            session = Some(s);
                            warned_this_outage = false;
                            PullerState::Listening
                        }
                        Err(e) => {
                            if !warned_this_outage {
                                warn!(camera = self.camera_id, error = %e, "ONVIF connect failed, retrying");
                                warned_this_outage = true;
                            } else {
                                debug!(camera = self.camera_id, error = %e, "ONVIF connect still failing");
                            }
                            tokio::time::sleep(RETRY_WAIT).await;
                            PullerState::Connecting
                        }
                    }
                }

                PullerState::Listening => {
                    let Some(s) = session.as_ref() else {
                        warn!(camera = self.camera_id, "no active subscription in Listening, reconnecting");
                        state = PullerState::Connecting;
                        continue;
                    };
                    let onvif = self.onvif.read().await;
                    match onvif.pull_messages(s, MESSAGE_LIMIT, self.expiry).await {
                        Ok(PullOutcome::Messages(messages)) => {
                            pending = messages.into_iter().map(|m| (m.name, m.value)).collect();
                            PullerState::Decoding
                        }
                        Ok(PullOutcome::NoneReady) => {
                            drop(onvif);
                            tokio::time::sleep(NO_MESSAGES_SLEEP).await;
                            PullerState::Evicting
                        }
                        Err(e) => {
                            warn!(camera = self.camera_id, error = %e, "PullMessages failed, tearing down");
                            PullerState::Teardown
                        }
                    }
                }

                PullerState::Decoding => {
                    for (name, value) in pending.drain(..) {
                        let key = if value == "true" {
                            name
                        } else {
                            format!("{name}{INACTIVE_SUFFIX}")
                        };
                        self.table.insert_if_absent(key, Seen::now());
                    }
                    PullerState::Evicting
                }

                PullerState::Evicting => {
                    self.table.evict_older_than(self.expiry, std::time::Instant::now());
                    if stop.is_set() {
                        PullerState::Teardown
                    } else {
                        PullerState::Listening
                    }
                }

                PullerState::Teardown => {
                    if let Some(s) = session.take() {
                        let onvif = self.onvif.read().await;
                        onvif.close_pullpoint(s).await;
                    }
                    if stop.is_set() {
                        PullerState::Stopped
                    } else {
                        PullerState::Disconnected
                    }
                }

                PullerState::Stopped => break,
            };
        }

        info!(camera = self.camera_id, "notification puller stopped");
    }

    async fn connect(&mut self) -> crate::error::Result<PullPointSession> {
        let mut onvif = self.onvif.write().await;
        onvif.ensure_addresses().await?;
        onvif.open_pullpoint(self.expiry).await
    }
}
