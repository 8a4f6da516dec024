// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use std::time::Duration;

use onvif::soap::{self, client::AuthType};
use schema::{devicemgmt, event, media, onvif as onvif_types};
use tracing::{debug, warn};
use url::Url;

use crate::error::{NvrError, Result};

/// Decoded `Name`/`Value` pair from a PullPoint `SimpleItem`.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub name: String,
    pub value: String,
}

/// Result of one `PullMessages` call — distinguishes "nothing arrived before
/// the timeout" (expected, cheap) from a transport error (triggers
/// reconnect).
pub enum PullOutcome {
    Messages(Vec<NotificationMessage>),
    NoneReady,
}

/// Handle to an open PullPoint subscription: the dedicated client built
/// against the subscription manager's advertised address.
pub struct PullPointSession {
    client: soap::client::Client,
}

/// Session to one camera's ONVIF services. Owns credentials and rediscovers
/// service addresses on demand (cameras occasionally move their event or
/// media endpoints across reboots/firmware updates).
pub struct OnvifClient {
    camera_id: String,
    base_uri: Url,
    devicemgmt: soap::client::Client,
    event: Option<soap::client::Client>,
    media: Option<soap::client::Client>,
    credentials: Option<soap::client::Credentials>,
}

impl OnvifClient {
    /// Connect to `ip:port` and discover its event/media services.
    pub async fn connect(
        camera_id: &str,
        ip: &str,
        port: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let base_uri = Url::parse(&format!("http://{ip}:{port}/"))
            .map_err(|e| onvif_err(camera_id, e))?;
        let devicemgmt_uri = base_uri
            .join("onvif/device_service")
            .map_err(|e| onvif_err(camera_id, e))?;

        let credentials = if username.is_empty() && password.is_empty() {
            None
        } else {
            Some(soap::client::Credentials {
                username: username.to_string(),
                password: password.to_string(),
            })
        };

        let devicemgmt = soap::client::ClientBuilder::new(&devicemgmt_uri)
            .credentials(credentials.clone())
            .auth_type(AuthType::Any)
            .build();

        let mut client = OnvifClient {
            camera_id: camera_id.to_string(),
            base_uri,
            devicemgmt,
            event: None,
            media: None,
            credentials,
        };
        client.ensure_addresses().await?;
        Ok(client)
    }

    /// Refresh service addresses via `GetServices`. Called on every
    /// `Connecting` entry, not just once at startup.
    pub async fn ensure_addresses(&mut self) -> Result<()> {
        let services = devicemgmt::get_services(&self.devicemgmt, &Default::default())
            .await
            .map_err(|e| self.transport_err(e))?;

        for service in &services.service {
            let service_url =
                Url::parse(&service.x_addr).map_err(|e| onvif_err(&self.camera_id, e))?;
            let svc_client = soap::client::ClientBuilder::new(&service_url)
                .credentials(self.credentials.clone())
                .auth_type(AuthType::Any)
                .build();
            match service.namespace.as_str() {
                "http://www.onvif.org/ver10/events/wsdl" => self.event = Some(svc_client),
                "http://www.onvif.org/ver10/media/wsdl" => self.media = Some(svc_client),
                other => debug!(camera = self.camera_id, namespace = other, "ignoring unused ONVIF service"),
            }
        }

        if self.event.is_none() {
            return Err(NvrError::Onvif {
                id: self.camera_id.clone(),
                reason: "camera does not advertise an events service".into(),
            });
        }
        Ok(())
    }

    /// Create a PullPoint subscription with termination time `interval`.
    pub async fn open_pullpoint(&self, interval: Duration) -> Result<PullPointSession> {
        let event_client = self.event.as_ref().ok_or_else(|| NvrError::Onvif {
            id: self.camera_id.clone(),
            reason: "events service not available".into(),
        })?;

        let resp = event::create_pull_point_subscription(
            event_client,
            &event::CreatePullPointSubscription {
                initial_termination_time: Some(iso8601_duration(interval)),
            },
        )
        .await
        .map_err(|e| self.transport_err(e))?;

        let manager_uri = Url::parse(&resp.subscription_reference.address)
            .map_err(|e| onvif_err(&self.camera_id, e))?;
        let manager_uri = if manager_uri.host().is_some() {
            manager_uri
        } else {
            // Some cameras return a relative reference; resolve against the
            // device's base URI rather than reject the subscription.
            self.base_uri
                .join(&resp.subscription_reference.address)
                .map_err(|e| onvif_err(&self.camera_id, e))?
        };

        let client = soap::client::ClientBuilder::new(&manager_uri)
            .credentials(self.credentials.clone())
            .auth_type(AuthType::Any)
            .build();

        Ok(PullPointSession { client })
    }

    /// Pull up to `limit` queued messages, waiting up to `timeout` for at
    /// least one to arrive.
    pub async fn pull_messages(
        &self,
        session: &PullPointSession,
        limit: u32,
        timeout: Duration,
    ) -> Result<PullOutcome> {
        let request = event::PullMessages {
            timeout: iso8601_duration(timeout),
            message_limit: limit as i32,
        };

        // Guard against a camera that doesn't honor its own Timeout element.
        let call = event::pull_messages(&session.client, &request);
        let resp = tokio::time::timeout(timeout + Duration::from_secs(10), call)
            .await
            .map_err(|_| self.transport_err_msg("PullMessages did not return within the guard timeout"))?
            .map_err(|e| self.transport_err(e))?;

        if resp.notification_message.is_empty() {
            return Ok(PullOutcome::NoneReady);
        }

        let messages = resp
            .notification_message
            .into_iter()
            .flat_map(|nm| {
                nm.message
                    .data
                    .map(|d| d.simple_item)
                    .unwrap_or_default()
            })
            .map(|item| NotificationMessage {
                name: item.name,
                value: item.value,
            })
            .collect();

        Ok(PullOutcome::Messages(messages))
    }

    /// Close a PullPoint subscription. Secondary errors are logged and
    /// swallowed — teardown must never starve reconnection.
    pub async fn close_pullpoint(&self, session: PullPointSession) {
        if let Err(e) = event::unsubscribe(&session.client, &event::Unsubscribe {}).await {
            warn!(camera = self.camera_id, error = %e, "Unsubscribe failed during teardown, ignoring");
        }
    }

    /// Resolve the RTSP URI for a named stream profile (e.g. `mainStream`),
    /// falling back to the first profile if no exact name match exists.
    pub async fn stream_uri(&self, profile_name: &str) -> Result<String> {
        let media_client = self.media.as_ref().ok_or_else(|| NvrError::Onvif {
            id: self.camera_id.clone(),
            reason: "media service not available".into(),
        })?;

        let profiles = media::get_profiles(media_client, &Default::default())
            .await
            .map_err(|e| self.transport_err(e))?;

        let profile = profiles
            .profiles
            .iter()
            .find(|p| p.name.0 == profile_name)
            .or_else(|| profiles.profiles.first())
            .ok_or_else(|| NvrError::Onvif {
                id: self.camera_id.clone(),
                reason: format!("camera has no media profile named '{profile_name}'"),
            })?;

        let resp = media::get_stream_uri(
            media_client,
            &media::GetStreamUri {
                profile_token: onvif_types::ReferenceToken(profile.token.0.clone()),
                stream_setup: onvif_types::StreamSetup {
                    stream: onvif_types::StreamType::RtpUnicast,
                    transport: onvif_types::Transport {
                        protocol: onvif_types::TransportProtocol::Rtsp,
                        tunnel: vec![],
                    },
                },
            },
        )
        .await
        .map_err(|e| self.transport_err(e))?;

        Ok(resp.media_uri.uri)
    }

    fn transport_err(&self, e: impl std::fmt::Display) -> NvrError {
        NvrError::Transport {
            id: self.camera_id.clone(),
            reason: e.to_string(),
        }
    }

    fn transport_err_msg(&self, msg: &str) -> NvrError {
        NvrError::Transport {
            id: self.camera_id.clone(),
            reason: msg.to_string(),
        }
    }
}

fn onvif_err(camera_id: &str, e: impl std::fmt::Display) -> NvrError {
    NvrError::Onvif {
        id: camera_id.to_string(),
        reason: e.to_string(),
    }
}

/// Format a `Duration` as an ISO-8601 duration (`PT60S`), the wire form ONVIF
/// expects for `Timeout`/`InitialTerminationTime`.
fn iso8601_duration(d: Duration) -> String {
    format!("PT{}S", d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso8601_duration_formats_seconds() {
        assert_eq!(iso8601_duration(Duration::from_secs(60)), "PT60S");
        assert_eq!(iso8601_duration(Duration::from_secs(5)), "PT5S");
    }
}
