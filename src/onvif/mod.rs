// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Thin ONVIF session for one camera: service discovery, PullPoint
//! subscription lifecycle, profile/stream-URI lookup.

mod client;

use std::sync::Arc;

pub use client::{NotificationMessage, OnvifClient, PullOutcome, PullPointSession};

/// Shared handle to one camera's [`OnvifClient`]. The puller holds the
/// write lock while refreshing service addresses and pulling messages; media
/// handlers take a brief read lock only to resolve a stream URI.
pub type SharedOnvif = Arc<tokio::sync::RwLock<OnvifClient>>;

