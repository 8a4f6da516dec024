// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-camera configuration: schema, defaults, file discovery and
//! `--create-config` support.
//!
//! Each camera is described by one `*.conf` file under
//! `<config-root>/camera_conf/`. Files are UTF-8 JSON with lax parsing
//! (trailing commas permitted) — see [`json5`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NvrError, Result};

/// `camera_target_events`: either every non-sentinel detection (`"*"`), or a
/// fixed set of event names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetEvents {
    All,
    Named(HashSet<String>),
}

impl TargetEvents {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            TargetEvents::All => true,
            TargetEvents::Named(names) => names.contains(key),
        }
    }
}

impl Default for TargetEvents {
    fn default() -> Self {
        TargetEvents::All
    }
}

impl Serialize for TargetEvents {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            TargetEvents::All => serializer.serialize_str("*"),
            TargetEvents::Named(names) => {
                let mut v: Vec<&str> = names.iter().map(String::as_str).collect();
                v.sort_unstable();
                v.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for TargetEvents {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Wildcard(String),
            List(Vec<String>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Wildcard(s) if s == "*" => Ok(TargetEvents::All),
            Repr::Wildcard(s) => Ok(TargetEvents::Named(std::iter::once(s).collect())),
            Repr::List(names) => Ok(TargetEvents::Named(names.into_iter().collect())),
        }
    }
}

/// Per-camera configuration, immutable after load. Handed read-only to every
/// per-camera component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_username")]
    pub camera_username: String,
    #[serde(default)]
    pub camera_password: String,

    /// Display/identifier used for directory and file naming; empty falls
    /// back to `camera_ip_addr`.
    #[serde(default)]
    pub camera_id: String,

    /// Reserved for future use; not interpreted by this daemon.
    #[serde(default)]
    pub camera_model: String,

    #[serde(default)]
    pub camera_ip_addr: String,
    #[serde(default = "default_onvif_port")]
    pub camera_onvif_port: String,

    #[serde(default = "default_stream_name")]
    pub camera_stream_name: String,
    #[serde(default = "default_stills_stream_name")]
    pub camera_stills_stream_name: String,

    #[serde(default = "default_clip_seconds")]
    pub camera_clip_seconds: u64,

    #[serde(default)]
    pub camera_target_events: TargetEvents,

    #[serde(default)]
    pub camera_event_exec: String,

    #[serde(default = "default_save_folder")]
    pub camera_save_folder: PathBuf,

    #[serde(default = "default_grab_stills_from_video")]
    pub camera_grab_stills_from_video: bool,
}

fn default_username() -> String {
    "tapo-admin".to_string()
}
fn default_onvif_port() -> String {
    "2020".to_string()
}
fn default_stream_name() -> String {
    "mainStream".to_string()
}
fn default_stills_stream_name() -> String {
    "jpegStream".to_string()
}
fn default_clip_seconds() -> u64 {
    30
}
fn default_grab_stills_from_video() -> bool {
    true
}
fn default_save_folder() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("onvifeye")
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_username: default_username(),
            camera_password: String::new(),
            camera_id: String::new(),
            camera_model: String::new(),
            camera_ip_addr: String::new(),
            camera_onvif_port: default_onvif_port(),
            camera_stream_name: default_stream_name(),
            camera_stills_stream_name: default_stills_stream_name(),
            camera_clip_seconds: default_clip_seconds(),
            camera_target_events: TargetEvents::All,
            camera_event_exec: String::new(),
            camera_save_folder: default_save_folder(),
            camera_grab_stills_from_video: default_grab_stills_from_video(),
        }
    }
}

impl CameraConfig {
    /// Identifier used for directory/file naming and logging.
    pub fn id(&self) -> &str {
        if self.camera_id.is_empty() {
            &self.camera_ip_addr
        } else {
            &self.camera_id
        }
    }

    /// Fatal-at-startup checks. Deliberately not run during parsing — a
    /// config file may omit `camera_ip_addr` and rely on a `--camera_ip_addr`
    /// CLI override supplied after load, so callers validate once overrides
    /// are merged in.
    pub fn validate(&self) -> Result<()> {
        if self.camera_ip_addr.is_empty() {
            return Err(NvrError::Config(
                "camera_ip_addr must not be empty".into(),
            ));
        }
        if self.camera_clip_seconds == 0 {
            return Err(NvrError::Config("camera_clip_seconds must be > 0".into()));
        }
        if !self.camera_event_exec.is_empty() {
            let p = Path::new(&self.camera_event_exec);
            if !p.is_absolute() {
                return Err(NvrError::Config(
                    "camera_event_exec must be an absolute path".into(),
                ));
            }
        }
        Ok(())
    }

    fn from_conf_str(content: &str) -> Result<Self> {
        let cfg: CameraConfig = json5::from_str(content)
            .map_err(|e| NvrError::Config(format!("Invalid camera config: {e}")))?;
        Ok(cfg)
    }
}

/// Default config root: `<OS config dir>/onvifeye`.
pub fn default_config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("onvifeye")
}

/// Load one `CameraConfig` per `*.conf` file under
/// `<config_root>/camera_conf/`. If the directory is empty or absent, a
/// single default config is returned.
pub fn discover_configs(config_root: &Path) -> Result<Vec<CameraConfig>> {
    let conf_dir = config_root.join("camera_conf");
    let mut entries: Vec<PathBuf> = Vec::new();
    if conf_dir.is_dir() {
        for entry in std::fs::read_dir(&conf_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("conf") {
                entries.push(path);
            }
        }
    }
    entries.sort();

    if entries.is_empty() {
        return Ok(vec![CameraConfig::default()]);
    }

    let mut configs = Vec::with_capacity(entries.len());
    for path in entries {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            NvrError::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        configs.push(CameraConfig::from_conf_str(&content)?);
    }
    Ok(configs)
}

/// Write a default `CameraConfig` as strict JSON to `<config_root>/camera_conf/<name>`.
/// `name` must end in `.conf`.
pub fn create_config(config_root: &Path, name: &Path) -> Result<PathBuf> {
    if name.extension().and_then(|e| e.to_str()) != Some("conf") {
        return Err(NvrError::Config(format!(
            "config file name must end in .conf: {}",
            name.display()
        )));
    }
    let conf_dir = config_root.join("camera_conf");
    std::fs::create_dir_all(&conf_dir)?;
    let target = conf_dir.join(name);
    let json = serde_json::to_string_pretty(&CameraConfig::default())
        .map_err(|e| NvrError::Config(format!("Cannot serialize default config: {e}")))?;
    std::fs::write(&target, json)?;
    Ok(target)
}

/// Per-field override coming from the CLI; `None` means "leave as loaded".
/// One field per [`CameraConfig`] field, mirroring the original source's
/// dynamic `--<field>` argparse construction — `clap` infers each flag's
/// type from the field's type the same way.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct CameraConfigOverrides {
    #[arg(long)]
    pub camera_username: Option<String>,
    #[arg(long)]
    pub camera_password: Option<String>,
    #[arg(long)]
    pub camera_id: Option<String>,
    #[arg(long)]
    pub camera_model: Option<String>,
    #[arg(long)]
    pub camera_ip_addr: Option<String>,
    #[arg(long)]
    pub camera_onvif_port: Option<String>,
    #[arg(long)]
    pub camera_stream_name: Option<String>,
    #[arg(long)]
    pub camera_stills_stream_name: Option<String>,
    #[arg(long)]
    pub camera_clip_seconds: Option<u64>,
    #[arg(long)]
    pub camera_event_exec: Option<String>,
    #[arg(long)]
    pub camera_save_folder: Option<PathBuf>,
    #[arg(long)]
    pub camera_grab_stills_from_video: Option<bool>,
}

impl CameraConfig {
    /// Apply CLI overrides in place; every `Some` field replaces the loaded
    /// value on every configured camera.
    pub fn apply_overrides(&mut self, overrides: &CameraConfigOverrides) {
        macro_rules! over {
            ($field:ident) => {
                if let Some(v) = overrides.$field.clone() {
                    self.$field = v;
                }
            };
        }
        over!(camera_username);
        over!(camera_password);
        over!(camera_id);
        over!(camera_model);
        over!(camera_ip_addr);
        over!(camera_onvif_port);
        over!(camera_stream_name);
        over!(camera_stills_stream_name);
        over!(camera_clip_seconds);
        over!(camera_event_exec);
        over!(camera_save_folder);
        over!(camera_grab_stills_from_video);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roundtrips_through_create_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_config(dir.path(), Path::new("cam1.conf")).unwrap();
        assert!(path.exists());

        let configs = discover_configs(dir.path()).unwrap();
        assert_eq!(configs.len(), 1);
        // ip_addr is empty by default, so validate() would reject it on a
        // real load path — discover_configs only parses, not validates here
        // since the created file round-trips the struct verbatim.
        assert_eq!(configs[0].camera_stream_name, "mainStream");
        assert_eq!(configs[0].camera_clip_seconds, 30);
    }

    #[test]
    fn create_config_rejects_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_config(dir.path(), Path::new("cam1")).unwrap_err();
        assert!(matches!(err, NvrError::Config(_)));
    }

    #[test]
    fn lax_json_permits_trailing_commas() {
        let content = r#"{
            "camera_ip_addr": "10.0.0.5",
            "camera_stream_name": "mainStream",
            "camera_target_events": ["IsPeople", "IsCar",],
        }"#;
        let cfg = CameraConfig::from_conf_str(content).unwrap();
        assert_eq!(cfg.camera_ip_addr, "10.0.0.5");
        assert_eq!(
            cfg.camera_target_events,
            TargetEvents::Named(["IsPeople".to_string(), "IsCar".to_string()].into())
        );
    }

    #[test]
    fn wildcard_target_events_matches_everything() {
        let cfg = CameraConfig::default();
        assert!(cfg.camera_target_events.matches("AnythingAtAll"));
    }

    #[test]
    fn empty_camera_id_falls_back_to_ip() {
        let mut cfg = CameraConfig::default();
        cfg.camera_ip_addr = "192.168.1.50".into();
        assert_eq!(cfg.id(), "192.168.1.50");
        cfg.camera_id = "front-door".into();
        assert_eq!(cfg.id(), "front-door");
    }
}
