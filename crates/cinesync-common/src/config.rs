//! Persisted client settings.
//!
//! Settings are stored as pretty-printed JSON. Every field has a default so a
//! partial or missing file still loads.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::helpers::{clamp_room_size, env_bool, env_string};

pub const DEFAULT_SERVER: &str = "ws://127.0.0.1:8787/ws";
pub const DEFAULT_ROOM_WIDTH: u32 = 720;
pub const DEFAULT_ROOM_HEIGHT: u32 = 405;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub server: String,
    pub auto_connect: bool,
    pub room_width: u32,
    pub room_height: u32,

    pub player_path: String,
    pub borderless_on_top: bool,

    pub anchor_forward: f64,
    pub anchor_up: f64,
    pub avoid_enabled: bool,
    pub avoid_width: f64,
    pub avoid_height: f64,
    pub avoid_bias_up: f64,
    pub avoid_padding: f64,
    pub smoothing_tau: f64,
    pub allow_offscreen: bool,

    pub geometry_min_interval_ms: u64,
    pub geometry_min_delta_px: i32,

    /// Written back when the user accepts third-party media.
    pub consent_granted: bool,
    pub last_consented_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            auto_connect: false,
            room_width: DEFAULT_ROOM_WIDTH,
            room_height: DEFAULT_ROOM_HEIGHT,
            player_path: "mpv".to_string(),
            borderless_on_top: true,
            anchor_forward: 1.5,
            anchor_up: 1.2,
            avoid_enabled: true,
            avoid_width: 260.0,
            avoid_height: 420.0,
            avoid_bias_up: 120.0,
            avoid_padding: 16.0,
            smoothing_tau: 0.12,
            allow_offscreen: false,
            geometry_min_interval_ms: 33,
            geometry_min_delta_px: 2,
            consent_granted: false,
            last_consented_url: None,
        }
    }
}

impl Settings {
    /// Default room size after clamping whatever the file contained.
    pub fn room_size(&self) -> (u32, u32) {
        clamp_room_size(self.room_width as i64, self.room_height as i64)
    }

    /// Apply `CINESYNC_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Some(server) = env_string("CINESYNC_SERVER") {
            self.server = server;
        }
        self.auto_connect = env_bool("CINESYNC_AUTO_CONNECT", self.auto_connect);
        if let Some(player) = env_string("CINESYNC_PLAYER") {
            self.player_path = player;
        }
    }
}

/// File-backed settings shared between the shell and the session client.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Mutex<Settings>,
}

impl SettingsStore {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Settings>(&text)
                .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no settings at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            settings: Mutex::new(settings),
        })
    }

    pub fn snapshot(&self) -> Settings {
        self.lock().clone()
    }

    /// Mutate and persist in one step.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.lock();
        f(&mut guard);
        write_settings(&self.path, &guard)
    }

    fn lock(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, text)?;
    info!("saved settings to {}", path.display());
    Ok(())
}
