use std::fmt;
use std::time::Duration;

use cinesync_common::config::{DEFAULT_ROOM_HEIGHT, DEFAULT_ROOM_WIDTH, DEFAULT_SERVER};
use cinesync_common::Settings;

pub const STATS_INTERVAL: Duration = Duration::from_secs(10);
pub const STATE_THROTTLE: Duration = Duration::from_millis(50);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Websocket address of the sync server.
    pub server: String,
    pub default_room_width: u32,
    pub default_room_height: u32,
    pub stats_interval: Duration,
    pub state_throttle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            default_room_width: DEFAULT_ROOM_WIDTH,
            default_room_height: DEFAULT_ROOM_HEIGHT,
            stats_interval: STATS_INTERVAL,
            state_throttle: STATE_THROTTLE,
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        let (w, h) = settings.room_size();
        Self {
            server: settings.server.clone(),
            default_room_width: w,
            default_room_height: h,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Local view of the room's playback.
///
/// `position_seconds` is a checkpoint valid as of `server_time_ms`; this layer
/// never extrapolates it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    pub url: Option<String>,
    pub media_id: Option<String>,
    pub is_playing: bool,
    pub position_seconds: f64,
    pub server_time_ms: i64,
    pub presence: u32,
    pub ready_count: u32,
    pub ready_total: u32,
    pub room_width_px: u32,
    pub room_height_px: u32,
}

impl RoomState {
    pub fn new(room_width_px: u32, room_height_px: u32) -> Self {
        Self {
            url: None,
            media_id: None,
            is_playing: false,
            position_seconds: 0.0,
            server_time_ms: 0,
            presence: 0,
            ready_count: 0,
            ready_total: 0,
            room_width_px,
            room_height_px,
        }
    }

    pub(crate) fn set_readiness(&mut self, ready_count: u32, ready_total: u32) {
        self.ready_total = ready_total;
        self.ready_count = ready_count.min(ready_total);
    }

    pub(crate) fn set_position(&mut self, seconds: f64) {
        self.position_seconds = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub room_code: Option<String>,
    pub is_host: bool,
}

/// Media waiting on the user's go-ahead before the player may open it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConsent {
    pub url: String,
    pub media_id: Option<String>,
    pub start_seconds: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub current: u32,
    pub peak: u32,
}

/// Notifications raised by the session client, delivered in production order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged(ConnectionStatus),
    /// User-facing text: transport errors, validation warnings, server errors.
    Notice(String),
    RoomChanged(SessionIdentity),
    /// First sighting of this media this session; nothing may auto-start.
    ConsentNeeded(PendingConsent),
    /// Media already consented to; the shell may (re)start the player directly.
    MediaPrepared {
        url: String,
        media_id: Option<String>,
        start_seconds: f64,
    },
    ConsentResolved {
        accepted: bool,
        consent: PendingConsent,
    },
    StateChanged(RoomState),
    LayoutChanged {
        width: u32,
        height: u32,
    },
    PresenceChanged {
        presence: u32,
        ready_count: u32,
        ready_total: u32,
    },
    StatsChanged(ConnectionStats),
}

/// Screen rectangle of the player window, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl WindowGeometry {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// X11-style `WxH+X+Y`, as the player expects it.
    pub fn to_geometry_string(&self) -> String {
        format!("{}x{}+{}+{}", self.w, self.h, self.x, self.y)
    }
}
