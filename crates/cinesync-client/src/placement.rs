//! Screen placement of the player window around a moving anchor.
//!
//! Each tick resolves an anchor, projects it, steers the window clear of the
//! avatar rectangle, clamps it to the viewport and low-pass filters the result.
//! Nothing here blocks or performs I/O.

use cinesync_common::Settings;
pub use glam::{DVec2, DVec3};

use crate::types::WindowGeometry;

/// Where a window goes when the anchor cannot be projected.
pub const OFFSCREEN_PARK: f64 = -10_000.0;
/// Per-pixel overlap penalty, in the same units as distance.
pub const OVERLAP_WEIGHT: f64 = 10_000.0;
const MIN_TAU: f64 = 1e-3;
const MIN_DT: f64 = 1e-4;

/// Axis-aligned screen rectangle; `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn overlap_area(&self, other: &Rect) -> f64 {
        let ix = (self.x + self.w).min(other.x + other.w) - self.x.max(other.x);
        let iy = (self.y + self.h).min(other.y + other.h) - self.y.max(other.y);
        if ix <= 0.0 || iy <= 0.0 {
            0.0
        } else {
            ix * iy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Anchor {
    World(DVec3),
    /// Already projected by the host.
    Screen(DVec2),
}

/// Host lookup from world space to screen pixels.
pub trait Projector {
    /// `None` when the point is behind the camera or outside the frustum.
    fn world_to_screen(&self, point: DVec3) -> Option<DVec2>;
    fn viewport(&self) -> DVec2;
}

/// Treats world `(x, y)` as screen pixels; points with negative `z` are behind the camera.
#[derive(Debug, Clone, Copy)]
pub struct FlatProjector {
    pub viewport: DVec2,
}

impl Projector for FlatProjector {
    fn world_to_screen(&self, point: DVec3) -> Option<DVec2> {
        (point.z >= 0.0).then_some(DVec2::new(point.x, point.y))
    }

    fn viewport(&self) -> DVec2 {
        self.viewport
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPose {
    pub position: DVec3,
    pub forward: DVec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementConfig {
    pub forward_offset: f64,
    pub up_offset: f64,
    pub avoid_enabled: bool,
    pub avoid_width: f64,
    pub avoid_height: f64,
    pub avoid_bias_up: f64,
    pub avoid_padding: f64,
    pub smoothing_tau: f64,
    pub allow_offscreen: bool,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for PlacementConfig {
    fn from(s: &Settings) -> Self {
        Self {
            forward_offset: s.anchor_forward,
            up_offset: s.anchor_up,
            avoid_enabled: s.avoid_enabled,
            avoid_width: s.avoid_width,
            avoid_height: s.avoid_height,
            avoid_bias_up: s.avoid_bias_up,
            avoid_padding: s.avoid_padding,
            smoothing_tau: s.smoothing_tau,
            allow_offscreen: s.allow_offscreen,
        }
    }
}

/// Per-frame inputs supplied by the host.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput {
    pub pose: Option<PlayerPose>,
    pub player_screen: Option<DVec2>,
    pub size: DVec2,
    pub dt: f64,
}

#[derive(Debug)]
pub struct PlacementEngine {
    config: PlacementConfig,
    anchor: Option<Anchor>,
    smoothed: Option<DVec2>,
}

impl PlacementEngine {
    pub fn new(config: PlacementConfig) -> Self {
        Self {
            config,
            anchor: None,
            smoothed: None,
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }

    /// Fix the anchor (or return to follow mode with `None`); the next tick snaps.
    pub fn set_anchor(&mut self, anchor: Option<Anchor>) {
        self.anchor = anchor;
        self.smoothed = None;
    }

    /// Re-anchor in front of the player and drop smoothing history.
    pub fn recenter(&mut self, pose: &PlayerPose) {
        self.anchor = Some(Anchor::World(self.follow_anchor(pose)));
        self.smoothed = None;
    }

    pub fn reset_smoothing(&mut self) {
        self.smoothed = None;
    }

    fn follow_anchor(&self, pose: &PlayerPose) -> DVec3 {
        pose.position
            + pose.forward.normalize_or_zero() * self.config.forward_offset
            + DVec3::Y * self.config.up_offset
    }

    /// Compute this frame's window geometry. `None` leaves the last placement in place.
    pub fn tick(&mut self, projector: &dyn Projector, frame: &FrameInput) -> Option<WindowGeometry> {
        let size = frame.size;
        let screen_anchor = match self.anchor {
            Some(Anchor::Screen(p)) => Some(p),
            Some(Anchor::World(p)) => projector.world_to_screen(p),
            None => {
                let pose = frame.pose?;
                projector.world_to_screen(self.follow_anchor(&pose))
            }
        };

        let Some(screen_anchor) = screen_anchor else {
            if self.config.allow_offscreen {
                return Some(to_geometry(DVec2::new(OFFSCREEN_PARK, OFFSCREEN_PARK), size));
            }
            return None;
        };

        let mut desired = screen_anchor - size * 0.5;

        if self.config.avoid_enabled {
            if let Some(player) = frame.player_screen {
                let avoid = avoid_rect(player, &self.config);
                desired = choose_placement(desired, size, &avoid, self.config.avoid_padding);
            }
        }

        if !self.config.allow_offscreen {
            desired = clamp_to_viewport(desired, size, projector.viewport());
        }

        let tau = self.config.smoothing_tau.max(MIN_TAU);
        let dt = frame.dt.max(MIN_DT);
        let alpha = 1.0 - (-dt / tau).exp();
        let next = match self.smoothed {
            Some(prev) => prev.lerp(desired, alpha),
            None => desired,
        };
        self.smoothed = Some(next);

        Some(to_geometry(next, size))
    }
}

/// Protected region centered on the player horizontally and raised by the bias.
pub fn avoid_rect(player: DVec2, config: &PlacementConfig) -> Rect {
    let w = config.avoid_width.max(0.0);
    let h = config.avoid_height.max(0.0);
    Rect::new(
        player.x - w * 0.5,
        player.y - config.avoid_bias_up - h * 0.5,
        w,
        h,
    )
}

/// Pick the best of five candidates; the first one wins ties.
pub fn choose_placement(desired: DVec2, size: DVec2, avoid: &Rect, padding: f64) -> DVec2 {
    let dx = avoid.w + padding;
    let dy = avoid.h + padding;
    let candidates = [
        desired,
        desired + DVec2::new(dx, 0.0),
        desired - DVec2::new(dx, 0.0),
        desired - DVec2::new(0.0, dy),
        desired + DVec2::new(0.0, dy),
    ];

    let mut best = desired;
    let mut best_score = f64::INFINITY;
    for candidate in candidates {
        let rect = Rect::new(candidate.x, candidate.y, size.x, size.y);
        let score = OVERLAP_WEIGHT * rect.overlap_area(avoid) + candidate.distance(desired);
        if score < best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

pub fn clamp_to_viewport(pos: DVec2, size: DVec2, viewport: DVec2) -> DVec2 {
    let max_x = (viewport.x - size.x).max(0.0);
    let max_y = (viewport.y - size.y).max(0.0);
    DVec2::new(pos.x.clamp(0.0, max_x), pos.y.clamp(0.0, max_y))
}

fn to_geometry(pos: DVec2, size: DVec2) -> WindowGeometry {
    WindowGeometry::new(
        pos.x.round() as i32,
        pos.y.round() as i32,
        size.x.round() as i32,
        size.y.round() as i32,
    )
}
