//! Room membership and playback state machine.
//!
//! `SessionCore` is the receive-path reducer: it applies server pushes in
//! arrival order and reports what the shell must do next. It never performs
//! I/O itself, so the async client and the tests drive it the same way.
//!
//! Consent rules:
//! - the first sighting of a media identity in a connection arms the consent gate
//! - an identity is never prompted twice per connection
//! - only accepted identities are reported as `MediaPrepared` for auto-start

use std::collections::HashSet;
use std::time::{Duration, Instant};

use cinesync_common::helpers::{clamp_room_size, parse_keyed_digits};
use cinesync_common::{ClientMessage, PreparePush, ReadinessPush, ServerMessage, StatePush, StatsPush};
use tracing::{debug, info, warn};

use crate::types::{
    ConnectionStats, PendingConsent, RoomState, SessionEvent, SessionIdentity, STATE_THROTTLE,
};

/// Output of applying one server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Reply(ClientMessage),
    Notify(SessionEvent),
}

#[derive(Debug)]
pub struct SessionCore {
    default_width: u32,
    default_height: u32,
    state_throttle: Duration,

    room: RoomState,
    identity: SessionIdentity,
    consent: Option<PendingConsent>,
    stats: ConnectionStats,

    /// Identities the user has been asked about this connection.
    prompted: HashSet<String>,
    /// Identities the user accepted this connection.
    consented: HashSet<String>,
    last_seen_media_id: Option<String>,
    last_throttled_state: Option<Instant>,
}

impl SessionCore {
    pub fn new(default_width: u32, default_height: u32) -> Self {
        let (w, h) = clamp_room_size(default_width as i64, default_height as i64);
        Self {
            default_width: w,
            default_height: h,
            state_throttle: STATE_THROTTLE,
            room: RoomState::new(w, h),
            identity: SessionIdentity::default(),
            consent: None,
            stats: ConnectionStats::default(),
            prompted: HashSet::new(),
            consented: HashSet::new(),
            last_seen_media_id: None,
            last_throttled_state: None,
        }
    }

    pub fn with_state_throttle(mut self, throttle: Duration) -> Self {
        self.state_throttle = throttle;
        self
    }

    pub fn room(&self) -> &RoomState {
        &self.room
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn pending_consent(&self) -> Option<&PendingConsent> {
        self.consent.as_ref()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    pub fn last_seen_media_id(&self) -> Option<&str> {
        self.last_seen_media_id.as_deref()
    }

    pub fn default_room_size(&self) -> (u32, u32) {
        (self.default_width, self.default_height)
    }

    /// Return every session-scoped field to its post-construction value.
    pub fn reset(&mut self) {
        self.room = RoomState::new(self.default_width, self.default_height);
        self.identity = SessionIdentity::default();
        self.consent = None;
        self.stats = ConnectionStats::default();
        self.prompted.clear();
        self.consented.clear();
        self.last_seen_media_id = None;
        self.last_throttled_state = None;
    }

    /// Drop room membership locally. Returns true if there was a room.
    pub fn leave_room(&mut self) -> bool {
        let had_room = self.identity.room_code.is_some();
        self.identity = SessionIdentity::default();
        had_room
    }

    /// Clear the consent gate, recording the identity on accept.
    pub fn resolve_consent(&mut self, accepted: bool) -> Option<PendingConsent> {
        let consent = self.consent.take()?;
        if accepted {
            self.consented.insert(consent_key(&consent));
            self.consented.insert(consent.url.clone());
        }
        Some(consent)
    }

    pub fn apply(&mut self, msg: ServerMessage, now: Instant) -> Vec<Effect> {
        let mut out = Vec::new();
        match msg {
            ServerMessage::Ping => out.push(Effect::Reply(ClientMessage::Pong)),
            ServerMessage::Hosted {
                room_code,
                width,
                height,
            } => self.on_room(room_code, true, width, height, &mut out),
            ServerMessage::Joined {
                room_code,
                width,
                height,
            } => self.on_room(room_code, false, width, height, &mut out),
            ServerMessage::Prepare(push) => self.on_prepare(push, &mut out),
            ServerMessage::State(push) => self.on_state(push, now, &mut out),
            ServerMessage::Presence { count } => {
                if let Some(count) = count {
                    self.room.presence = count;
                }
                out.push(self.presence_event());
            }
            ServerMessage::Readiness(push) => self.on_readiness(push, &mut out),
            ServerMessage::Stats(push) => self.on_stats(push, &mut out),
            ServerMessage::Layout { width, height } => {
                self.adopt_partial_layout(width, height, &mut out);
            }
            ServerMessage::Error { message } => {
                warn!("server error: {}", message);
                out.push(Effect::Notify(SessionEvent::Notice(message)));
            }
            ServerMessage::Unknown => debug!("ignoring unknown server message"),
        }
        out
    }

    fn on_room(
        &mut self,
        room_code: String,
        is_host: bool,
        width: Option<i64>,
        height: Option<i64>,
        out: &mut Vec<Effect>,
    ) {
        info!(
            "{} room {}",
            if is_host { "hosting" } else { "joined" },
            room_code
        );
        self.identity = SessionIdentity {
            room_code: Some(room_code),
            is_host,
        };
        out.push(Effect::Notify(SessionEvent::RoomChanged(self.identity.clone())));
        self.adopt_partial_layout(width, height, out);
    }

    fn on_prepare(&mut self, push: PreparePush, out: &mut Vec<Effect>) {
        if push.url.is_some() {
            self.room.url = push.url;
        }
        if push.media_id.is_some() {
            self.room.media_id = push.media_id;
        }
        self.room.set_position(push.position_seconds.unwrap_or(0.0));
        if let Some(ts) = push.server_time_ms {
            self.room.server_time_ms = ts;
        }
        self.room.is_playing = false;

        self.adopt_partial_layout(push.width, push.height, out);

        out.push(Effect::Notify(SessionEvent::StateChanged(self.room.clone())));

        let Some(url) = self.room.url.clone() else {
            debug!("prepare without url; nothing to open");
            return;
        };
        let consent = PendingConsent {
            url,
            media_id: self.room.media_id.clone(),
            start_seconds: self.room.position_seconds,
        };
        self.sight_media(consent, true, out);
    }

    fn on_state(&mut self, push: StatePush, now: Instant, out: &mut Vec<Effect>) {
        if !push.is_important() {
            if let Some(last) = self.last_throttled_state {
                if now.saturating_duration_since(last) < self.state_throttle {
                    debug!("state push throttled");
                    return;
                }
            }
            self.last_throttled_state = Some(now);
        }

        let media_changed = push
            .media_id
            .as_ref()
            .is_some_and(|id| self.room.media_id.as_ref() != Some(id));

        if push.url.is_some() {
            self.room.url = push.url;
        }
        if push.media_id.is_some() {
            self.room.media_id = push.media_id;
        }
        if let Some(playing) = push.is_playing {
            self.room.is_playing = playing;
        }
        if let Some(pos) = push.position_seconds {
            self.room.set_position(pos);
        }
        if let Some(ts) = push.server_time_ms {
            self.room.server_time_ms = ts;
        }

        out.push(Effect::Notify(SessionEvent::StateChanged(self.room.clone())));

        if let (Some(url), Some(media_id)) = (self.room.url.clone(), self.room.media_id.clone()) {
            let first_sighting = !self.prompted.contains(&media_id);
            if first_sighting || media_changed {
                let consent = PendingConsent {
                    url,
                    media_id: Some(media_id),
                    start_seconds: self.room.position_seconds,
                };
                self.sight_media(consent, false, out);
            }
        }
    }

    /// Decide between arming consent and reporting consented media.
    fn sight_media(&mut self, consent: PendingConsent, prepared: bool, out: &mut Vec<Effect>) {
        self.link_url_key(&consent);
        let key = consent_key(&consent);
        let repeat_of_last = self.last_seen_media_id.as_deref() == Some(key.as_str());
        self.last_seen_media_id = Some(key.clone());

        if self.prompted.insert(key.clone()) {
            if let Some(previous) = self.consent.as_ref() {
                debug!("consent for {} superseded by {}", previous.url, consent.url);
            }
            info!("consent needed for {}", consent.url);
            self.consent = Some(consent.clone());
            out.push(Effect::Notify(SessionEvent::ConsentNeeded(consent)));
            return;
        }

        if self.consent.is_some() {
            // Last prepare wins, without prompting again.
            self.consent = Some(consent);
            return;
        }

        if !self.consented.contains(&key) {
            debug!("media {} was declined this session; not reopening", key);
            return;
        }

        if prepared || !repeat_of_last {
            out.push(Effect::Notify(SessionEvent::MediaPrepared {
                url: consent.url,
                media_id: consent.media_id,
                start_seconds: consent.start_seconds,
            }));
        }
    }

    /// Media first seen by url alone keeps its consent status once its id turns up.
    fn link_url_key(&mut self, consent: &PendingConsent) {
        let Some(media_id) = consent.media_id.as_ref() else {
            return;
        };
        if self.prompted.contains(media_id) || !self.prompted.contains(&consent.url) {
            return;
        }
        debug!("media {} now known as {}", consent.url, media_id);
        self.prompted.insert(media_id.clone());
        if self.consented.contains(&consent.url) {
            self.consented.insert(media_id.clone());
        }
        if self.last_seen_media_id.as_deref() == Some(consent.url.as_str()) {
            self.last_seen_media_id = Some(media_id.clone());
        }
    }

    fn on_readiness(&mut self, push: ReadinessPush, out: &mut Vec<Effect>) {
        let count = push.ready_count.unwrap_or(self.room.ready_count);
        let total = push.ready_total.unwrap_or(self.room.ready_total);
        self.room.set_readiness(count, total);
        if let Some(presence) = push.presence {
            self.room.presence = presence;
        }
        out.push(self.presence_event());
    }

    fn on_stats(&mut self, push: StatsPush, out: &mut Vec<Effect>) {
        let legacy = push.message.as_deref().unwrap_or_default();
        let current = push
            .current
            .or_else(|| parse_keyed_digits(legacy, "current"));
        let peak = push.peak.or_else(|| parse_keyed_digits(legacy, "peak"));
        if current.is_none() && peak.is_none() {
            debug!("stats push without counts");
            return;
        }
        if let Some(current) = current {
            self.stats.current = current;
        }
        if let Some(peak) = peak {
            self.stats.peak = peak;
        }
        self.stats.peak = self.stats.peak.max(self.stats.current);
        out.push(Effect::Notify(SessionEvent::StatsChanged(self.stats)));
    }

    /// Missing sides keep the current room size; nothing happens if both are missing.
    fn adopt_partial_layout(
        &mut self,
        width: Option<i64>,
        height: Option<i64>,
        out: &mut Vec<Effect>,
    ) {
        if width.is_none() && height.is_none() {
            return;
        }
        let w = width.unwrap_or(self.room.room_width_px as i64);
        let h = height.unwrap_or(self.room.room_height_px as i64);
        self.adopt_layout(w, h, out);
    }

    fn adopt_layout(&mut self, width: i64, height: i64, out: &mut Vec<Effect>) {
        let (w, h) = clamp_room_size(width, height);
        if w == self.room.room_width_px && h == self.room.room_height_px {
            return;
        }
        self.room.room_width_px = w;
        self.room.room_height_px = h;
        out.push(Effect::Notify(SessionEvent::LayoutChanged {
            width: w,
            height: h,
        }));
    }

    fn presence_event(&self) -> Effect {
        Effect::Notify(SessionEvent::PresenceChanged {
            presence: self.room.presence,
            ready_count: self.room.ready_count,
            ready_total: self.room.ready_total,
        })
    }
}

fn consent_key(consent: &PendingConsent) -> String {
    consent
        .media_id
        .clone()
        .unwrap_or_else(|| consent.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(media_id: &str) -> ServerMessage {
        ServerMessage::Prepare(PreparePush {
            url: Some(format!("https://media.example/{}", media_id)),
            media_id: Some(media_id.to_string()),
            position_seconds: Some(0.0),
            server_time_ms: Some(1_000),
            ..Default::default()
        })
    }

    fn consent_ids(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(SessionEvent::ConsentNeeded(c)) => c.media_id.clone(),
                _ => None,
            })
            .collect()
    }

    fn has_media_prepared(effects: &[Effect]) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::Notify(SessionEvent::MediaPrepared { .. })))
    }

    #[test]
    fn test_ping_replies_pong() {
        let mut core = SessionCore::new(720, 405);
        let effects = core.apply(ServerMessage::Ping, Instant::now());
        assert_eq!(effects, vec![Effect::Reply(ClientMessage::Pong)]);
    }

    #[test]
    fn test_consent_fires_once_per_media_identity() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        let mut fired = Vec::new();
        for id in ["A", "A", "B", "A"] {
            fired.extend(consent_ids(&core.apply(prepare(id), now)));
        }
        assert_eq!(fired, vec!["A".to_string(), "B".to_string()]);
        // Last prepare wins.
        assert_eq!(
            core.pending_consent().and_then(|c| c.media_id.as_deref()),
            Some("A")
        );
    }

    #[test]
    fn test_consented_media_is_prepared_without_prompt() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        core.apply(prepare("A"), now);
        let resolved = core.resolve_consent(true).unwrap();
        assert_eq!(resolved.media_id.as_deref(), Some("A"));
        assert!(core.pending_consent().is_none());

        let effects = core.apply(prepare("A"), now);
        assert!(consent_ids(&effects).is_empty());
        assert!(has_media_prepared(&effects));
    }

    #[test]
    fn test_declined_media_is_not_reopened() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        core.apply(prepare("A"), now);
        core.resolve_consent(false);

        let effects = core.apply(prepare("A"), now);
        assert!(consent_ids(&effects).is_empty());
        assert!(!has_media_prepared(&effects));
    }

    #[test]
    fn test_prepare_forces_pause() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        core.apply(
            ServerMessage::State(StatePush {
                is_playing: Some(true),
                ..Default::default()
            }),
            now,
        );
        assert!(core.room().is_playing);
        core.apply(prepare("A"), now);
        assert!(!core.room().is_playing);
        assert_eq!(core.room().server_time_ms, 1_000);
    }

    #[test]
    fn test_state_deltas_never_regress_known_fields() {
        let mut core = SessionCore::new(720, 405);
        let t0 = Instant::now();
        core.apply(
            ServerMessage::State(StatePush {
                url: Some("x".into()),
                position_seconds: Some(5.0),
                ..Default::default()
            }),
            t0,
        );
        core.apply(
            ServerMessage::State(StatePush {
                is_playing: Some(true),
                ..Default::default()
            }),
            t0 + Duration::from_millis(10),
        );
        assert_eq!(core.room().url.as_deref(), Some("x"));
        assert_eq!(core.room().position_seconds, 5.0);
        assert!(core.room().is_playing);
    }

    #[test]
    fn test_important_state_bypasses_throttle() {
        let mut core = SessionCore::new(720, 405);
        let t0 = Instant::now();
        core.apply(
            ServerMessage::State(StatePush {
                position_seconds: Some(1.0),
                ..Default::default()
            }),
            t0,
        );
        core.apply(
            ServerMessage::State(StatePush {
                url: Some("https://media.example/new".into()),
                position_seconds: Some(2.0),
                ..Default::default()
            }),
            t0 + Duration::from_millis(10),
        );
        assert_eq!(core.room().url.as_deref(), Some("https://media.example/new"));
        assert_eq!(core.room().position_seconds, 2.0);
    }

    #[test]
    fn test_position_only_state_is_throttled() {
        let mut core = SessionCore::new(720, 405);
        let t0 = Instant::now();
        let first = core.apply(
            ServerMessage::State(StatePush {
                position_seconds: Some(1.0),
                ..Default::default()
            }),
            t0,
        );
        let second = core.apply(
            ServerMessage::State(StatePush {
                position_seconds: Some(2.0),
                ..Default::default()
            }),
            t0 + Duration::from_millis(10),
        );
        assert!(!first.is_empty());
        assert!(second.is_empty());
        assert_eq!(core.room().position_seconds, 1.0);

        core.apply(
            ServerMessage::State(StatePush {
                position_seconds: Some(3.0),
                ..Default::default()
            }),
            t0 + Duration::from_millis(60),
        );
        assert_eq!(core.room().position_seconds, 3.0);
    }

    #[test]
    fn test_state_with_new_media_arms_consent() {
        let mut core = SessionCore::new(720, 405);
        let effects = core.apply(
            ServerMessage::State(StatePush {
                url: Some("https://media.example/a".into()),
                media_id: Some("A".into()),
                ..Default::default()
            }),
            Instant::now(),
        );
        assert_eq!(consent_ids(&effects), vec!["A".to_string()]);
        assert!(core.pending_consent().is_some());

        let again = core.apply(
            ServerMessage::State(StatePush {
                is_playing: Some(true),
                ..Default::default()
            }),
            Instant::now(),
        );
        assert!(consent_ids(&again).is_empty());
    }

    #[test]
    fn test_hosted_and_joined_set_identity_and_layout() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        let effects = core.apply(
            ServerMessage::Hosted {
                room_code: "ROOM1".into(),
                width: Some(1280),
                height: Some(720),
            },
            now,
        );
        assert_eq!(core.identity().room_code.as_deref(), Some("ROOM1"));
        assert!(core.identity().is_host);
        assert_eq!((core.room().room_width_px, core.room().room_height_px), (1280, 720));
        assert!(effects.contains(&Effect::Notify(SessionEvent::LayoutChanged {
            width: 1280,
            height: 720
        })));

        core.apply(
            ServerMessage::Joined {
                room_code: "ROOM2".into(),
                width: None,
                height: None,
            },
            now,
        );
        assert_eq!(core.identity().room_code.as_deref(), Some("ROOM2"));
        assert!(!core.identity().is_host);
        assert_eq!(core.room().room_width_px, 1280);
    }

    #[test]
    fn test_layout_notifies_only_on_change() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        let same = core.apply(
            ServerMessage::Layout {
                width: Some(720),
                height: Some(405),
            },
            now,
        );
        assert!(same.is_empty());

        let clamped = core.apply(
            ServerMessage::Layout {
                width: Some(10),
                height: Some(99_999),
            },
            now,
        );
        assert_eq!(
            clamped,
            vec![Effect::Notify(SessionEvent::LayoutChanged {
                width: 320,
                height: 2160
            })]
        );
    }

    #[test]
    fn test_readiness_respects_invariant() {
        let mut core = SessionCore::new(720, 405);
        core.apply(
            ServerMessage::Readiness(ReadinessPush {
                ready_count: Some(5),
                ready_total: Some(3),
                presence: Some(4),
            }),
            Instant::now(),
        );
        assert_eq!(core.room().ready_total, 3);
        assert_eq!(core.room().ready_count, 3);
        assert_eq!(core.room().presence, 4);
    }

    #[test]
    fn test_partial_readiness_keeps_known_counts() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        core.apply(
            ServerMessage::Readiness(ReadinessPush {
                ready_count: Some(2),
                ready_total: Some(4),
                presence: Some(4),
            }),
            now,
        );
        let effects = core.apply(
            ServerMessage::Readiness(ReadinessPush {
                presence: Some(5),
                ..Default::default()
            }),
            now,
        );
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionEvent::PresenceChanged {
                presence: 5,
                ready_count: 2,
                ready_total: 4
            })]
        );

        // A lower total alone still pulls the count down with it.
        core.apply(
            ServerMessage::Readiness(ReadinessPush {
                ready_total: Some(1),
                ..Default::default()
            }),
            now,
        );
        assert_eq!((core.room().ready_count, core.room().ready_total), (1, 1));
    }

    #[test]
    fn test_presence_without_count_keeps_presence() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        core.apply(ServerMessage::Presence { count: Some(3) }, now);
        core.apply(ServerMessage::Presence { count: None }, now);
        assert_eq!(core.room().presence, 3);
    }

    #[test]
    fn test_partial_layout_fills_missing_side() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        let effects = core.apply(
            ServerMessage::Layout {
                width: Some(1280),
                height: None,
            },
            now,
        );
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionEvent::LayoutChanged {
                width: 1280,
                height: 405
            })]
        );
        let nothing = core.apply(
            ServerMessage::Layout {
                width: None,
                height: None,
            },
            now,
        );
        assert!(nothing.is_empty());
        assert_eq!((core.room().room_width_px, core.room().room_height_px), (1280, 405));
    }

    #[test]
    fn test_media_id_after_url_only_prepare_does_not_reprompt() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        let url = "https://media.example/film";
        let first = core.apply(
            ServerMessage::Prepare(PreparePush {
                url: Some(url.into()),
                ..Default::default()
            }),
            now,
        );
        assert_eq!(
            first
                .iter()
                .filter(|e| matches!(e, Effect::Notify(SessionEvent::ConsentNeeded(_))))
                .count(),
            1
        );
        core.resolve_consent(true);

        let later = core.apply(
            ServerMessage::State(StatePush {
                url: Some(url.into()),
                media_id: Some("F".into()),
                is_playing: Some(true),
                ..Default::default()
            }),
            now,
        );
        assert!(consent_ids(&later).is_empty());
        assert!(core.pending_consent().is_none());
        assert_eq!(core.last_seen_media_id(), Some("F"));

        // The accepted media still opens directly when re-prepared by id.
        let again = core.apply(
            ServerMessage::Prepare(PreparePush {
                url: Some(url.into()),
                media_id: Some("F".into()),
                ..Default::default()
            }),
            now,
        );
        assert!(consent_ids(&again).is_empty());
        assert!(has_media_prepared(&again));
    }

    #[test]
    fn test_stats_structured_and_legacy() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        core.apply(
            ServerMessage::Stats(StatsPush {
                current: Some(3),
                peak: Some(7),
                message: None,
            }),
            now,
        );
        assert_eq!(core.stats(), ConnectionStats { current: 3, peak: 7 });

        core.apply(
            ServerMessage::Stats(StatsPush {
                message: Some("Online: current=11 peak=12".into()),
                ..Default::default()
            }),
            now,
        );
        assert_eq!(core.stats(), ConnectionStats { current: 11, peak: 12 });

        let ignored = core.apply(
            ServerMessage::Stats(StatsPush {
                message: Some("current=lots".into()),
                ..Default::default()
            }),
            now,
        );
        assert!(ignored.is_empty());
        assert_eq!(core.stats().current, 11);
    }

    #[test]
    fn test_error_surfaces_without_state_change() {
        let mut core = SessionCore::new(720, 405);
        let before = core.room().clone();
        let effects = core.apply(
            ServerMessage::Error {
                message: "room not found".into(),
            },
            Instant::now(),
        );
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionEvent::Notice("room not found".into()))]
        );
        assert_eq!(core.room(), &before);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut core = SessionCore::new(720, 405);
        let now = Instant::now();
        core.apply(
            ServerMessage::Hosted {
                room_code: "R".into(),
                width: Some(1920),
                height: Some(1080),
            },
            now,
        );
        core.apply(prepare("A"), now);
        core.apply(ServerMessage::Presence { count: Some(4) }, now);
        core.reset();

        assert_eq!(core.identity(), &SessionIdentity::default());
        assert!(core.pending_consent().is_none());
        assert!(core.last_seen_media_id().is_none());
        assert_eq!(core.room(), &RoomState::new(720, 405));

        // A fresh connection prompts again for the same media.
        let effects = core.apply(prepare("A"), now);
        assert_eq!(consent_ids(&effects), vec!["A".to_string()]);
    }
}
