use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use cinesync_client::placement::{DVec2, DVec3, FlatProjector};
use cinesync_client::player::{default_channel_name, ConnectedChannel, FILE_LOADED_EVENT};
use cinesync_client::{
    FrameInput, HttpUrlNormalizer, LaunchSpec, PlacementConfig, PlacementEngine,
    PlayerController, PlayerPose, Projector, RoomState, SessionClient, SessionConfig,
    SessionEvent, WindowGeometry,
};
use cinesync_common::{init_tracing_with_default, Settings, SettingsStore};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);
/// Position disagreement that warrants a hard seek in the local player.
const DRIFT_TOLERANCE_SECS: f64 = 2.0;

#[derive(Parser, Debug)]
#[command(name = "cinesync-client")]
struct Args {
    /// Settings file (created on first consent)
    #[arg(long, default_value = "cinesync.json")]
    config: PathBuf,
    /// Sync server websocket address (overrides settings)
    #[arg(long, env = "CINESYNC_SERVER")]
    server: Option<String>,
    /// Player executable (overrides settings)
    #[arg(long)]
    player: Option<String>,
    /// Host a new room around this media URL
    #[arg(long, conflicts_with = "join")]
    host: Option<String>,
    /// Join an existing room by code
    #[arg(long)]
    join: Option<String>,
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Screen size used by the placement tick
    #[arg(long, default_value_t = 1920)]
    viewport_width: u32,
    #[arg(long, default_value_t = 1080)]
    viewport_height: u32,
}

#[derive(Debug, Clone, PartialEq)]
enum ShellCommand {
    Consent(bool),
    Play,
    Pause,
    Seek(f64),
    Push(String),
    Host(String),
    Join(String),
    Layout(i64, i64),
    Move(f64, f64),
    Leave,
    Recenter,
    Status,
    Quit,
}

fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err("empty command".into());
    }
    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .ok_or_else(|| "empty command".to_string())?
        .to_ascii_lowercase();
    let rest: Vec<&str> = parts.collect();

    let one_arg = |name: &str| -> Result<String, String> {
        match rest.as_slice() {
            [value] => Ok(value.to_string()),
            _ => Err(format!("usage: {} <value>", name)),
        }
    };

    match verb.as_str() {
        "y" | "yes" => Ok(ShellCommand::Consent(true)),
        "n" | "no" => Ok(ShellCommand::Consent(false)),
        "play" => Ok(ShellCommand::Play),
        "pause" => Ok(ShellCommand::Pause),
        "seek" => one_arg("seek")?
            .parse::<f64>()
            .map(ShellCommand::Seek)
            .map_err(|_| "seek position must be a number of seconds".to_string()),
        "push" => one_arg("push").map(ShellCommand::Push),
        "host" => one_arg("host").map(ShellCommand::Host),
        "join" => one_arg("join").map(ShellCommand::Join),
        "layout" => match rest.as_slice() {
            [w, h] => {
                let w = w.parse::<i64>().map_err(|_| "width must be an integer")?;
                let h = h.parse::<i64>().map_err(|_| "height must be an integer")?;
                Ok(ShellCommand::Layout(w, h))
            }
            _ => Err("usage: layout <width> <height>".into()),
        },
        "move" => match rest.as_slice() {
            [x, y] => {
                let x = x.parse::<f64>().map_err(|_| "x must be a number")?;
                let y = y.parse::<f64>().map_err(|_| "y must be a number")?;
                Ok(ShellCommand::Move(x, y))
            }
            _ => Err("usage: move <x> <y>".into()),
        },
        "leave" => Ok(ShellCommand::Leave),
        "recenter" => Ok(ShellCommand::Recenter),
        "status" => Ok(ShellCommand::Status),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command '{}'", other)),
    }
}

/// Where the local player should seek after a room state change, if anywhere.
fn drift_seek(previous: Option<&RoomState>, next: &RoomState) -> Option<f64> {
    let Some(prev) = previous else {
        return (next.position_seconds > 0.0).then_some(next.position_seconds);
    };
    if prev.media_id != next.media_id {
        return Some(next.position_seconds);
    }
    let elapsed = if prev.is_playing {
        (next.server_time_ms - prev.server_time_ms).max(0) as f64 / 1000.0
    } else {
        0.0
    };
    let expected = prev.position_seconds + elapsed;
    ((next.position_seconds - expected).abs() > DRIFT_TOLERANCE_SECS)
        .then_some(next.position_seconds)
}

struct Shell {
    settings: Settings,
    session: SessionClient,
    player: PlayerController,
    placement: PlacementEngine,
    projector: FlatProjector,
    /// Stand-in for the host's avatar; `move` drives it, `recenter` pins to it.
    pose: PlayerPose,
    synced: Option<RoomState>,
    channels: mpsc::UnboundedSender<ConnectedChannel>,
}

impl Shell {
    fn viewport_center(&self) -> DVec2 {
        self.projector.viewport * 0.5
    }

    fn window_size(&self) -> DVec2 {
        let room = self.session.room_state();
        DVec2::new(room.room_width_px as f64, room.room_height_px as f64)
    }

    /// Spawn the player; its control channel is awaited off the main loop.
    fn launch(&mut self, url: &str, start_seconds: f64) {
        let size = self.window_size();
        let top_left = self.viewport_center() - size * 0.5;
        let spec = LaunchSpec {
            exe: PathBuf::from(&self.settings.player_path),
            channel: default_channel_name(),
            url: url.to_string(),
            geometry: WindowGeometry::new(
                top_left.x.round() as i32,
                top_left.y.round() as i32,
                size.x as i32,
                size.y as i32,
            ),
            borderless_on_top: self.settings.borderless_on_top,
            start_seconds,
        };
        match self.player.spawn(&spec) {
            Ok(connector) => {
                let channels = self.channels.clone();
                tokio::spawn(async move {
                    let _ = channels.send(connector.connect().await);
                });
            }
            Err(e) => println!("! could not start player: {}", e),
        }
    }

    fn on_channel(&mut self, connected: ConnectedChannel) {
        if self.player.install(connected) {
            self.synced = Some(self.session.room_state());
            self.placement.reset_smoothing();
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StatusChanged(status) => println!("* {}", status),
            SessionEvent::Notice(text) => println!("! {}", text),
            SessionEvent::RoomChanged(identity) => match identity.room_code {
                Some(code) => println!(
                    "* {} room {}",
                    if identity.is_host { "hosting" } else { "joined" },
                    code
                ),
                None => {
                    println!("* left room");
                    self.player.stop_playback();
                }
            },
            SessionEvent::ConsentNeeded(consent) => {
                println!("? open {} for this room? [y/n]", consent.url);
            }
            SessionEvent::ConsentResolved { accepted, consent } => {
                if accepted {
                    self.launch(&consent.url, consent.start_seconds);
                }
            }
            SessionEvent::MediaPrepared {
                url, start_seconds, ..
            } => {
                if self.player.is_channel_connected() {
                    self.player.load_url(&url);
                    if start_seconds > 0.0 {
                        self.player.seek_absolute(start_seconds);
                    }
                    self.player.set_pause(true);
                    self.synced = Some(self.session.room_state());
                } else {
                    self.launch(&url, start_seconds);
                }
            }
            SessionEvent::StateChanged(state) => self.sync_player(state),
            SessionEvent::LayoutChanged { width, height } => {
                info!("room layout now {}x{}", width, height);
            }
            SessionEvent::PresenceChanged {
                presence,
                ready_count,
                ready_total,
            } => println!("* {} watching, {}/{} ready", presence, ready_count, ready_total),
            SessionEvent::StatsChanged(stats) => {
                debug!("server connections: {} (peak {})", stats.current, stats.peak);
            }
        }
    }

    fn sync_player(&mut self, state: RoomState) {
        if !self.player.is_channel_connected() {
            return;
        }
        let previous = self.synced.as_ref();
        if previous.map_or(true, |p| p.is_playing != state.is_playing) {
            self.player.set_pause(!state.is_playing);
        }
        if let Some(target) = drift_seek(previous, &state) {
            self.player.seek_absolute(target);
        }
        self.synced = Some(state);
    }

    fn on_command(&mut self, command: ShellCommand) -> bool {
        match command {
            ShellCommand::Consent(accepted) => {
                if self.session.acknowledge_consent(accepted).is_none() {
                    println!("! nothing is waiting for consent");
                }
            }
            ShellCommand::Play => {
                self.session.set_playing(true);
            }
            ShellCommand::Pause => {
                self.session.set_playing(false);
            }
            ShellCommand::Seek(seconds) => {
                self.session.seek(seconds);
            }
            ShellCommand::Push(url) => {
                let _ = self.session.push_url(&url);
            }
            ShellCommand::Host(url) => {
                let session = self.session.clone();
                tokio::spawn(async move {
                    if !session.is_connected() && session.connect().await.is_err() {
                        return;
                    }
                    let _ = session.host(&url);
                });
            }
            ShellCommand::Join(code) => {
                let session = self.session.clone();
                tokio::spawn(async move {
                    let _ = session.join(&code).await;
                });
            }
            ShellCommand::Layout(w, h) => {
                self.session.set_room_layout(w, h);
            }
            ShellCommand::Leave => {
                self.session.leave();
            }
            ShellCommand::Move(x, y) => {
                self.pose.position = DVec3::new(x, y, self.pose.position.z);
            }
            ShellCommand::Recenter => {
                self.placement.recenter(&self.pose);
                let at = self.pose.position;
                println!("* window pinned near {:.0},{:.0}", at.x, at.y);
            }
            ShellCommand::Status => {
                let room = self.session.room_state();
                let identity = self.session.identity();
                println!(
                    "* {} | room {:?} host={} | {:?} playing={} at {:.1}s | player running={}",
                    self.session.status(),
                    identity.room_code,
                    identity.is_host,
                    room.url,
                    room.is_playing,
                    room.position_seconds,
                    self.player.is_running(),
                );
            }
            ShellCommand::Quit => return false,
        }
        true
    }

    fn on_frame(&mut self, dt: f64) {
        if !self.player.is_channel_connected() {
            return;
        }
        let frame = FrameInput {
            pose: Some(self.pose),
            player_screen: self.projector.world_to_screen(self.pose.position),
            size: self.window_size(),
            dt,
        };
        if let Some(geometry) = self.placement.tick(&self.projector, &frame) {
            self.player.set_geometry(
                geometry,
                Duration::from_millis(self.settings.geometry_min_interval_ms),
                self.settings.geometry_min_delta_px,
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing_with_default(&args.log_level);

    let store = Arc::new(
        SettingsStore::load(&args.config)
            .with_context(|| format!("loading settings from {}", args.config.display()))?,
    );
    let mut settings = store.snapshot();
    settings.apply_env();
    if let Some(server) = args.server.clone() {
        settings.server = server;
    }
    if let Some(player) = args.player.clone() {
        settings.player_path = player;
    }

    let (session, mut session_events) = SessionClient::with_collaborators(
        SessionConfig::from(&settings),
        Arc::new(HttpUrlNormalizer),
        store.clone(),
    );
    let player = PlayerController::new();
    let mut player_events = player.subscribe();
    let projector = FlatProjector {
        viewport: DVec2::new(args.viewport_width as f64, args.viewport_height as f64),
    };
    let center = projector.viewport * 0.5;
    let (channels, mut channel_rx) = mpsc::unbounded_channel();
    let mut shell = Shell {
        placement: PlacementEngine::new(PlacementConfig::from(&settings)),
        settings,
        session: session.clone(),
        player,
        projector,
        pose: PlayerPose {
            position: DVec3::new(center.x, center.y, 0.0),
            forward: DVec3::Z,
        },
        synced: None,
        channels,
    };

    if shell.settings.auto_connect || args.host.is_some() || args.join.is_some() {
        if let Err(e) = session.connect().await {
            warn!("initial connect failed: {}", e);
        }
    }
    if let Some(url) = args.host.as_deref() {
        let _ = session.host(url);
    }
    if let Some(code) = args.join.as_deref() {
        let _ = session.join(code).await;
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut frames = time::interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
            line = stdin.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_command(&line) {
                        Ok(command) => {
                            if !shell.on_command(command) {
                                break;
                            }
                        }
                        Err(e) => println!("! {}", e),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            },
            Some(event) = session_events.recv() => shell.on_session_event(event),
            Some(connected) = channel_rx.recv() => shell.on_channel(connected),
            event = player_events.recv() => match event {
                Ok(event) if event.name == FILE_LOADED_EVENT => {
                    if let Some(media_id) = shell.session.room_state().media_id {
                        shell.session.send_ready(&media_id);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!("missed {} player events", skipped),
                Err(RecvError::Closed) => {}
            },
            _ = frames.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_frame).as_secs_f64();
                last_frame = now;
                shell.on_frame(dt);
            }
        }
    }

    session.disconnect();
    shell.player.stop();
    Ok(())
}
