//! External media player (mpv) lifecycle and JSON IPC.
//!
//! Commands are newline-delimited JSON objects of the form
//! `{"command": [...], "request_id": N}`. Inbound lines are either replies
//! (keyed by `request_id`) or events (keyed by `event`).

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cinesync_common::{Error, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::types::WindowGeometry;

pub const CHANNEL_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
pub const CHANNEL_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const FILE_LOADED_EVENT: &str = "file-loaded";
const EVENT_CAPACITY: usize = 64;

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Option<Value>>>>>;
type ChannelReader = Box<dyn AsyncRead + Send + Unpin>;
type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Everything needed to launch the player.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub exe: PathBuf,
    pub channel: String,
    pub url: String,
    pub geometry: WindowGeometry,
    pub borderless_on_top: bool,
    pub start_seconds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub name: String,
    pub data: Value,
}

/// Rate limiter for window geometry updates.
///
/// A size change always goes through. A pure move needs both the interval to
/// have elapsed and a displacement of at least `min_delta_px` on some axis.
#[derive(Debug, Default, Clone)]
pub struct GeometryThrottle {
    last: Option<(WindowGeometry, Instant)>,
}

impl GeometryThrottle {
    pub fn should_send(
        &self,
        next: WindowGeometry,
        now: Instant,
        min_interval: Duration,
        min_delta_px: i32,
    ) -> bool {
        let Some((last, sent_at)) = self.last else {
            return true;
        };
        if next.w != last.w || next.h != last.h {
            return true;
        }
        let elapsed = now.saturating_duration_since(sent_at) >= min_interval;
        let moved =
            (next.x - last.x).abs() >= min_delta_px || (next.y - last.y).abs() >= min_delta_px;
        elapsed && moved
    }

    pub fn record(&mut self, sent: WindowGeometry, now: Instant) {
        self.last = Some((sent, now));
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

struct ChannelLink {
    writer: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Pending connection to a freshly launched player's control channel.
#[derive(Debug)]
pub struct ChannelConnector {
    generation: u64,
    address: String,
    timeout: Duration,
    poll: Duration,
    geometry: Option<WindowGeometry>,
}

impl ChannelConnector {
    /// Poll the channel until it opens or the timeout runs out.
    pub async fn connect(self) -> ConnectedChannel {
        let deadline = Instant::now() + self.timeout;
        let halves = loop {
            match open_channel(&self.address).await {
                Ok(halves) => break Some(halves),
                Err(e) => {
                    if Instant::now() + self.poll > deadline {
                        debug!("giving up on {}: {}", self.address, e);
                        break None;
                    }
                    time::sleep(self.poll).await;
                }
            }
        };
        ConnectedChannel {
            generation: self.generation,
            address: self.address,
            geometry: self.geometry,
            halves,
        }
    }
}

/// Outcome of [`ChannelConnector::connect`], ready for [`PlayerController::install`].
pub struct ConnectedChannel {
    generation: u64,
    address: String,
    geometry: Option<WindowGeometry>,
    halves: Option<(ChannelReader, ChannelWriter)>,
}

impl ConnectedChannel {
    pub fn is_open(&self) -> bool {
        self.halves.is_some()
    }
}

/// Drives exactly one player process at a time.
pub struct PlayerController {
    child: Option<Child>,
    channel: Option<ChannelLink>,
    pending: PendingReplies,
    next_request_id: AtomicU64,
    events: broadcast::Sender<PlayerEvent>,
    throttle: GeometryThrottle,
    /// Bumped per launch or attach; stale connectors are ignored.
    generation: u64,
}

impl Default for PlayerController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerController {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            child: None,
            channel: None,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_request_id: AtomicU64::new(1),
            events,
            throttle: GeometryThrottle::default(),
            generation: 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Tear down any previous player, launch a new one and wait for its channel.
    ///
    /// Only a spawn failure is an error. If the control channel never comes up
    /// the player keeps running without a sync link.
    pub async fn start_or_restart(&mut self, spec: &LaunchSpec) -> Result<()> {
        let connector = self.spawn(spec)?;
        let connected = connector.connect().await;
        self.install(connected);
        Ok(())
    }

    /// Launch the player without waiting for its control channel.
    ///
    /// The returned connector can be driven on another task; hand its result
    /// back to [`PlayerController::install`].
    pub fn spawn(&mut self, spec: &LaunchSpec) -> Result<ChannelConnector> {
        self.stop();

        let args = launch_args(spec);
        debug!("launching {} {:?}", spec.exe.display(), args);
        let child = Command::new(&spec.exe)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::process(format!("failed to start {}: {}", spec.exe.display(), e)))?;
        info!("player started (pid {:?})", child.id());
        self.child = Some(child);

        Ok(self.connector(&spec.channel, CHANNEL_CONNECT_TIMEOUT, Some(spec.geometry)))
    }

    /// Attach to the control channel of a player that is already running.
    pub async fn attach(&mut self, channel: &str, timeout: Duration) -> bool {
        self.detach_channel();
        let connected = self.connector(channel, timeout, None).connect().await;
        self.install(connected)
    }

    fn connector(
        &mut self,
        channel: &str,
        timeout: Duration,
        geometry: Option<WindowGeometry>,
    ) -> ChannelConnector {
        self.generation += 1;
        ChannelConnector {
            generation: self.generation,
            address: channel_address(channel),
            timeout,
            poll: CHANNEL_POLL_INTERVAL,
            geometry,
        }
    }

    /// Adopt a channel opened by a [`ChannelConnector`]. Returns true if it is now live.
    ///
    /// A channel from a superseded launch, or a failed connect, is dropped.
    pub fn install(&mut self, connected: ConnectedChannel) -> bool {
        if connected.generation != self.generation {
            debug!("dropping channel from superseded launch");
            return false;
        }
        let Some((reader, writer)) = connected.halves else {
            warn!(
                "player control channel {} not reachable; running without sync",
                connected.address
            );
            return false;
        };
        info!("player control channel connected: {}", connected.address);

        let connected_flag = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let tasks = vec![
            tokio::spawn(read_loop(
                reader,
                self.pending.clone(),
                self.events.clone(),
                connected_flag.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(write_loop(
                writer,
                writer_rx,
                connected_flag.clone(),
                shutdown_rx,
            )),
        ];
        self.channel = Some(ChannelLink {
            writer: writer_tx,
            connected: connected_flag,
            shutdown: shutdown_tx,
            tasks,
        });
        if let Some(geometry) = connected.geometry {
            self.throttle.record(geometry, Instant::now());
        }

        // Reply is not needed; the subscription simply takes effect.
        drop(self.request(vec![json!("enable_event"), json!(FILE_LOADED_EVENT)]));
        true
    }

    /// Kill the player, close the channel and abandon every pending request.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.detach_channel();
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(status)) => debug!("player already exited: {}", status),
                _ => {
                    if let Err(e) = child.start_kill() {
                        warn!("failed to kill player: {}", e);
                    } else {
                        info!("player stopped");
                    }
                }
            }
        }
        self.throttle.reset();
    }

    fn detach_channel(&mut self) {
        if let Some(link) = self.channel.take() {
            let _ = link.shutdown.send(true);
            link.connected.store(false, Ordering::SeqCst);
            for task in link.tasks {
                task.abort();
            }
        }
        let abandoned: Vec<_> = lock_pending(&self.pending).drain().collect();
        if !abandoned.is_empty() {
            debug!("abandoning {} pending player requests", abandoned.len());
        }
        for (_, tx) in abandoned {
            let _ = tx.send(None);
        }
    }

    /// True when the process is alive and the control channel is up.
    pub fn is_running(&mut self) -> bool {
        let alive = match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        };
        alive && self.is_channel_connected()
    }

    pub fn is_channel_connected(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|link| link.connected.load(Ordering::SeqCst))
    }

    /// Send a command and get a handle that resolves with the reply's `data`.
    ///
    /// The handle resolves to `None` if the controller stops first.
    pub fn request(&self, command: Vec<Value>) -> oneshot::Receiver<Option<Value>> {
        let (tx, rx) = oneshot::channel();
        let Some(link) = self.channel.as_ref() else {
            let _ = tx.send(None);
            return rx;
        };
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        lock_pending(&self.pending).insert(request_id, tx);

        let line = json!({ "command": command, "request_id": request_id }).to_string();
        if link.writer.send(line).is_err() {
            if let Some(tx) = lock_pending(&self.pending).remove(&request_id) {
                let _ = tx.send(None);
            }
        }
        rx
    }

    /// Fire-and-forget; write failures are swallowed and the reply is ignored.
    pub fn command(&self, command: Vec<Value>) {
        let Some(link) = self.channel.as_ref() else {
            debug!("player channel down; dropping {:?}", command);
            return;
        };
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let line = json!({ "command": command, "request_id": request_id }).to_string();
        let _ = link.writer.send(line);
    }

    pub fn load_url(&self, url: &str) {
        self.command(vec![json!("loadfile"), json!(url), json!("replace")]);
    }

    pub fn set_pause(&self, paused: bool) {
        self.command(vec![json!("set_property"), json!("pause"), json!(paused)]);
    }

    pub fn seek_absolute(&self, seconds: f64) {
        self.command(vec![json!("seek"), json!(seconds), json!("absolute")]);
    }

    pub fn seek_relative(&self, seconds: f64) {
        self.command(vec![json!("seek"), json!(seconds), json!("relative")]);
    }

    pub fn stop_playback(&self) {
        self.command(vec![json!("stop")]);
    }

    /// Move/resize the window, subject to [`GeometryThrottle`]. Returns true if sent.
    pub fn set_geometry(
        &mut self,
        geometry: WindowGeometry,
        min_interval: Duration,
        min_delta_px: i32,
    ) -> bool {
        if !self.is_channel_connected() {
            return false;
        }
        let now = Instant::now();
        if !self
            .throttle
            .should_send(geometry, now, min_interval, min_delta_px)
        {
            return false;
        }
        self.command(vec![
            json!("set_property"),
            json!("geometry"),
            json!(geometry.to_geometry_string()),
        ]);
        self.throttle.record(geometry, now);
        true
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn launch_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args = vec![
        "--force-window=yes".to_string(),
        format!("--input-ipc-server={}", channel_address(&spec.channel)),
    ];
    if spec.borderless_on_top {
        args.push("--no-border".to_string());
        args.push("--ontop".to_string());
    }
    args.extend(
        [
            "--ytdl=yes",
            "--cache=yes",
            "--demuxer-max-bytes=150MiB",
            "--demuxer-readahead-secs=20",
            "--keep-open=yes",
        ]
        .map(String::from),
    );
    if spec.start_seconds > 0.0 && spec.start_seconds.is_finite() {
        args.push(format!("--start={:.3}", spec.start_seconds));
    }
    args.push(format!("--geometry={}", spec.geometry.to_geometry_string()));
    args.push("--".to_string());
    args.push(spec.url.clone());
    args
}

/// Per-process default channel name.
pub fn default_channel_name() -> String {
    #[cfg(unix)]
    {
        std::env::temp_dir()
            .join(format!("cinesync-mpv-{}.sock", std::process::id()))
            .display()
            .to_string()
    }
    #[cfg(not(unix))]
    {
        format!("cinesync-mpv-{}", std::process::id())
    }
}

/// OS-level address for a channel name.
pub fn channel_address(channel: &str) -> String {
    #[cfg(windows)]
    {
        if channel.starts_with(r"\\.\pipe\") {
            channel.to_string()
        } else {
            format!(r"\\.\pipe\{}", channel)
        }
    }
    #[cfg(not(windows))]
    {
        channel.to_string()
    }
}

#[cfg(unix)]
async fn open_channel(address: &str) -> std::io::Result<(ChannelReader, ChannelWriter)> {
    let stream = tokio::net::UnixStream::connect(address).await?;
    let (reader, writer) = stream.into_split();
    Ok((Box::new(reader), Box::new(writer)))
}

#[cfg(windows)]
async fn open_channel(address: &str) -> std::io::Result<(ChannelReader, ChannelWriter)> {
    let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(address)?;
    let (reader, writer) = tokio::io::split(pipe);
    Ok((Box::new(reader), Box::new(writer)))
}

#[cfg(not(any(unix, windows)))]
async fn open_channel(_address: &str) -> std::io::Result<(ChannelReader, ChannelWriter)> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "player IPC is not supported on this platform",
    ))
}

fn lock_pending(
    pending: &PendingReplies,
) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Option<Value>>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

async fn read_loop(
    reader: ChannelReader,
    pending: PendingReplies,
    events: broadcast::Sender<PlayerEvent>,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => dispatch_line(&line, &pending, &events),
                Ok(None) => {
                    info!("player control channel closed");
                    break;
                }
                Err(e) => {
                    warn!("player control channel read failed: {}", e);
                    break;
                }
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

async fn write_loop(
    mut writer: ChannelWriter,
    mut lines: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.recv() => {
                let Some(mut line) = line else { break };
                line.push('\n');
                let result = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = result {
                    debug!("player control write failed: {}", e);
                    connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

/// Route one inbound line to its pending request or to event subscribers.
fn dispatch_line(line: &str, pending: &PendingReplies, events: &broadcast::Sender<PlayerEvent>) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            debug!("skipping malformed player line: {}", e);
            return;
        }
    };
    let Some(obj) = value.as_object() else {
        debug!("skipping non-object player line");
        return;
    };

    if let Some(request_id) = obj.get("request_id").and_then(Value::as_u64) {
        let error = obj.get("error").and_then(Value::as_str).unwrap_or("success");
        if error != "success" {
            debug!("player request {} failed: {}", request_id, error);
        }
        if let Some(tx) = lock_pending(pending).remove(&request_id) {
            let data = obj.get("data").cloned().unwrap_or(Value::Null);
            let _ = tx.send(Some(data));
        }
        return;
    }

    if let Some(name) = obj.get("event").and_then(Value::as_str) {
        debug!("player event: {}", name);
        let _ = events.send(PlayerEvent {
            name: name.to_string(),
            data: value.clone(),
        });
    }
}
