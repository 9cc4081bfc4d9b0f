//! Async shell around [`SessionCore`]: owns the server link and its loops.
//!
//! Each connection runs three tasks (receive, write, stats) that share one
//! `watch` shutdown signal. Only the receive task mutates session state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cinesync_common::helpers::clamp_room_size;
use cinesync_common::{ClientMessage, Error, Result, ServerMessage};
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, warn};

use crate::helpers::{ConsentStore, HttpUrlNormalizer, MemoryConsentStore, UrlNormalizer};
use crate::session::{Effect, SessionCore};
use crate::signaling::{SignalReceiver, SignalSender, SignalingClient};
use crate::types::{
    ConnectionStats, ConnectionStatus, PendingConsent, RoomState, SessionConfig, SessionEvent,
    SessionIdentity, CONNECT_TIMEOUT,
};

struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    shutdown: watch::Sender<bool>,
}

struct Inner {
    config: SessionConfig,
    core: Mutex<SessionCore>,
    status: Mutex<ConnectionStatus>,
    link: Mutex<Option<Link>>,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<SessionEvent>,
    normalizer: Arc<dyn UrlNormalizer>,
    consent_store: Arc<dyn ConsentStore>,
}

/// Room session client. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<Inner>,
}

impl SessionClient {
    pub fn new(config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::with_collaborators(
            config,
            Arc::new(HttpUrlNormalizer),
            Arc::new(MemoryConsentStore),
        )
    }

    pub fn with_collaborators(
        config: SessionConfig,
        normalizer: Arc<dyn UrlNormalizer>,
        consent_store: Arc<dyn ConsentStore>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let core = SessionCore::new(config.default_room_width, config.default_room_height)
            .with_state_throttle(config.state_throttle);
        let inner = Arc::new(Inner {
            config,
            core: Mutex::new(core),
            status: Mutex::new(ConnectionStatus::Disconnected),
            link: Mutex::new(None),
            generation: AtomicU64::new(0),
            events,
            normalizer,
            consent_store,
        });
        (Self { inner }, events_rx)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.lock_status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn room_state(&self) -> RoomState {
        self.inner.lock_core().room().clone()
    }

    pub fn identity(&self) -> SessionIdentity {
        self.inner.lock_core().identity().clone()
    }

    pub fn pending_consent(&self) -> Option<PendingConsent> {
        self.inner.lock_core().pending_consent().cloned()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.inner.lock_core().stats()
    }

    pub fn last_seen_media_id(&self) -> Option<String> {
        self.inner
            .lock_core()
            .last_seen_media_id()
            .map(str::to_string)
    }

    /// Open the server link. A no-op when already open or opening.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut status = self.inner.lock_status();
            if *status != ConnectionStatus::Disconnected {
                drop(status);
                self.inner.notice("already connected");
                return Ok(());
            }
            *status = ConnectionStatus::Connecting;
        }
        self.inner
            .emit(SessionEvent::StatusChanged(ConnectionStatus::Connecting));

        let server = self.inner.config.server.clone();
        info!("connecting to sync server: {}", server);
        let client = match time::timeout(CONNECT_TIMEOUT, SignalingClient::connect(&server)).await
        {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(self.fail_connect(e)),
            Err(_) => {
                return Err(self.fail_connect(Error::timeout(format!("connect {}", server))));
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        {
            let mut status = self.inner.lock_status();
            if *status != ConnectionStatus::Connecting {
                info!("connect abandoned by disconnect");
                return Ok(());
            }
            *status = ConnectionStatus::Connected;
            self.inner.lock_core().reset();
            *self.inner.lock_link() = Some(Link {
                generation,
                outbound: outbound_tx.clone(),
                shutdown: shutdown_tx,
            });
        }
        info!("sync server connected");
        self.inner
            .emit(SessionEvent::StatusChanged(ConnectionStatus::Connected));

        let (sender, receiver) = client.split();
        tokio::spawn(write_loop(sender, outbound_rx, shutdown_rx.clone()));
        tokio::spawn(stats_loop(
            outbound_tx,
            self.inner.config.stats_interval,
            shutdown_rx.clone(),
        ));
        tokio::spawn(receive_loop(
            self.inner.clone(),
            receiver,
            shutdown_rx,
            generation,
        ));
        Ok(())
    }

    fn fail_connect(&self, err: Error) -> Error {
        warn!("failed to connect: {}", err);
        *self.inner.lock_status() = ConnectionStatus::Disconnected;
        self.inner.notice(format!("Connection failed: {}", err));
        self.inner
            .emit(SessionEvent::StatusChanged(ConnectionStatus::Disconnected));
        err
    }

    /// Stop all loops, close the link and reset every session-scoped field.
    pub fn disconnect(&self) {
        let link = self.inner.lock_link().take();
        if let Some(link) = link {
            let _ = link.shutdown.send(true);
            info!("disconnected from sync server");
        }
        self.inner.reset_to_disconnected();
    }

    /// Ask the server to create a room around `url`.
    pub fn host(&self, url: &str) -> Result<bool> {
        let url = self.normalize(url)?;
        let (width, height) = self.inner.lock_core().default_room_size();
        Ok(self.send(ClientMessage::Host { url, width, height }))
    }

    /// Join a room, connecting first if needed.
    pub async fn join(&self, room_code: &str) -> Result<bool> {
        let room_code = room_code.trim();
        if room_code.is_empty() {
            let err = Error::validation("room code is empty");
            self.inner.notice(err.to_string());
            return Err(err);
        }
        if self.status() == ConnectionStatus::Disconnected {
            self.connect().await?;
        }
        Ok(self.send(ClientMessage::Join {
            room_code: room_code.to_string(),
        }))
    }

    /// Leave the current room. Local membership is dropped even when offline.
    pub fn leave(&self) -> bool {
        let sent = self.send(ClientMessage::Leave);
        let had_room = self.inner.lock_core().leave_room();
        if had_room {
            self.inner
                .emit(SessionEvent::RoomChanged(SessionIdentity::default()));
        }
        sent
    }

    pub fn set_playing(&self, is_playing: bool) -> bool {
        self.send(ClientMessage::Play { is_playing })
    }

    pub fn seek(&self, seconds: f64) -> bool {
        let position_seconds = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
        self.send(ClientMessage::Seek { position_seconds })
    }

    pub fn push_url(&self, url: &str) -> Result<bool> {
        let url = self.normalize(url)?;
        Ok(self.send(ClientMessage::PushUrl { url }))
    }

    pub fn send_ready(&self, media_id: &str) -> bool {
        self.send(ClientMessage::Ready {
            media_id: media_id.to_string(),
        })
    }

    pub fn set_room_layout(&self, width: i64, height: i64) -> bool {
        let (width, height) = clamp_room_size(width, height);
        self.send(ClientMessage::Layout { width, height })
    }

    /// Resolve the pending consent. Returns the media that was waiting, if any.
    pub fn acknowledge_consent(&self, accepted: bool) -> Option<PendingConsent> {
        let consent = self.inner.lock_core().resolve_consent(accepted)?;
        if accepted {
            if let Err(e) = self.inner.consent_store.record_consent(&consent.url) {
                warn!("failed to persist consent: {}", e);
            }
        }
        info!(
            "consent {} for {}",
            if accepted { "granted" } else { "declined" },
            consent.url
        );
        self.inner.emit(SessionEvent::ConsentResolved {
            accepted,
            consent: consent.clone(),
        });
        Some(consent)
    }

    fn normalize(&self, raw: &str) -> Result<String> {
        self.inner.normalizer.normalize(raw).inspect_err(|e| {
            self.inner.notice(e.to_string());
        })
    }

    fn send(&self, msg: ClientMessage) -> bool {
        self.inner.send(msg)
    }
}

impl Inner {
    fn lock_core(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_status(&self) -> MutexGuard<'_, ConnectionStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn notice(&self, text: impl Into<String>) {
        self.emit(SessionEvent::Notice(text.into()));
    }

    fn send(&self, msg: ClientMessage) -> bool {
        let guard = self.lock_link();
        match guard.as_ref() {
            Some(link) => link.outbound.send(msg).is_ok(),
            None => {
                debug!("not connected; dropping {:?}", msg);
                false
            }
        }
    }

    fn handle(&self, msg: ServerMessage) {
        debug!("server message: {}", msg.kind());
        let effects = self.lock_core().apply(msg, Instant::now());
        for effect in effects {
            match effect {
                Effect::Reply(reply) => {
                    self.send(reply);
                }
                Effect::Notify(event) => self.emit(event),
            }
        }
    }

    /// Transport loss: tear down only if `generation` is still the live link.
    fn drop_link(&self, generation: u64, reason: String) {
        {
            let mut link = self.lock_link();
            match link.as_ref() {
                Some(current) if current.generation == generation => {
                    if let Some(current) = link.take() {
                        let _ = current.shutdown.send(true);
                    }
                }
                _ => return,
            }
        }
        self.notice(reason);
        self.reset_to_disconnected();
    }

    fn reset_to_disconnected(&self) {
        self.lock_core().reset();
        let was = std::mem::replace(&mut *self.lock_status(), ConnectionStatus::Disconnected);
        if was != ConnectionStatus::Disconnected {
            self.emit(SessionEvent::StatusChanged(ConnectionStatus::Disconnected));
        }
    }
}

async fn receive_loop(
    inner: Arc<Inner>,
    mut receiver: SignalReceiver,
    mut shutdown: watch::Receiver<bool>,
    generation: u64,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("receive loop cancelled");
                break;
            }
            result = receiver.recv() => match result {
                Ok(msg) => inner.handle(msg),
                Err(e) => {
                    warn!("sync connection lost: {}", e);
                    inner.drop_link(generation, format!("Connection lost: {}", e));
                    break;
                }
            }
        }
    }
}

async fn write_loop(
    mut sender: SignalSender,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            msg = outbound.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = sender.send(&msg).await {
                        warn!("failed to send {:?}: {}", msg, e);
                        break;
                    }
                }
                None => break,
            }
        }
    }
    sender.close().await;
}

async fn stats_loop(
    outbound: mpsc::UnboundedSender<ClientMessage>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(every);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if outbound.send(ClientMessage::Stats).is_err() {
                    break;
                }
            }
        }
    }
}
