pub mod client;
pub mod helpers;
pub mod placement;
pub mod player;
pub mod session;
pub mod signaling;
pub mod types;

pub use client::SessionClient;
pub use helpers::{ConsentStore, HttpUrlNormalizer, MemoryConsentStore, UrlNormalizer};
pub use placement::{Anchor, FrameInput, PlacementConfig, PlacementEngine, PlayerPose, Projector};
pub use player::{LaunchSpec, PlayerController, PlayerEvent};
pub use session::{Effect, SessionCore};
pub use types::{
    ConnectionStats, ConnectionStatus, PendingConsent, RoomState, SessionConfig, SessionEvent,
    SessionIdentity, WindowGeometry,
};
