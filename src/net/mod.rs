//! Remote API boundary
//!
//! The engine only ever talks to the authoritative server through
//! [`RemoteApi`]. Every call returns a `'static` local future so it can be
//! spawned fire-and-forget from inside the frame loop.

#[cfg(target_arch = "wasm32")]
pub mod http;
pub mod loopback;
pub mod wire;

use futures::future::LocalBoxFuture;
use glam::Vec2;
use thiserror::Error;

use crate::config::GameMode;
use crate::sim::{EntityId, PowerUp, WorldSnapshot};

#[cfg(target_arch = "wasm32")]
pub use http::HttpApi;
pub use loopback::LoopbackArena;

/// Identifier of a joined room
pub type SessionId = String;

/// Errors a remote call can end with
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetError {
    /// Network unreachable, timed out, or a non-success status
    #[error("transport failure: {0}")]
    Transport(String),
    /// Response body did not have the expected shape
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server no longer knows this session or player
    #[error("invalid session: {0}")]
    InvalidSession(String),
}

impl NetError {
    /// Every remote failure is retried on the next cadence boundary
    pub fn is_retryable(&self) -> bool {
        true
    }
}

impl From<serde_json::Error> for NetError {
    fn from(e: serde_json::Error) -> Self {
        NetError::Protocol(e.to_string())
    }
}

/// Result of a remote call
pub type NetResult<T> = Result<T, NetError>;

/// Future returned by every [`RemoteApi`] call
pub type NetFuture<T> = LocalBoxFuture<'static, NetResult<T>>;

/// Which entity set a consumption notification refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumedKind {
    Food,
    PowerUp,
}

/// Room joined by `create_or_join`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedSession {
    pub session_id: SessionId,
    pub snapshot: WorldSnapshot,
}

/// Server answer to a consumption notification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumeAck {
    /// Money the server credited for food
    pub points_earned: Option<u64>,
    /// Power-ups the server agrees were consumed; their effects may start
    pub applied_effects: Vec<PowerUp>,
}

/// Server arbitration of a player-vs-player contact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionAck {
    pub kills: u32,
    pub deaths: u32,
    pub mass_gained: u64,
    pub is_alive: bool,
}

/// The authoritative game server as seen by the client engine
pub trait RemoteApi {
    /// Find a room for `mode` (or create one) and join it
    fn create_or_join(&self, mode: GameMode, player_id: &str) -> NetFuture<JoinedSession>;

    /// Fetch the full room state
    fn pull_snapshot(&self, session_id: &str) -> NetFuture<WorldSnapshot>;

    /// Report the local player's position and mass
    fn push_position(&self, session_id: &str, player_id: &str, pos: Vec2, mass: u64)
    -> NetFuture<()>;

    /// Report entities the local player consumed
    fn notify_consumed(
        &self,
        session_id: &str,
        player_id: &str,
        kind: ConsumedKind,
        ids: Vec<EntityId>,
    ) -> NetFuture<ConsumeAck>;

    /// Ask the server to arbitrate contact with `other_id`
    fn notify_collision(
        &self,
        session_id: &str,
        player_id: &str,
        other_id: &str,
    ) -> NetFuture<CollisionAck>;

    /// Leave the room
    fn leave(&self, session_id: &str, player_id: &str) -> NetFuture<()>;
}
