//! Blob Arena - client engine for a money-driven blob arena
//!
//! Core modules:
//! - `sim`: Deterministic local simulation (sizing, movement, collisions, reconciliation log)
//! - `net`: Remote API boundary (wire types, browser fetch client, loopback arena)
//! - `session`: Push/pull cadence and session state machine
//! - `engine`: Per-frame tick scheduler that owns the world
//! - `config`: Engine configuration and game modes

pub mod config;
pub mod engine;
pub mod net;
pub mod session;
pub mod sim;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::{EngineConfig, GameMode};
pub use engine::{Engine, EngineEvent, TickInput};
pub use session::SessionState;

use glam::Vec2;

/// Game balance constants
pub mod consts {
    /// Reference frame duration; one "tick" of movement at 60 Hz
    pub const FRAME_MS: f64 = 1000.0 / 60.0;
    /// Largest tick scale applied after a long stall (tab hidden, GC pause)
    pub const MAX_TICK_SCALE: f32 = 3.0;

    /// Radius of a massless avatar
    pub const MIN_RADIUS: f32 = 10.0;
    /// Mass per squared unit of radius growth
    pub const MASS_SCALE: f32 = 10.0;

    /// Speed of a zero-radius avatar (pixels per tick)
    pub const BASE_SPEED: f32 = 4.0;
    /// Speed lost per unit of radius
    pub const SPEED_DRAG: f32 = 0.05;
    /// Nothing moves slower than this
    pub const SPEED_FLOOR: f32 = 1.0;

    /// Food pellets are drawn and tested at a fixed radius
    pub const FOOD_RADIUS: f32 = 5.0;

    /// Size margin one avatar needs over another to eat it
    pub const EAT_RATIO: f32 = 1.2;
    /// Share of the victim's mass transferred to the eater (as 4/5)
    pub const EAT_TRANSFER_NUM: u64 = 4;
    pub const EAT_TRANSFER_DEN: u64 = 5;

    /// Arena dimensions
    pub const ARENA_WIDTH: f32 = 800.0;
    pub const ARENA_HEIGHT: f32 = 600.0;
    /// Royale shrink never takes the arena below this on either axis
    pub const MIN_ARENA_SIZE: f32 = 200.0;

    /// Starting mass/money for a fresh player
    pub const STARTING_MASS: u64 = 100;

    /// Power-up tuning
    pub const DEFAULT_EFFECT_SECS: f32 = 10.0;
    pub const SPEED_BOOST_FACTOR: f32 = 1.5;
    pub const MONEY_MULTIPLIER_FACTOR: u64 = 2;
    pub const MAGNET_REACH: f32 = 30.0;
}

/// Unit vector pointing from `from` toward `to`; zero when they coincide
#[inline]
pub fn direction_toward(from: Vec2, to: Vec2) -> Vec2 {
    (to - from).normalize_or_zero()
}

/// Current wall-clock time in milliseconds
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or_else(js_sys::Date::now)
}

/// Current wall-clock time in milliseconds
#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}
