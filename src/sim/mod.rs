//! Deterministic local simulation
//!
//! Everything the client predicts on its own lives here:
//! - Pure sizing and speed laws
//! - Fixed-order integration and collision resolution
//! - The log of optimistic changes awaiting confirmation
//! - No networking, rendering or platform dependencies

pub mod collision;
pub mod integrate;
pub mod reconcile;
pub mod sizing;
pub mod state;

pub use collision::{Contest, Hit, Modifiers, Resolution, contest, mass_gained_from, resolve};
pub use integrate::{Motion, Step, clamp_to_arena, integrate};
pub use reconcile::{Change, Pending, ReconcileLog, Settlement, Target, UNDECIDED};
pub use sizing::{radius, speed};
pub use state::{
    ActiveEffects, Arena, EntityId, Food, GameStats, LocalPlayer, PowerUp, PowerUpKind,
    RemotePlayer, World, WorldSnapshot,
};
