//! Entity model and world state
//!
//! Remote entities are snapshots: they are replaced wholesale on every pull
//! and never edited field-by-field on the client.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::sizing::radius;
use crate::consts::*;

/// Entity identifier assigned by the remote source
pub type EntityId = String;

/// A food pellet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub id: EntityId,
    pub pos: Vec2,
    pub color: String,
    /// Money awarded on consumption
    pub value: u64,
}

/// Power-up categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerUpKind {
    #[serde(rename = "Speed Boost")]
    SpeedBoost,
    #[serde(rename = "Size Boost")]
    SizeBoost,
    #[serde(rename = "Money Multiplier")]
    MoneyMultiplier,
    Shield,
    Magnet,
    /// Kind this client does not know; still worth its value
    #[serde(other)]
    Unknown,
}

impl PowerUpKind {
    /// Whether consuming this kind grants a timed effect
    pub fn is_timed(&self) -> bool {
        !matches!(self, PowerUpKind::SizeBoost | PowerUpKind::Unknown)
    }
}

/// A power-up pellet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerUp {
    pub id: EntityId,
    pub pos: Vec2,
    pub kind: PowerUpKind,
    pub radius: f32,
    pub value: u64,
    pub color: String,
    /// Effect duration; `None` means the default
    pub duration_secs: Option<f32>,
}

/// Another player as last reported by the remote source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePlayer {
    pub id: EntityId,
    pub name: String,
    pub pos: Vec2,
    pub mass: u64,
    pub score: u64,
    pub kills: u32,
    pub is_alive: bool,
    pub color: String,
}

impl RemotePlayer {
    pub fn radius(&self) -> f32 {
        radius(self.mass)
    }
}

/// The player controlled on this device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPlayer {
    pub id: EntityId,
    pub name: String,
    pub color: String,
    pub pos: Vec2,
    /// Mass and money are the same scalar
    pub mass: u64,
    pub score: u64,
    pub kills: u32,
    pub alive: bool,
    /// Unit direction of travel (zero when idle)
    pub direction: Vec2,
}

impl LocalPlayer {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: "#4CAF50".to_string(),
            pos: Vec2::new(ARENA_WIDTH / 2.0, ARENA_HEIGHT / 2.0),
            mass: STARTING_MASS,
            score: 0,
            kills: 0,
            alive: true,
            direction: Vec2::ZERO,
        }
    }

    pub fn radius(&self) -> f32 {
        radius(self.mass)
    }

    /// Money is the mass scalar under another name
    pub fn currency(&self) -> u64 {
        self.mass
    }
}

/// Room statistics reported alongside each snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    pub players_online: u32,
    pub food_items: u32,
    pub power_ups: u32,
    pub game_mode: Option<String>,
}

/// Full authoritative copy of the room at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub players: Vec<RemotePlayer>,
    pub food: Vec<Food>,
    pub power_ups: Vec<PowerUp>,
    pub stats: GameStats,
}

/// Timed effects granted by confirmed power-ups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveEffects {
    pub speed_boost_secs: f32,
    pub money_multiplier_secs: f32,
    pub shield_secs: f32,
    pub magnet_secs: f32,
}

impl ActiveEffects {
    /// Start (or extend) the effect of a confirmed power-up.
    ///
    /// Returns false for kinds with no timed effect.
    pub fn activate(&mut self, kind: PowerUpKind, duration_secs: Option<f32>) -> bool {
        let secs = duration_secs.unwrap_or(DEFAULT_EFFECT_SECS).max(0.0);
        let timer = match kind {
            PowerUpKind::SpeedBoost => &mut self.speed_boost_secs,
            PowerUpKind::MoneyMultiplier => &mut self.money_multiplier_secs,
            PowerUpKind::Shield => &mut self.shield_secs,
            PowerUpKind::Magnet => &mut self.magnet_secs,
            PowerUpKind::SizeBoost | PowerUpKind::Unknown => return false,
        };
        *timer = (*timer).max(secs);
        true
    }

    /// Count all timers down by `dt` seconds
    pub fn decay(&mut self, dt: f32) {
        for timer in [
            &mut self.speed_boost_secs,
            &mut self.money_multiplier_secs,
            &mut self.shield_secs,
            &mut self.magnet_secs,
        ] {
            *timer = (*timer - dt).max(0.0);
        }
    }

    pub fn speed_multiplier(&self) -> f32 {
        if self.speed_boost_secs > 0.0 {
            SPEED_BOOST_FACTOR
        } else {
            1.0
        }
    }

    /// Multiplier on food value
    pub fn value_multiplier(&self) -> u64 {
        if self.money_multiplier_secs > 0.0 {
            MONEY_MULTIPLIER_FACTOR
        } else {
            1
        }
    }

    pub fn shielded(&self) -> bool {
        self.shield_secs > 0.0
    }

    /// Extra reach when testing food overlap
    pub fn food_reach(&self) -> f32 {
        if self.magnet_secs > 0.0 { MAGNET_REACH } else { 0.0 }
    }
}

/// Playable rectangle after any mode-specific shrink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub width: f32,
    pub height: f32,
    /// Distance every edge has moved inward
    pub inset: f32,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
            inset: 0.0,
        }
    }
}

impl Arena {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            inset: 0.0,
        }
    }

    /// Lowest allowed center coordinate for an avatar of `radius`
    pub fn min_corner(&self, radius: f32) -> Vec2 {
        Vec2::splat(self.inset + radius)
    }

    /// Highest allowed center coordinate for an avatar of `radius`
    pub fn max_corner(&self, radius: f32) -> Vec2 {
        Vec2::new(self.width, self.height) - Vec2::splat(self.inset + radius)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Everything the engine knows about the room
///
/// Maps are keyed by id so iteration order is stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub local: LocalPlayer,
    pub remote_players: BTreeMap<EntityId, RemotePlayer>,
    pub food: BTreeMap<EntityId, Food>,
    pub power_ups: BTreeMap<EntityId, PowerUp>,
    pub stats: GameStats,
    pub arena: Arena,
}

impl World {
    pub fn new(local: LocalPlayer, arena: Arena) -> Self {
        Self {
            local,
            remote_players: BTreeMap::new(),
            food: BTreeMap::new(),
            power_ups: BTreeMap::new(),
            stats: GameStats::default(),
            arena,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_activation_extends_to_longer_timer() {
        let mut effects = ActiveEffects::default();
        assert!(effects.activate(PowerUpKind::Shield, Some(4.0)));
        assert!(effects.activate(PowerUpKind::Shield, Some(2.0)));
        assert_eq!(effects.shield_secs, 4.0);
        assert!(effects.activate(PowerUpKind::Shield, None));
        assert_eq!(effects.shield_secs, DEFAULT_EFFECT_SECS);
    }

    #[test]
    fn test_value_only_kinds_have_no_timer() {
        let mut effects = ActiveEffects::default();
        assert!(!effects.activate(PowerUpKind::SizeBoost, Some(5.0)));
        assert!(!effects.activate(PowerUpKind::Unknown, None));
        assert_eq!(effects, ActiveEffects::default());
    }

    #[test]
    fn test_effects_expire() {
        let mut effects = ActiveEffects::default();
        effects.activate(PowerUpKind::SpeedBoost, Some(1.0));
        effects.activate(PowerUpKind::Magnet, Some(1.0));
        assert_eq!(effects.speed_multiplier(), SPEED_BOOST_FACTOR);
        assert_eq!(effects.food_reach(), MAGNET_REACH);

        effects.decay(0.6);
        assert!(effects.speed_boost_secs > 0.0);
        effects.decay(0.6);
        assert_eq!(effects.speed_multiplier(), 1.0);
        assert_eq!(effects.food_reach(), 0.0);
        assert_eq!(effects.speed_boost_secs, 0.0);
    }

    #[test]
    fn test_unknown_power_up_kind_parses() {
        let kind: PowerUpKind = serde_json::from_str("\"Teleport\"").expect("parses");
        assert_eq!(kind, PowerUpKind::Unknown);
        let kind: PowerUpKind = serde_json::from_str("\"Money Multiplier\"").expect("parses");
        assert_eq!(kind, PowerUpKind::MoneyMultiplier);
    }

    #[test]
    fn test_arena_corners_respect_inset() {
        let arena = Arena {
            width: 800.0,
            height: 600.0,
            inset: 50.0,
        };
        assert_eq!(arena.min_corner(10.0), Vec2::splat(60.0));
        assert_eq!(arena.max_corner(10.0), Vec2::new(740.0, 540.0));
    }
}
