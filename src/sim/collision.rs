//! Collision detection and outcome resolution for the local player
//!
//! One pass scans food, power-ups and other players against the local
//! avatar. The scan is read-only; gains are applied afterwards in one step
//! so every consumption in a tick lands before the next render.

use glam::Vec2;

use super::sizing::radius;
use super::state::{EntityId, LocalPlayer, World};
use crate::consts::*;

/// Outcome of two avatars touching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contest {
    /// The local player absorbs the other
    Eat,
    /// The other absorbs the local player
    Eaten,
    /// Sizes within the margin: nothing happens
    Standoff,
}

/// Decide who eats whom. Strict comparisons: exactly 1.2× is a standoff.
pub fn contest(player_radius: f32, other_radius: f32) -> Contest {
    if player_radius > other_radius * EAT_RATIO {
        Contest::Eat
    } else if other_radius > player_radius * EAT_RATIO {
        Contest::Eaten
    } else {
        Contest::Standoff
    }
}

/// Mass transferred when eating a player: floor(mass * 0.8)
#[inline]
pub fn mass_gained_from(victim_mass: u64) -> u64 {
    victim_mass / EAT_TRANSFER_DEN * EAT_TRANSFER_NUM
        + victim_mass % EAT_TRANSFER_DEN * EAT_TRANSFER_NUM / EAT_TRANSFER_DEN
}

/// Circle overlap test
#[inline]
pub fn overlaps(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    a.distance(b) < ra + rb
}

/// Effect state that changes how collisions resolve
#[derive(Debug, Clone, Copy)]
pub struct Modifiers {
    /// Multiplier on food value (money multiplier power-up)
    pub value_multiplier: u64,
    /// Extra food pickup reach (magnet power-up)
    pub food_reach: f32,
    /// Shield blocks being eaten
    pub shielded: bool,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            value_multiplier: 1,
            food_reach: 0.0,
            shielded: false,
        }
    }
}

/// A consumed entity and the mass it awarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub id: EntityId,
    pub mass: u64,
}

/// Everything one resolution pass decided
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub food: Vec<Hit>,
    pub power_ups: Vec<Hit>,
    /// Players eaten this pass, in id order
    pub players: Vec<Hit>,
    /// Set when a larger player ate the local avatar
    pub eaten_by: Option<EntityId>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.food.is_empty()
            && self.power_ups.is_empty()
            && self.players.is_empty()
            && self.eaten_by.is_none()
    }

    /// Total mass (and money) gained
    pub fn mass_gain(&self) -> u64 {
        self.food
            .iter()
            .chain(&self.power_ups)
            .chain(&self.players)
            .map(|h| h.mass)
            .sum()
    }

    pub fn kills(&self) -> u32 {
        self.players.len() as u32
    }

    pub fn died(&self) -> bool {
        self.eaten_by.is_some()
    }
}

/// Scan the world for everything the local player touches this tick
pub fn resolve(world: &World, modifiers: &Modifiers) -> Resolution {
    let mut out = Resolution::default();
    let local = &world.local;
    if !local.alive {
        return out;
    }

    let player_radius = radius(local.mass);

    for food in world.food.values() {
        if overlaps(local.pos, player_radius + modifiers.food_reach, food.pos, FOOD_RADIUS) {
            out.food.push(Hit {
                id: food.id.clone(),
                mass: food.value.saturating_mul(modifiers.value_multiplier),
            });
        }
    }

    for power_up in world.power_ups.values() {
        if overlaps(local.pos, player_radius, power_up.pos, power_up.radius) {
            out.power_ups.push(Hit {
                id: power_up.id.clone(),
                mass: power_up.value,
            });
        }
    }

    for other in world.remote_players.values() {
        if !other.is_alive || other.id == local.id {
            continue;
        }
        let other_radius = radius(other.mass);
        if !overlaps(local.pos, player_radius, other.pos, other_radius) {
            continue;
        }
        match contest(player_radius, other_radius) {
            Contest::Eat => out.players.push(Hit {
                id: other.id.clone(),
                mass: mass_gained_from(other.mass),
            }),
            Contest::Eaten if !modifiers.shielded => {
                out.eaten_by = Some(other.id.clone());
                break;
            }
            Contest::Eaten | Contest::Standoff => {}
        }
    }

    out
}

/// Apply a resolution to the local player in one step
pub fn apply(local: &mut LocalPlayer, resolution: &Resolution, score_multiplier: u64) {
    let gain = resolution.mass_gain();
    local.mass = local.mass.saturating_add(gain);
    local.score = local
        .score
        .saturating_add(gain.saturating_mul(score_multiplier));
    local.kills = local.kills.saturating_add(resolution.kills());
    if resolution.died() {
        local.alive = false;
    }
}
