//! Local player movement
//!
//! Advances the local avatar along its direction vector and keeps it inside
//! the arena. Pure and deterministic so it can be replayed in tests.

use glam::Vec2;

use super::sizing::{radius, speed};
use super::state::Arena;

/// Result of one integration step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub pos: Vec2,
    /// Direction after any wall bounce
    pub direction: Vec2,
    /// True if either axis hit a wall this step
    pub bounced: bool,
}

/// Movement parameters that do not come from the player itself
#[derive(Debug, Clone, Copy)]
pub struct Motion {
    /// Elapsed time in reference frames
    pub tick_scale: f32,
    /// Product of mode and power-up speed multipliers
    pub speed_multiplier: f32,
    /// Fraction of the offending direction component kept after a bounce
    pub bounce_damping: f32,
}

/// Advance a position by one tick
pub fn integrate(pos: Vec2, direction: Vec2, mass: u64, arena: &Arena, motion: &Motion) -> Step {
    let r = radius(mass);
    let velocity = direction * speed(r) * motion.speed_multiplier * motion.tick_scale.max(0.0);
    let (pos, hit) = clamp_to_arena(pos + velocity, r, arena);

    let mut direction = direction;
    if hit.x {
        direction.x = -direction.x * motion.bounce_damping;
    }
    if hit.y {
        direction.y = -direction.y * motion.bounce_damping;
    }

    Step {
        pos,
        direction,
        bounced: hit.x || hit.y,
    }
}

/// Which axes were clamped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WallHit {
    pub x: bool,
    pub y: bool,
}

/// Clamp a center position to `[radius, size - radius]` on both axes.
///
/// An axis narrower than the avatar pins it to the arena center.
pub fn clamp_to_arena(pos: Vec2, radius: f32, arena: &Arena) -> (Vec2, WallHit) {
    let lo = arena.min_corner(radius);
    let hi = arena.max_corner(radius);
    let center = arena.center();

    let (x, hit_x) = clamp_axis(pos.x, lo.x, hi.x, center.x);
    let (y, hit_y) = clamp_axis(pos.y, lo.y, hi.y, center.y);
    (Vec2::new(x, y), WallHit { x: hit_x, y: hit_y })
}

fn clamp_axis(v: f32, lo: f32, hi: f32, center: f32) -> (f32, bool) {
    if lo > hi {
        return (center, v != center);
    }
    if v < lo {
        (lo, true)
    } else if v > hi {
        (hi, true)
    } else {
        (v, false)
    }
}
