//! Mass → radius → speed laws
//!
//! Growth is sub-linear in mass and every unit of radius costs speed.
//! These two curves are the core balancing rule of the game.

use crate::consts::*;

/// Visual and collision radius for a given mass
#[inline]
pub fn radius(mass: u64) -> f32 {
    MIN_RADIUS + (mass as f32 / MASS_SCALE).sqrt()
}

/// Movement speed (pixels per tick) for a given radius
#[inline]
pub fn speed(radius: f32) -> f32 {
    (BASE_SPEED - radius * SPEED_DRAG).max(SPEED_FLOOR)
}

/// Mass an avatar of `radius` would have (inverse of [`radius`], rounded)
pub fn mass_for_radius(radius: f32) -> u64 {
    let growth = (radius - MIN_RADIUS).max(0.0);
    (growth * growth * MASS_SCALE).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_radius_of_small_player() {
        assert_eq!(radius(0), MIN_RADIUS);
        assert!((radius(10) - 11.0).abs() < 1e-5);
        assert!((radius(1000) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_speed_floor() {
        assert!((speed(11.0) - 3.45).abs() < 1e-5);
        assert_eq!(speed(60.0), SPEED_FLOOR);
        assert_eq!(speed(500.0), SPEED_FLOOR);
    }

    #[test]
    fn test_mass_for_radius_inverts_radius() {
        assert_eq!(mass_for_radius(20.0), 1000);
        assert_eq!(mass_for_radius(15.0), 250);
        assert_eq!(mass_for_radius(18.0), 640);
        assert_eq!(mass_for_radius(5.0), 0);
    }

    proptest! {
        #[test]
        fn radius_is_monotonic(a in 0u64..10_000_000, b in 0u64..10_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(radius(lo) <= radius(hi));
            prop_assert!(radius(lo) >= MIN_RADIUS);
        }

        #[test]
        fn speed_never_below_floor(r in 0.0f32..10_000.0) {
            prop_assert!(speed(r) >= SPEED_FLOOR);
            prop_assert!(speed(r) <= BASE_SPEED);
        }
    }
}
