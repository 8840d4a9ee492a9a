//! Tank movement and tank-vs-tank separation

use glam::Vec2;

use super::geometry::{circle_circle, Circle};
use super::tank::InputFlags;

/// Tank movement constants
#[derive(Debug, Clone, Copy)]
pub struct TankStats {
    /// Forward speed in world units per second
    pub speed: f32,
    /// Turn rate in degrees per second
    pub turn_rate: f32,
    /// Backward speed as a fraction of forward speed
    pub backward_factor: f32,
    /// Hitbox radius
    pub hitbox_radius: f32,
}

impl TankStats {
    pub const DEFAULT: Self = Self {
        speed: 120.0,
        turn_rate: 180.0,
        backward_factor: 0.6,
        hitbox_radius: 15.0,
    };
}

impl Default for TankStats {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Normalize an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(degrees: f32) -> f32 {
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Unit heading for an angle in degrees
pub fn heading(rotation_degrees: f32) -> Vec2 {
    Vec2::from_angle(rotation_degrees.to_radians())
}

/// Physics system for tank movement
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Turn first, then translate along the post-turn heading.
    /// Returns (new_position, new_rotation); the position is not clamped.
    pub fn drive(
        position: Vec2,
        rotation: f32,
        input: &InputFlags,
        dt: f32,
        stats: &TankStats,
    ) -> (Vec2, f32) {
        let mut turn = 0.0;
        if input.turn_left {
            turn -= 1.0;
        }
        if input.turn_right {
            turn += 1.0;
        }
        let new_rotation = normalize_degrees(rotation + turn * stats.turn_rate * dt);

        let mut throttle = 0.0;
        if input.forward {
            throttle += 1.0;
        }
        if input.backward {
            throttle -= stats.backward_factor;
        }

        let new_position = position + heading(new_rotation) * throttle * stats.speed * dt;
        (new_position, new_rotation)
    }

    /// Check collision between two tank bodies
    pub fn check_tank_collision(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
        circle_circle(&Circle::new(a, radius_a), &Circle::new(b, radius_b))
    }

    /// Resolve collision between two tanks (pushes them apart)
    /// Returns (new_a, new_b)
    pub fn resolve_tank_collision(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> (Vec2, Vec2) {
        let delta = b - a;
        let dist = delta.length();

        if dist < 0.001 {
            // Same position, push apart arbitrarily
            return (a - Vec2::X * radius_a, b + Vec2::X * radius_b);
        }

        let overlap = radius_a + radius_b - dist;
        if overlap <= 0.0 {
            return (a, b);
        }

        // Push apart by half the overlap each, plus a small buffer
        let push = delta / dist * (overlap / 2.0 + 0.1);
        (a - push, b + push)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn normalize_wraps_both_directions() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_approx_eq!(normalize_degrees(-90.0), 270.0);
        assert_approx_eq!(normalize_degrees(725.0), 5.0, 1e-3);
        assert_eq!(normalize_degrees(-1e-9), 0.0);
    }

    #[test]
    fn drive_turns_before_moving() {
        let input = InputFlags {
            forward: true,
            turn_right: true,
            ..InputFlags::default()
        };
        let stats = TankStats {
            speed: 100.0,
            turn_rate: 90.0,
            ..TankStats::DEFAULT
        };

        let (position, rotation) = PhysicsSystem::drive(Vec2::ZERO, 0.0, &input, 1.0, &stats);

        // Heading after the turn is 90 degrees, so the whole move is along +y.
        assert_approx_eq!(rotation, 90.0);
        assert_approx_eq!(position.x, 0.0, 1e-3);
        assert_approx_eq!(position.y, 100.0, 1e-3);
    }

    #[test]
    fn backward_is_damped() {
        let input = InputFlags {
            backward: true,
            ..InputFlags::default()
        };
        let stats = TankStats::DEFAULT;

        let (position, _) = PhysicsSystem::drive(Vec2::ZERO, 0.0, &input, 1.0, &stats);

        assert_approx_eq!(position.x, -stats.speed * stats.backward_factor, 1e-3);
    }

    #[test]
    fn overlapping_tanks_are_separated() {
        let (a, b) =
            PhysicsSystem::resolve_tank_collision(Vec2::ZERO, 15.0, Vec2::new(20.0, 0.0), 15.0);

        assert!(!PhysicsSystem::check_tank_collision(a, 15.0, b, 15.0));
        assert_approx_eq!(a.y, 0.0);
        assert_approx_eq!(b.y, 0.0);
    }
}
