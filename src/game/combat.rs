//! Combat system - weapon stats, hit detection, damage

use std::time::Duration;

use super::bullet::{Bullet, BulletId};
use super::geometry::Collider;
use super::tank::PlayerId;

/// Weapon stats shared by every tank
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Damage per hit
    pub damage: i32,
    /// Bullet speed in world units per second
    pub bullet_speed: f32,
    /// Minimum time between two shots from one tank
    pub cooldown: Duration,
    /// Bullet lifetime
    pub bullet_lifetime: Duration,
    /// Bullet hitbox radius
    pub bullet_radius: f32,
}

impl WeaponStats {
    pub const DEFAULT: Self = Self {
        damage: 25,
        bullet_speed: 500.0,
        cooldown: Duration::from_millis(500),
        bullet_lifetime: Duration::from_millis(2_000),
        bullet_radius: 4.0,
    };
}

impl Default for WeaponStats {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A bullet that connected with a tank this tick
#[derive(Debug, Clone, PartialEq)]
pub struct HitResult {
    pub bullet_id: BulletId,
    pub shooter_id: PlayerId,
    pub target_id: PlayerId,
    pub damage: i32,
}

/// Combat system for hit detection
pub struct CombatSystem;

impl CombatSystem {
    /// First target the bullet overlaps, never its own shooter.
    /// Targets must carry colliders synced this tick.
    pub fn find_target(bullet: &Bullet, targets: &[(PlayerId, Collider)]) -> Option<PlayerId> {
        targets
            .iter()
            .filter(|(id, _)| *id != bullet.owner)
            .find(|(_, collider)| bullet.collider().intersects(collider))
            .map(|(id, _)| *id)
    }

    /// Collect hits for every live bullet. Each bullet hits at most once.
    pub fn detect_hits(
        bullets: &[Bullet],
        targets: &[(PlayerId, Collider)],
        stats: &WeaponStats,
    ) -> Vec<HitResult> {
        bullets
            .iter()
            .filter_map(|bullet| {
                Self::find_target(bullet, targets).map(|target_id| HitResult {
                    bullet_id: bullet.id,
                    shooter_id: bullet.owner,
                    target_id,
                    damage: stats.damage,
                })
            })
            .collect()
    }
}
