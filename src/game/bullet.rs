//! Bullets: straight-line projectiles owned by the simulation

use std::time::{Duration, Instant};

use glam::Vec2;

use super::geometry::{Capsule, Collider};
use super::map::GameMapData;
use super::tank::PlayerId;

pub type BulletId = u64;

/// Active bullet in the world
#[derive(Debug, Clone)]
pub struct Bullet {
    pub id: BulletId,
    pub owner: PlayerId,
    pub velocity: Vec2,
    pub spawned_at: Instant,
    origin: Vec2,
    position: Vec2,
    previous: Vec2,
    /// Seconds of flight applied so far
    age: f32,
    collider: Collider,
}

impl Bullet {
    /// `direction` is expected to be unit length.
    pub fn new(
        id: BulletId,
        owner: PlayerId,
        origin: Vec2,
        direction: Vec2,
        speed: f32,
        spawned_at: Instant,
    ) -> Self {
        Self {
            id,
            owner,
            velocity: direction * speed,
            spawned_at,
            origin,
            position: origin,
            previous: origin,
            age: 0.0,
            collider: Collider::Capsule(Capsule::from_segment(origin, origin, 0.0)),
        }
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Unit flight direction
    pub fn direction(&self) -> Vec2 {
        self.velocity.normalize_or_zero()
    }

    /// Where the bullet is `t` seconds after spawning
    pub fn position_after(&self, t: f32) -> Vec2 {
        self.origin + self.velocity * t
    }

    /// Fly for `dt` more seconds. Position is recomputed from the spawn point
    /// so rounding does not accumulate across ticks.
    pub fn advance(&mut self, dt: f32) {
        self.previous = self.position;
        self.age += dt;
        self.position = self.position_after(self.age);
    }

    pub fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.spawned_at) > lifetime
    }

    /// Expired, or flown off the map
    pub fn is_spent(&self, now: Instant, lifetime: Duration, map: &GameMapData) -> bool {
        self.is_expired(now, lifetime) || map.is_out_of_bounds(self.position)
    }

    /// Rebuild the collider as a capsule over the path flown in the last advance.
    pub fn sync_collider(&mut self, radius: f32) {
        self.collider = Collider::Capsule(Capsule::from_segment(self.previous, self.position, radius));
    }

    pub fn collider(&self) -> &Collider {
        &self.collider
    }
}
