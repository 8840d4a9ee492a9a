//! Tanks: the player-controlled entities

use std::time::{Duration, Instant};

use glam::Vec2;

use super::geometry::{Circle, Collider};
use super::map::GameMapData;
use super::physics::{heading, normalize_degrees, PhysicsSystem, TankStats};

pub type PlayerId = u32;

/// Tank paint, sent to clients as three bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Held movement keys, as last reported by the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFlags {
    pub forward: bool,
    pub backward: bool,
    pub turn_left: bool,
    pub turn_right: bool,
}

/// Respawns a tank has left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lives {
    Unlimited,
    Limited(u32),
}

impl Lives {
    pub fn has_respawn(&self) -> bool {
        !matches!(self, Lives::Limited(0))
    }

    /// Use up one respawn
    pub fn spend(&mut self) {
        if let Lives::Limited(n) = self {
            *n = n.saturating_sub(1);
        }
    }

    /// Wire value; unlimited is sent as -1
    pub fn as_wire(&self) -> i64 {
        match self {
            Lives::Unlimited => -1,
            Lives::Limited(n) => i64::from(*n),
        }
    }
}

/// Authoritative tank state
#[derive(Debug, Clone)]
pub struct Tank {
    pub id: PlayerId,
    pub name: String,
    pub color: Color,
    pub position: Vec2,
    /// Degrees in `[0, 360)`; use `set_rotation` to keep it normalized
    rotation: f32,
    pub hit_points: i32,
    pub last_shot: Option<Instant>,
    pub death_time: Option<Instant>,
    pub input: InputFlags,
    pub lives: Lives,
    pub kills: u32,
    /// Joined mid-round in a mode that makes late joiners wait
    pub spectating: bool,
    collider: Collider,
}

impl Tank {
    pub fn new(
        id: PlayerId,
        name: String,
        color: Color,
        position: Vec2,
        rotation: f32,
        hit_points: i32,
        lives: Lives,
    ) -> Self {
        let mut tank = Self {
            id,
            name,
            color,
            position,
            rotation: normalize_degrees(rotation),
            hit_points: hit_points.max(0),
            last_shot: None,
            death_time: None,
            input: InputFlags::default(),
            lives,
            kills: 0,
            spectating: false,
            collider: Collider::Circle(Circle::new(position, TankStats::DEFAULT.hitbox_radius)),
        };
        tank.sync_collider();
        tank
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = normalize_degrees(degrees);
    }

    pub fn is_destroyed(&self) -> bool {
        self.hit_points == 0
    }

    /// Takes part in movement and collision
    pub fn is_active(&self) -> bool {
        !self.is_destroyed() && !self.spectating
    }

    /// Destroyed with no respawns left
    pub fn is_eliminated(&self) -> bool {
        self.is_destroyed() && !self.lives.has_respawn()
    }

    /// Apply held keys for `dt` seconds, clamped to the map.
    pub fn apply_input(&mut self, dt: f32, map: &GameMapData) {
        if !self.is_active() {
            return;
        }
        let stats = TankStats::DEFAULT;
        let (position, rotation) =
            PhysicsSystem::drive(self.position, self.rotation, &self.input, dt, &stats);
        self.position = map.clamp(position, stats.hitbox_radius);
        self.rotation = rotation;
    }

    /// Subtract damage, flooring at zero. Returns true if this hit destroyed the tank.
    pub fn take_damage(&mut self, amount: i32, now: Instant) -> bool {
        if self.is_destroyed() {
            return false;
        }
        self.hit_points = (self.hit_points - amount.max(0)).max(0);
        if self.is_destroyed() {
            self.death_time = Some(now);
            self.input = InputFlags::default();
            true
        } else {
            false
        }
    }

    /// Bring the tank back at a new spawn point with full health.
    pub fn respawn(&mut self, position: Vec2, rotation: f32, hit_points: i32) {
        self.position = position;
        self.set_rotation(rotation);
        self.hit_points = hit_points.max(1);
        self.death_time = None;
        self.last_shot = None;
        self.sync_collider();
    }

    /// Time until the next shot is allowed
    pub fn cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Duration {
        self.last_shot
            .map(|shot| cooldown.saturating_sub(now.saturating_duration_since(shot)))
            .unwrap_or(Duration::ZERO)
    }

    /// Claim a shot. Errors with the remaining cooldown when still reloading.
    pub fn try_fire(&mut self, now: Instant, cooldown: Duration) -> Result<(), Duration> {
        let remaining = self.cooldown_remaining(now, cooldown);
        if !remaining.is_zero() {
            return Err(remaining);
        }
        self.last_shot = Some(now);
        Ok(())
    }

    /// Unit vector the barrel points along
    pub fn heading(&self) -> Vec2 {
        heading(self.rotation)
    }

    /// Spawn point for a bullet of `bullet_radius`, just clear of the hull.
    pub fn muzzle(&self, bullet_radius: f32) -> Vec2 {
        self.position + self.heading() * (TankStats::DEFAULT.hitbox_radius + bullet_radius + 1.0)
    }

    pub fn sync_collider(&mut self) {
        self.collider.sync(self.position, self.rotation);
    }

    pub fn collider(&self) -> &Collider {
        &self.collider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn tank_at(x: f32, y: f32) -> Tank {
        Tank::new(1, "alice".into(), Color::new(255, 0, 0), Vec2::new(x, y), 0.0, 100, Lives::Unlimited)
    }

    fn map() -> GameMapData {
        GameMapData::new(40, 30, 32.0)
    }

    #[test]
    fn rotation_stays_normalized_under_any_turns() {
        let mut tank = tank_at(400.0, 400.0);
        let sequence = [
            (true, false, 0.7),
            (true, false, 3.3),
            (false, true, 0.05),
            (false, true, 10.0),
            (true, false, 0.001),
            (false, true, 2.0),
        ];

        for (left, right, dt) in sequence {
            tank.input = InputFlags {
                turn_left: left,
                turn_right: right,
                ..InputFlags::default()
            };
            tank.apply_input(dt, &map());
            assert!((0.0..360.0).contains(&tank.rotation()), "rotation {}", tank.rotation());
        }

        tank.set_rotation(-720.5);
        assert!((0.0..360.0).contains(&tank.rotation()));
    }

    #[test]
    fn destroyed_tank_does_not_move() {
        let mut tank = tank_at(400.0, 400.0);
        tank.hit_points = 0;
        tank.input.forward = true;
        tank.apply_input(1.0, &map());
        assert_eq!(tank.position, Vec2::new(400.0, 400.0));
    }

    #[test]
    fn movement_is_clamped_to_the_map() {
        let mut tank = tank_at(20.0, 400.0);
        tank.set_rotation(180.0);
        tank.input.forward = true;
        tank.apply_input(5.0, &map());

        assert_approx_eq!(tank.position.x, TankStats::DEFAULT.hitbox_radius);
        assert_approx_eq!(tank.position.y, 400.0, 1e-3);
    }

    #[test]
    fn damage_floors_at_zero() {
        let now = Instant::now();
        let mut tank = tank_at(100.0, 100.0);

        assert!(!tank.take_damage(60, now));
        assert!(tank.take_damage(60, now));
        assert_eq!(tank.hit_points, 0);
        assert_eq!(tank.death_time, Some(now));

        assert!(!tank.take_damage(25, now));
        assert_eq!(tank.hit_points, 0);
    }

    #[test]
    fn respawn_restores_health() {
        let now = Instant::now();
        let mut tank = tank_at(100.0, 100.0);
        tank.take_damage(500, now);

        tank.respawn(Vec2::new(300.0, 200.0), 450.0, 100);

        assert_eq!(tank.hit_points, 100);
        assert!(tank.is_active());
        assert_eq!(tank.death_time, None);
        assert_approx_eq!(tank.rotation(), 90.0);
        assert_eq!(tank.collider().center(), Vec2::new(300.0, 200.0));
    }

    #[test]
    fn fire_respects_cooldown() {
        let now = Instant::now();
        let cooldown = Duration::from_millis(500);
        let mut tank = tank_at(100.0, 100.0);

        assert!(tank.try_fire(now, cooldown).is_ok());
        assert_eq!(
            tank.try_fire(now + Duration::from_millis(200), cooldown),
            Err(Duration::from_millis(300))
        );
        assert!(tank.try_fire(now + cooldown, cooldown).is_ok());
    }
}
