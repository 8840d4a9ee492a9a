//! Authoritative fixed-tick simulation

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec2;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::app::ServerContext;
use crate::net::protocol::ServerMessage;
use crate::util::time::{as_millis, tick_interval};

use super::bullet::{Bullet, BulletId};
use super::combat::{CombatSystem, WeaponStats};
use super::geometry::Collider;
use super::mode::{MatchPhase, ModeContext, PhaseTransition};
use super::physics::{PhysicsSystem, TankStats};
use super::tank::{PlayerId, Tank};
use super::PlayerCommand;

/// Longest step a single tick may simulate. Stalls beyond this are dropped
/// rather than replayed.
pub const MAX_TICK_DELTA: Duration = Duration::from_millis(100);

/// Message produced by a tick, sent once the tick is complete
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    All(ServerMessage),
    To(PlayerId, ServerMessage),
}

/// Owns the tick loop. Shared state lives in the context; the simulation
/// keeps only what no other task reads.
pub struct Simulation {
    ctx: Arc<ServerContext>,
    commands: mpsc::Receiver<PlayerCommand>,
    weapon: WeaponStats,
    last_tick: Instant,
    tick: u64,
    next_bullet_id: BulletId,
    /// Last pose sent per tank, for delta updates
    last_sent: HashMap<PlayerId, (Vec2, f32)>,
}

impl Simulation {
    pub fn new(ctx: Arc<ServerContext>, commands: mpsc::Receiver<PlayerCommand>) -> Self {
        Self::with_start(ctx, commands, Instant::now())
    }

    /// Start the clock at `start`; ticks measure their delta from here.
    pub fn with_start(
        ctx: Arc<ServerContext>,
        commands: mpsc::Receiver<PlayerCommand>,
        start: Instant,
    ) -> Self {
        Self {
            ctx,
            commands,
            weapon: WeaponStats::DEFAULT,
            last_tick: start,
            tick: 0,
            next_bullet_id: 1,
            last_sent: HashMap::new(),
        }
    }

    /// Run until the stopping flag is set. The tick in progress always
    /// finishes first.
    pub async fn run(mut self) {
        let tick_rate = self.ctx.config.tick_rate;
        let mut stop = self.ctx.subscribe_stop();
        let mut ticker = interval(tick_interval(tick_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tick_rate, mode = self.ctx.mode.name(), "Simulation started");

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => {}
                _ = ticker.tick() => {}
            }
            if self.ctx.is_stopping() {
                break;
            }

            let now = Instant::now();
            match catch_unwind(AssertUnwindSafe(|| self.tick(now))) {
                Ok(outbox) => self.dispatch(outbox),
                Err(_) => error!(tick = self.tick, "Tick panicked, skipping to next tick"),
            }
        }

        info!(ticks = self.tick, "Simulation stopped");
    }

    fn dispatch(&self, outbox: Vec<Outgoing>) {
        for outgoing in outbox {
            match outgoing {
                Outgoing::All(msg) => self.ctx.broadcast(&msg),
                Outgoing::To(player_id, msg) => self.ctx.send_to_player(player_id, &msg),
            }
        }
    }

    /// One full update. Every step uses the same `now` and delta.
    pub fn tick(&mut self, now: Instant) -> Vec<Outgoing> {
        let dt = now
            .saturating_duration_since(self.last_tick)
            .min(MAX_TICK_DELTA)
            .as_secs_f32();
        self.last_tick = now;
        self.tick += 1;

        let mut out = Vec::new();
        let fresh = self.apply_commands(now, &mut out);
        self.advance(dt, fresh);
        self.sync_colliders();
        self.resolve_hits(now, &mut out);
        self.expire_bullets(now);
        self.update_mode(now, &mut out);
        self.collect_updates(&mut out);
        out
    }

    /// Drain queued shoot requests. Returns the bullets they spawned.
    fn apply_commands(&mut self, now: Instant, out: &mut Vec<Outgoing>) -> Vec<Bullet> {
        let phase = self.ctx.match_state.read().phase;
        let combat = self.ctx.mode.allows_combat(phase);
        let mut fresh = Vec::new();

        while let Ok(command) = self.commands.try_recv() {
            match command {
                PlayerCommand::Shoot { player_id } => {
                    let Some(mut tank) = self.ctx.tanks.get_mut(&player_id) else {
                        continue;
                    };
                    if !combat || !tank.is_active() {
                        continue;
                    }
                    if let Err(left) = tank.try_fire(now, self.weapon.cooldown) {
                        out.push(Outgoing::To(
                            player_id,
                            ServerMessage::ShootCooldown {
                                remaining_ms: as_millis(left),
                            },
                        ));
                        continue;
                    }
                    let origin = tank.muzzle(self.weapon.bullet_radius);
                    let direction = tank.heading();
                    drop(tank);

                    let bullet_id = self.next_bullet_id;
                    self.next_bullet_id += 1;
                    out.push(Outgoing::All(ServerMessage::Shoot {
                        bullet_id,
                        owner_id: player_id,
                        x: origin.x,
                        y: origin.y,
                        dir_x: direction.x,
                        dir_y: direction.y,
                    }));
                    fresh.push(Bullet::new(
                        bullet_id,
                        player_id,
                        origin,
                        direction,
                        self.weapon.bullet_speed,
                        now,
                    ));
                }
            }
        }
        fresh
    }

    /// Move tanks and bullets. Bullets fired this tick join after the step.
    fn advance(&mut self, dt: f32, fresh: Vec<Bullet>) {
        let map = &self.ctx.map;
        for mut tank in self.ctx.tanks.iter_mut() {
            tank.apply_input(dt, map);
        }
        self.separate_tanks();

        let mut bullets = self.ctx.bullets.lock();
        for bullet in bullets.iter_mut() {
            bullet.advance(dt);
        }
        bullets.extend(fresh);
    }

    /// Push overlapping live tanks apart, then keep them on the map.
    fn separate_tanks(&self) {
        let radius = TankStats::DEFAULT.hitbox_radius;
        let mut bodies: Vec<(PlayerId, Vec2)> = self
            .ctx
            .tanks
            .iter()
            .filter(|t| t.is_active())
            .map(|t| (t.id, t.position))
            .collect();

        let mut moved = false;
        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                let (a, b) = (bodies[i].1, bodies[j].1);
                if PhysicsSystem::check_tank_collision(a, radius, b, radius) {
                    let (a, b) = PhysicsSystem::resolve_tank_collision(a, radius, b, radius);
                    bodies[i].1 = a;
                    bodies[j].1 = b;
                    moved = true;
                }
            }
        }
        if !moved {
            return;
        }

        for (id, position) in bodies {
            if let Some(mut tank) = self.ctx.tanks.get_mut(&id) {
                tank.position = self.ctx.map.clamp(position, radius);
            }
        }
    }

    fn sync_colliders(&self) {
        for mut tank in self.ctx.tanks.iter_mut() {
            tank.sync_collider();
        }
        let radius = self.weapon.bullet_radius;
        for bullet in self.ctx.bullets.lock().iter_mut() {
            bullet.sync_collider(radius);
        }
    }

    fn resolve_hits(&self, now: Instant, out: &mut Vec<Outgoing>) {
        let targets: Vec<(PlayerId, Collider)> = self
            .ctx
            .tanks
            .iter()
            .filter(|t| t.is_active())
            .map(|t| (t.id, *t.collider()))
            .collect();
        if targets.is_empty() {
            return;
        }

        let hits = {
            let mut bullets = self.ctx.bullets.lock();
            let hits = CombatSystem::detect_hits(&bullets, &targets, &self.weapon);
            if !hits.is_empty() {
                bullets.retain(|b| !hits.iter().any(|h| h.bullet_id == b.id));
            }
            hits
        };

        for hit in hits {
            let killed = {
                let Some(mut target) = self.ctx.tanks.get_mut(&hit.target_id) else {
                    continue;
                };
                // Already destroyed by an earlier bullet this tick
                if target.is_destroyed() {
                    continue;
                }
                let killed = target.take_damage(hit.damage, now);
                out.push(Outgoing::All(ServerMessage::Hit {
                    target_id: hit.target_id,
                    shooter_id: hit.shooter_id,
                    bullet_id: hit.bullet_id,
                    damage: hit.damage,
                }));
                if killed {
                    let outcome = self.ctx.mode.handle_player_death(&target);
                    debug!(
                        target_id = hit.target_id,
                        shooter_id = hit.shooter_id,
                        ?outcome,
                        "Tank destroyed"
                    );
                    out.push(Outgoing::All(ServerMessage::Destroyed {
                        target_id: hit.target_id,
                        shooter_id: hit.shooter_id,
                    }));
                    out.push(Outgoing::All(ServerMessage::PlayerLives {
                        id: hit.target_id,
                        lives: target.lives.as_wire(),
                    }));
                }
                killed
            };

            if killed {
                if let Some(mut shooter) = self.ctx.tanks.get_mut(&hit.shooter_id) {
                    shooter.kills += 1;
                }
            }
        }
    }

    fn expire_bullets(&self, now: Instant) {
        let lifetime = self.weapon.bullet_lifetime;
        let map = &self.ctx.map;
        self.ctx
            .bullets
            .lock()
            .retain(|b| !b.is_spent(now, lifetime, map));
    }

    fn update_mode(&mut self, now: Instant, out: &mut Vec<Outgoing>) {
        if self.ctx.match_state.read().phase == MatchPhase::Playing {
            self.respawn_ready(now, out);
        }

        let players = self.ctx.mode_context();
        let transition = {
            let state = self.ctx.match_state.read();
            self.ctx.mode.next_phase(&state, &players, now)
        };
        if let PhaseTransition::To(next) = transition {
            self.enter_phase(next, &players, now, out);
        }

        self.announce_countdown(now, out);
    }

    fn respawn_ready(&mut self, now: Instant, out: &mut Vec<Outgoing>) {
        let mode = self.ctx.mode.clone();
        for mut tank in self.ctx.tanks.iter_mut() {
            if !mode.handle_player_respawn(&tank, now) {
                continue;
            }
            tank.lives.spend();
            tank.respawn(
                self.ctx.spawn_point(),
                self.ctx.random_rotation(),
                mode.max_hit_points(),
            );
            debug!(player_id = tank.id, lives = tank.lives.as_wire(), "Tank respawned");
            push_respawn(&tank, out);
            self.last_sent.insert(tank.id, (tank.position, tank.rotation()));
        }
    }

    fn enter_phase(
        &mut self,
        next: MatchPhase,
        players: &ModeContext,
        now: Instant,
        out: &mut Vec<Outgoing>,
    ) {
        let (previous, time_ms) = {
            let mut state = self.ctx.match_state.write();
            let previous = state.phase;
            state.enter(next, now);
            (previous, as_millis(state.time_remaining(self.ctx.mode.timings(), now)))
        };
        info!(from = %previous, to = %next, players = players.player_count(), "Match phase changed");

        match next {
            MatchPhase::Playing => {
                self.start_round(out);
                self.ctx.bullets.lock().clear();
                out.push(announce("Round started"));
            }
            MatchPhase::RoundOver => {
                let text = match self.ctx.mode.winner(players) {
                    Some(id) => {
                        let name = players
                            .participants
                            .iter()
                            .find(|p| p.id == id)
                            .map(|p| p.name.as_str())
                            .unwrap_or("?");
                        format!("{name} wins the round")
                    }
                    None => "Round over".to_string(),
                };
                info!(winner = %text, "Round finished");
                out.push(announce(&text));
            }
            MatchPhase::Waiting => out.push(announce("Waiting for players")),
            MatchPhase::Countdown => {}
        }

        out.push(Outgoing::All(ServerMessage::GameState {
            phase: next,
            time_ms,
        }));
    }

    /// Put every tank back in the round with fresh lives.
    fn start_round(&mut self, out: &mut Vec<Outgoing>) {
        let mode = self.ctx.mode.clone();
        for mut tank in self.ctx.tanks.iter_mut() {
            tank.spectating = false;
            tank.lives = mode.starting_lives();
            tank.kills = 0;
            tank.respawn(
                self.ctx.spawn_point(),
                self.ctx.random_rotation(),
                mode.max_hit_points(),
            );
            push_respawn(&tank, out);
            self.last_sent.insert(tank.id, (tank.position, tank.rotation()));
        }
    }

    fn announce_countdown(&self, now: Instant, out: &mut Vec<Outgoing>) {
        let mut state = self.ctx.match_state.write();
        if state.phase != MatchPhase::Countdown {
            return;
        }
        let left = state.time_remaining(self.ctx.mode.timings(), now);
        let secs = as_millis(left).div_ceil(1000);
        if secs > 0 && state.last_announced_countdown != Some(secs) {
            state.last_announced_countdown = Some(secs);
            out.push(announce(&format!("Round starts in {secs}")));
        }
    }

    /// PLAYER_UPDATE for every live tank whose pose changed, and for all of
    /// them once a second.
    fn collect_updates(&mut self, out: &mut Vec<Outgoing>) {
        let full_refresh = self.tick % u64::from(self.ctx.config.tick_rate.max(1)) == 0;

        for tank in self.ctx.tanks.iter() {
            if !tank.is_active() {
                continue;
            }
            let pose = (tank.position, tank.rotation());
            if full_refresh || self.last_sent.get(&tank.id) != Some(&pose) {
                out.push(Outgoing::All(ServerMessage::PlayerUpdate {
                    id: tank.id,
                    x: pose.0.x,
                    y: pose.0.y,
                    rotation: pose.1,
                }));
                self.last_sent.insert(tank.id, pose);
            }
        }

        let tanks = &self.ctx.tanks;
        self.last_sent.retain(|id, _| tanks.contains_key(id));
    }
}

fn push_respawn(tank: &Tank, out: &mut Vec<Outgoing>) {
    out.push(Outgoing::All(ServerMessage::Respawn {
        id: tank.id,
        x: tank.position.x,
        y: tank.position.y,
        rotation: tank.rotation(),
    }));
    out.push(Outgoing::All(ServerMessage::PlayerLives {
        id: tank.id,
        lives: tank.lives.as_wire(),
    }));
}

fn announce(text: &str) -> Outgoing {
    Outgoing::All(ServerMessage::Announce {
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GameModeKind};
    use crate::game::mode;
    use crate::game::tank::{Color, InputFlags, Lives};
    use crate::net::connection::ConnectionHandle;

    fn setup(kind: GameModeKind) -> (Arc<ServerContext>, Simulation, Instant) {
        let config = Config {
            rng_seed: Some(11),
            game_mode: kind,
            ..Config::default()
        };
        let mode = mode::from_config(&config);
        let (ctx, rx) = ServerContext::new(config, mode);
        let start = Instant::now();
        let sim = Simulation::with_start(ctx.clone(), rx, start);
        (ctx, sim, start)
    }

    fn place(ctx: &ServerContext, id: PlayerId, x: f32, y: f32, rotation: f32) {
        let tank = Tank::new(
            id,
            format!("p{id}"),
            Color::new(1, 2, 3),
            Vec2::new(x, y),
            rotation,
            100,
            ctx.mode.starting_lives(),
        );
        ctx.tanks.insert(id, tank);
    }

    fn start_playing(ctx: &ServerContext, now: Instant) {
        ctx.match_state.write().enter(MatchPhase::Playing, now);
    }

    fn broadcasts(out: &[Outgoing]) -> Vec<&ServerMessage> {
        out.iter()
            .filter_map(|o| match o {
                Outgoing::All(msg) => Some(msg),
                Outgoing::To(..) => None,
            })
            .collect()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn bullet_hits_tank_in_its_path() {
        let (ctx, mut sim, start) = setup(GameModeKind::FreeForAll);
        place(&ctx, 1, 200.0, 300.0, 0.0);
        place(&ctx, 2, 260.0, 300.0, 180.0);
        start_playing(&ctx, start);

        ctx.enqueue(PlayerCommand::Shoot { player_id: 1 });
        let first = sim.tick(start + ms(33));
        assert!(broadcasts(&first).iter().any(|m| matches!(
            m,
            ServerMessage::Shoot { bullet_id: 1, owner_id: 1, .. }
        )));
        assert_eq!(ctx.bullets.lock().len(), 1);

        let second = sim.tick(start + ms(133));
        assert!(broadcasts(&second).contains(&&ServerMessage::Hit {
            target_id: 2,
            shooter_id: 1,
            bullet_id: 1,
            damage: WeaponStats::DEFAULT.damage,
        }));
        assert_eq!(ctx.tanks.get(&2).map(|t| t.hit_points), Some(75));
        assert!(ctx.bullets.lock().is_empty());
    }

    #[test]
    fn early_shot_gets_cooldown_feedback() {
        let (ctx, mut sim, start) = setup(GameModeKind::FreeForAll);
        place(&ctx, 1, 200.0, 300.0, 0.0);
        start_playing(&ctx, start);

        ctx.enqueue(PlayerCommand::Shoot { player_id: 1 });
        ctx.enqueue(PlayerCommand::Shoot { player_id: 1 });
        let out = sim.tick(start + ms(10));

        let shots = broadcasts(&out)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Shoot { .. }))
            .count();
        assert_eq!(shots, 1);
        assert!(out.contains(&Outgoing::To(
            1,
            ServerMessage::ShootCooldown { remaining_ms: 500 }
        )));
    }

    #[test]
    fn shots_are_ignored_outside_a_round() {
        let (ctx, mut sim, start) = setup(GameModeKind::FreeForAll);
        place(&ctx, 1, 200.0, 300.0, 0.0);

        ctx.enqueue(PlayerCommand::Shoot { player_id: 1 });
        ctx.enqueue(PlayerCommand::Shoot { player_id: 42 });
        let out = sim.tick(start + ms(10));

        assert!(!broadcasts(&out)
            .iter()
            .any(|m| matches!(m, ServerMessage::Shoot { .. })));
        assert!(ctx.bullets.lock().is_empty());
    }

    #[test]
    fn destroyed_tank_respawns_after_delay() {
        let (ctx, mut sim, start) = setup(GameModeKind::FreeForAll);
        place(&ctx, 1, 200.0, 300.0, 0.0);
        place(&ctx, 2, 260.0, 300.0, 0.0);
        if let Some(mut target) = ctx.tanks.get_mut(&2) {
            target.hit_points = 25;
        }
        start_playing(&ctx, start);

        ctx.enqueue(PlayerCommand::Shoot { player_id: 1 });
        sim.tick(start + ms(33));
        let kill = sim.tick(start + ms(133));
        let kill = broadcasts(&kill);
        assert!(kill.contains(&&ServerMessage::Destroyed {
            target_id: 2,
            shooter_id: 1
        }));
        assert!(kill.contains(&&ServerMessage::PlayerLives { id: 2, lives: -1 }));
        assert_eq!(ctx.tanks.get(&1).map(|t| t.kills), Some(1));

        let early = sim.tick(start + ms(1_133));
        assert!(!broadcasts(&early)
            .iter()
            .any(|m| matches!(m, ServerMessage::Respawn { id: 2, .. })));
        assert_eq!(ctx.tanks.get(&2).map(|t| t.hit_points), Some(0));

        let late = sim.tick(start + ms(3_133));
        assert!(broadcasts(&late)
            .iter()
            .any(|m| matches!(m, ServerMessage::Respawn { id: 2, .. })));
        assert_eq!(ctx.tanks.get(&2).map(|t| t.hit_points), Some(100));
    }

    #[test]
    fn phases_advance_from_waiting_to_playing() {
        let (ctx, mut sim, start) = setup(GameModeKind::FreeForAll);
        place(&ctx, 1, 200.0, 300.0, 0.0);

        let armed = sim.tick(start + ms(10));
        let armed = broadcasts(&armed);
        assert!(armed.contains(&&ServerMessage::GameState {
            phase: MatchPhase::Countdown,
            time_ms: 5_000
        }));
        assert!(armed.contains(&&ServerMessage::Announce {
            text: "Round starts in 5".into()
        }));

        let ticking = sim.tick(start + ms(1_010));
        assert!(broadcasts(&ticking).contains(&&ServerMessage::Announce {
            text: "Round starts in 4".into()
        }));

        let playing = sim.tick(start + ms(5_010));
        let playing = broadcasts(&playing);
        assert!(playing.contains(&&ServerMessage::GameState {
            phase: MatchPhase::Playing,
            time_ms: 180_000
        }));
        assert!(playing
            .iter()
            .any(|m| matches!(m, ServerMessage::Respawn { id: 1, .. })));
        assert_eq!(ctx.match_state.read().phase, MatchPhase::Playing);
    }

    #[test]
    fn disconnect_between_ticks_leaves_nothing_behind() {
        let (ctx, mut sim, start) = setup(GameModeKind::FreeForAll);
        let (handle, _rx) = ConnectionHandle::new(ctx.next_connection_id(), "peer".into(), 64);
        let id = ctx.join_player(&handle, "leaver").unwrap();
        ctx.set_input(
            id,
            InputFlags {
                forward: true,
                ..InputFlags::default()
            },
        );
        sim.tick(start + ms(33));
        assert!(sim.last_sent.contains_key(&id));

        ctx.disconnect(&handle, "eof");
        let out = sim.tick(start + ms(66));

        assert!(ctx.tanks.is_empty());
        assert!(ctx.connections.is_empty());
        assert!(sim.last_sent.is_empty());
        assert!(!broadcasts(&out)
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerUpdate { id: pid, .. } if *pid == id)));
    }

    #[test]
    fn bullets_expire_after_their_lifetime() {
        let (ctx, mut sim, start) = setup(GameModeKind::FreeForAll);
        place(&ctx, 1, 200.0, 300.0, 90.0);
        start_playing(&ctx, start);

        ctx.enqueue(PlayerCommand::Shoot { player_id: 1 });
        sim.tick(start + ms(10));
        assert_eq!(ctx.bullets.lock().len(), 1);

        sim.tick(start + ms(2_100));
        assert!(ctx.bullets.lock().is_empty());
    }

    #[test]
    fn overlapping_tanks_are_pushed_apart() {
        let (ctx, mut sim, start) = setup(GameModeKind::FreeForAll);
        place(&ctx, 1, 300.0, 300.0, 0.0);
        place(&ctx, 2, 310.0, 300.0, 0.0);
        start_playing(&ctx, start);

        sim.tick(start + ms(33));

        let a = ctx.tanks.get(&1).map(|t| t.position).unwrap();
        let b = ctx.tanks.get(&2).map(|t| t.position).unwrap();
        assert!(a.distance(b) >= 2.0 * TankStats::DEFAULT.hitbox_radius);
    }

    #[test]
    fn last_tank_standing_ends_round_with_winner() {
        let (ctx, mut sim, start) = setup(GameModeKind::LastTankStanding);
        place(&ctx, 1, 200.0, 300.0, 0.0);
        place(&ctx, 2, 600.0, 300.0, 0.0);
        start_playing(&ctx, start);
        if let Some(mut loser) = ctx.tanks.get_mut(&2) {
            loser.lives = Lives::Limited(0);
            loser.take_damage(500, start);
        }

        let out = sim.tick(start + ms(33));
        let out = broadcasts(&out);

        assert_eq!(ctx.match_state.read().phase, MatchPhase::RoundOver);
        assert!(out.contains(&&ServerMessage::Announce {
            text: "p1 wins the round".into()
        }));
    }

    #[test]
    fn new_round_brings_spectators_in() {
        let (ctx, mut sim, start) = setup(GameModeKind::LastTankStanding);
        place(&ctx, 1, 200.0, 300.0, 0.0);
        place(&ctx, 2, 600.0, 300.0, 0.0);
        place(&ctx, 3, 900.0, 300.0, 0.0);
        if let Some(mut late) = ctx.tanks.get_mut(&3) {
            late.spectating = true;
        }
        ctx.match_state.write().enter(MatchPhase::Countdown, start);

        let out = sim.tick(start + ms(5_000));

        assert_eq!(ctx.match_state.read().phase, MatchPhase::Playing);
        assert_eq!(ctx.tanks.get(&3).map(|t| t.spectating), Some(false));
        assert!(broadcasts(&out)
            .iter()
            .any(|m| matches!(m, ServerMessage::Respawn { id: 3, .. })));
    }

    #[test]
    fn round_left_to_spectators_restarts_with_them() {
        let (ctx, mut sim, start) = setup(GameModeKind::LastTankStanding);
        place(&ctx, 3, 200.0, 300.0, 0.0);
        place(&ctx, 4, 600.0, 300.0, 0.0);
        for mut tank in ctx.tanks.iter_mut() {
            tank.spectating = true;
        }
        start_playing(&ctx, start);

        let out = sim.tick(start + ms(100));
        assert_eq!(ctx.match_state.read().phase, MatchPhase::Waiting);
        assert!(broadcasts(&out).iter().any(|m| matches!(
            m,
            ServerMessage::GameState {
                phase: MatchPhase::Waiting,
                ..
            }
        )));

        sim.tick(start + ms(200));
        assert_eq!(ctx.match_state.read().phase, MatchPhase::Countdown);

        sim.tick(start + ms(5_200));
        assert_eq!(ctx.match_state.read().phase, MatchPhase::Playing);
        assert!(ctx.tanks.iter().all(|t| !t.spectating));
    }
}
