//! Server context shared by connection handlers and the simulation

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use glam::Vec2;
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::game::bullet::Bullet;
use crate::game::map::GameMapData;
use crate::game::mode::{GameMode, JoinPolicy, MatchState, ModeContext, Participant};
use crate::game::tank::{Color, InputFlags, PlayerId, Tank};
use crate::game::PlayerCommand;
use crate::net::connection::{ConnectionHandle, ConnectionId, SendError};
use crate::net::protocol::{sanitize_name, ServerMessage};
use crate::util::time::as_millis;

/// Shoot requests buffered between ticks
pub const COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Why a join was refused; the reason is sent as `ERROR_MSG`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("server_full")]
    ServerFull,

    #[error("server_stopping")]
    Stopping,

    #[error("already_joined")]
    AlreadyJoined,

    /// The outbound queue cannot hold the setup lines
    #[error("send_buffer_full")]
    SendBufferFull,

    /// The connection started closing before it could be admitted
    #[error("connection_closed")]
    Closed,
}

/// Live state touched by more than one task
pub struct ServerContext {
    pub config: Arc<Config>,
    pub map: GameMapData,
    pub mode: Arc<dyn GameMode>,
    pub connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    pub tanks: DashMap<PlayerId, Tank>,
    pub bullets: Mutex<Vec<Bullet>>,
    pub match_state: RwLock<MatchState>,
    commands: mpsc::Sender<PlayerCommand>,
    next_player_id: AtomicU32,
    next_connection_id: AtomicU64,
    rng: Mutex<ChaCha8Rng>,
    stopping: watch::Sender<bool>,
    /// Serializes join against leave so a joiner's snapshot and the
    /// departure broadcasts agree
    join_lock: Mutex<()>,
}

impl ServerContext {
    /// Build the context plus the command receiver the simulation drains.
    pub fn new(
        config: Config,
        mode: Arc<dyn GameMode>,
    ) -> (Arc<Self>, mpsc::Receiver<PlayerCommand>) {
        let (commands, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (stopping, _) = watch::channel(false);
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let map = GameMapData::new(config.map_width, config.map_height, config.tile_size);

        let ctx = Arc::new(Self {
            config: Arc::new(config),
            map,
            mode,
            connections: DashMap::new(),
            tanks: DashMap::new(),
            bullets: Mutex::new(Vec::new()),
            match_state: RwLock::new(MatchState::new(Instant::now())),
            commands,
            next_player_id: AtomicU32::new(1),
            next_connection_id: AtomicU64::new(1),
            rng: Mutex::new(rng),
            stopping,
            join_lock: Mutex::new(()),
        });
        (ctx, commands_rx)
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn player_count(&self) -> usize {
        self.tanks.len()
    }

    /// Admit a connection that sent its join line. On success the handle is
    /// ACTIVE, its setup lines are queued, and everyone has been told.
    pub fn join_player(
        &self,
        handle: &Arc<ConnectionHandle>,
        requested_name: &str,
    ) -> Result<PlayerId, JoinError> {
        if self.is_stopping() {
            return Err(JoinError::Stopping);
        }
        if handle.player_id().is_some() {
            return Err(JoinError::AlreadyJoined);
        }

        let (player_id, announce) = {
            let _guard = self.join_lock.lock();
            if self.tanks.len() >= self.config.max_players {
                return Err(JoinError::ServerFull);
            }

            let player_id = self.next_player_id.fetch_add(1, Ordering::Relaxed);
            if !handle.assign_player(player_id) {
                return Err(JoinError::AlreadyJoined);
            }

            let (phase, time_ms) = {
                let state = self.match_state.read();
                let left = state.time_remaining(self.mode.timings(), Instant::now());
                (state.phase, as_millis(left))
            };
            let mut tank = Tank::new(
                player_id,
                sanitize_name(requested_name, player_id),
                self.random_color(),
                self.spawn_point(),
                self.random_rotation(),
                self.mode.max_hit_points(),
                self.mode.starting_lives(),
            );
            tank.spectating = self.mode.handle_new_player_join(phase) == JoinPolicy::Spectate;

            let mut setup = vec![
                ServerMessage::AssignId {
                    id: player_id,
                    x: tank.position.x,
                    y: tank.position.y,
                    rotation: tank.rotation(),
                },
                ServerMessage::MapInfo {
                    width_tiles: self.map.width_tiles,
                    height_tiles: self.map.height_tiles,
                    tile_size: self.map.tile_size,
                },
                ServerMessage::GameState { phase, time_ms },
            ];
            for other in self.tanks.iter() {
                setup.push(new_player_message(&other));
                setup.push(ServerMessage::PlayerLives {
                    id: other.id,
                    lives: other.lives.as_wire(),
                });
            }
            for msg in &setup {
                if let Err(e) = handle.try_send(Bytes::from(msg.encode())) {
                    warn!(conn_id = handle.id, error = %e, "Failed to queue join setup");
                    return Err(match e {
                        SendError::Full => JoinError::SendBufferFull,
                        SendError::Closed => JoinError::Closed,
                    });
                }
            }

            if !handle.activate() {
                return Err(JoinError::Closed);
            }
            self.connections.insert(handle.id, handle.clone());

            info!(
                player_id,
                conn_id = handle.id,
                peer = %handle.peer,
                name = %tank.name,
                spectating = tank.spectating,
                "Player joined"
            );

            let announce = [
                new_player_message(&tank),
                ServerMessage::PlayerLives {
                    id: player_id,
                    lives: tank.lives.as_wire(),
                },
            ];
            self.tanks.insert(player_id, tank);
            (player_id, announce)
        };

        for msg in &announce {
            self.broadcast(msg);
        }
        Ok(player_id)
    }

    /// Close a connection exactly once: drop its tank, tell the others, wake
    /// its tasks.
    pub fn disconnect(&self, handle: &ConnectionHandle, reason: &str) {
        if !handle.begin_close() {
            return;
        }

        let removed = {
            let _guard = self.join_lock.lock();
            self.connections.remove(&handle.id);
            handle
                .player_id()
                .and_then(|player_id| self.tanks.remove(&player_id))
                .map(|(player_id, _)| player_id)
        };

        if let Some(player_id) = removed {
            if self.mode.removes_bullets_on_leave() {
                self.bullets.lock().retain(|b| b.owner != player_id);
            }
            info!(player_id, conn_id = handle.id, reason, "Player left");
            self.broadcast(&ServerMessage::PlayerLeft { id: player_id });
        } else {
            debug!(conn_id = handle.id, peer = %handle.peer, reason, "Connection closed before join");
        }

        handle.finish_close();
    }

    /// Queue one line to every ACTIVE connection. Connections that cannot
    /// keep up are dropped.
    pub fn broadcast(&self, msg: &ServerMessage) {
        let frame = Bytes::from(msg.encode());
        let mut failed = Vec::new();

        for entry in self.connections.iter() {
            let handle = entry.value();
            if !handle.is_active() {
                continue;
            }
            if let Err(e) = handle.try_send(frame.clone()) {
                failed.push((handle.clone(), e));
            }
        }

        // Disconnect outside the iteration; removal needs the shard write lock
        for (handle, e) in failed {
            self.drop_slow(&handle, e);
        }
    }

    /// Queue one line to a single player, if still connected
    pub fn send_to_player(&self, player_id: PlayerId, msg: &ServerMessage) {
        let handle = self
            .connections
            .iter()
            .find(|entry| entry.value().player_id() == Some(player_id))
            .map(|entry| entry.value().clone());

        if let Some(handle) = handle {
            if let Err(e) = handle.try_send(Bytes::from(msg.encode())) {
                self.drop_slow(&handle, e);
            }
        }
    }

    fn drop_slow(&self, handle: &ConnectionHandle, error: SendError) {
        match error {
            SendError::Full => {
                warn!(conn_id = handle.id, peer = %handle.peer, "Client not keeping up, disconnecting");
                self.disconnect(handle, "send buffer full");
            }
            SendError::Closed => self.disconnect(handle, "connection closed"),
        }
    }

    /// Replace a tank's held keys. Unknown ids are ignored.
    pub fn set_input(&self, player_id: PlayerId, flags: InputFlags) {
        if let Some(mut tank) = self.tanks.get_mut(&player_id) {
            if tank.is_active() {
                tank.input = flags;
            }
        }
    }

    /// Hand a request to the simulation without waiting
    pub fn enqueue(&self, command: PlayerCommand) {
        if let Err(e) = self.commands.try_send(command) {
            warn!(?command, error = %e, "Dropping player command");
        }
    }

    /// Snapshot of the players as the mode sees them
    pub fn mode_context(&self) -> ModeContext {
        ModeContext {
            participants: self
                .tanks
                .iter()
                .map(|tank| Participant::from_tank(&tank))
                .collect(),
        }
    }

    pub fn spawn_point(&self) -> Vec2 {
        self.map.random_spawn_point(&mut *self.rng.lock())
    }

    pub fn random_rotation(&self) -> f32 {
        self.rng.lock().gen_range(0.0..360.0)
    }

    pub fn random_color(&self) -> Color {
        let mut rng = self.rng.lock();
        Color::new(
            rng.gen_range(64..=255),
            rng.gen_range(64..=255),
            rng.gen_range(64..=255),
        )
    }

    /// Flip the stopping flag observed by every task
    pub fn stop(&self) {
        if !self.stopping.send_replace(true) {
            info!("Server stopping");
        }
    }

    pub fn is_stopping(&self) -> bool {
        *self.stopping.borrow()
    }

    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stopping.subscribe()
    }
}

pub fn new_player_message(tank: &Tank) -> ServerMessage {
    ServerMessage::NewPlayer {
        id: tank.id,
        x: tank.position.x,
        y: tank.position.y,
        rotation: tank.rotation(),
        name: tank.name.clone(),
        color: tank.color,
    }
}
