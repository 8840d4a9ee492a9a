//! Match phases and pluggable game-mode policies
//!
//! Modes only make decisions. The simulation applies the side effects of a
//! transition (resetting tanks, clearing bullets, announcing results).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, GameModeKind};
use crate::util::time::remaining;

use super::tank::{Lives, PlayerId, Tank};

/// Delay between a tank's destruction and its respawn
pub const RESPAWN_DELAY: Duration = Duration::from_secs(3);

/// Starting hit points for every tank
pub const MAX_HIT_POINTS: i32 = 100;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchPhase {
    /// Not enough players, or waiting to arm the next round
    Waiting,
    /// Round armed, timer running
    Countdown,
    /// Round in progress
    Playing,
    /// Result on display, reset pending
    RoundOver,
}

impl MatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPhase::Waiting => "WAITING",
            MatchPhase::Countdown => "COUNTDOWN",
            MatchPhase::Playing => "PLAYING",
            MatchPhase::RoundOver => "ROUND_OVER",
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(MatchPhase::Waiting),
            "COUNTDOWN" => Ok(MatchPhase::Countdown),
            "PLAYING" => Ok(MatchPhase::Playing),
            "ROUND_OVER" => Ok(MatchPhase::RoundOver),
            _ => Err(()),
        }
    }
}

/// Phase bookkeeping owned by the server context
#[derive(Debug, Clone)]
pub struct MatchState {
    pub phase: MatchPhase,
    pub phase_entered_at: Instant,
    pub round_started_at: Option<Instant>,
    pub last_announced_countdown: Option<u64>,
}

impl MatchState {
    pub fn new(now: Instant) -> Self {
        Self {
            phase: MatchPhase::Waiting,
            phase_entered_at: now,
            round_started_at: None,
            last_announced_countdown: None,
        }
    }

    /// Move to `phase`, stamping the entry time
    pub fn enter(&mut self, phase: MatchPhase, now: Instant) {
        self.phase = phase;
        self.phase_entered_at = now;
        self.last_announced_countdown = None;
        if phase == MatchPhase::Playing {
            self.round_started_at = Some(now);
        }
    }

    /// Time left in the current phase, zero for open-ended phases
    pub fn time_remaining(&self, timings: &PhaseTimings, now: Instant) -> Duration {
        match self.phase {
            MatchPhase::Waiting => Duration::ZERO,
            MatchPhase::Countdown => remaining(self.phase_entered_at, timings.countdown, now),
            MatchPhase::Playing => match (timings.round_length, self.round_started_at) {
                (Some(length), Some(started)) => remaining(started, length, now),
                _ => Duration::ZERO,
            },
            MatchPhase::RoundOver => remaining(self.phase_entered_at, timings.round_over, now),
        }
    }
}

/// Phase durations
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimings {
    pub countdown: Duration,
    /// Round ends after this long regardless of the victory condition
    pub round_length: Option<Duration>,
    pub round_over: Duration,
}

/// Decision returned by a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    Stay,
    To(MatchPhase),
}

/// What a joining player gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Spawn a live tank right away
    Spawn,
    /// Watch until the next round starts
    Spectate,
}

/// What a destroyed tank is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathOutcome {
    AwaitRespawn,
    Eliminated,
}

/// One tank as seen by a mode
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: PlayerId,
    pub name: String,
    pub kills: u32,
    pub lives: Lives,
    pub destroyed: bool,
    pub spectating: bool,
}

impl Participant {
    pub fn from_tank(tank: &Tank) -> Self {
        Self {
            id: tank.id,
            name: tank.name.clone(),
            kills: tank.kills,
            lives: tank.lives,
            destroyed: tank.is_destroyed(),
            spectating: tank.spectating,
        }
    }

    /// In the round and not eliminated
    pub fn is_standing(&self) -> bool {
        !self.spectating && (!self.destroyed || self.lives.has_respawn())
    }
}

/// Snapshot of the players a mode decides over
#[derive(Debug, Clone, Default)]
pub struct ModeContext {
    pub participants: Vec<Participant>,
}

impl ModeContext {
    pub fn player_count(&self) -> usize {
        self.participants.len()
    }

    pub fn in_round(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| !p.spectating)
    }

    pub fn standing(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_standing())
    }
}

/// Pluggable rules: win condition, respawn policy, join handling
pub trait GameMode: Send + Sync {
    fn name(&self) -> &'static str;

    fn timings(&self) -> &PhaseTimings;

    fn min_required_players(&self) -> usize;

    fn max_hit_points(&self) -> i32 {
        MAX_HIT_POINTS
    }

    fn starting_lives(&self) -> Lives;

    fn respawn_delay(&self) -> Duration {
        RESPAWN_DELAY
    }

    /// Bullets in flight are removed when their owner disconnects
    fn removes_bullets_on_leave(&self) -> bool;

    /// Shots are only accepted while a round runs
    fn allows_combat(&self, phase: MatchPhase) -> bool {
        phase == MatchPhase::Playing
    }

    fn check_is_game_ready_to_start(&self, ctx: &ModeContext) -> bool {
        ctx.player_count() >= self.min_required_players()
    }

    fn check_is_victory_condition_met(&self, ctx: &ModeContext) -> bool;

    /// Pre-game and mid-game joins may be treated differently
    fn handle_new_player_join(&self, phase: MatchPhase) -> JoinPolicy;

    /// Called once when a tank is destroyed. Lives are spent on respawn, not here.
    fn handle_player_death(&self, tank: &Tank) -> DeathOutcome {
        if tank.lives.has_respawn() {
            DeathOutcome::AwaitRespawn
        } else {
            DeathOutcome::Eliminated
        }
    }

    /// True once a destroyed tank should come back
    fn handle_player_respawn(&self, tank: &Tank, now: Instant) -> bool {
        if !tank.is_destroyed() || tank.spectating || !tank.lives.has_respawn() {
            return false;
        }
        tank.death_time
            .map(|died| now.saturating_duration_since(died) >= self.respawn_delay())
            .unwrap_or(true)
    }

    /// Player credited with the round, if any
    fn winner(&self, ctx: &ModeContext) -> Option<PlayerId>;

    /// Pure phase decision over the current players and time
    fn next_phase(&self, state: &MatchState, ctx: &ModeContext, now: Instant) -> PhaseTransition {
        let timings = self.timings();
        let in_phase = now.saturating_duration_since(state.phase_entered_at);

        match state.phase {
            MatchPhase::Waiting => {
                if self.check_is_game_ready_to_start(ctx) {
                    PhaseTransition::To(MatchPhase::Countdown)
                } else {
                    PhaseTransition::Stay
                }
            }
            MatchPhase::Countdown => {
                if !self.check_is_game_ready_to_start(ctx) {
                    PhaseTransition::To(MatchPhase::Waiting)
                } else if in_phase >= timings.countdown {
                    PhaseTransition::To(MatchPhase::Playing)
                } else {
                    PhaseTransition::Stay
                }
            }
            MatchPhase::Playing => {
                // Nobody left in the round; spectators wait for the next one
                if ctx.in_round().next().is_none() {
                    return PhaseTransition::To(MatchPhase::Waiting);
                }
                if self.check_is_victory_condition_met(ctx) {
                    return PhaseTransition::To(MatchPhase::RoundOver);
                }
                let round_elapsed = state
                    .round_started_at
                    .map(|started| now.saturating_duration_since(started));
                match (timings.round_length, round_elapsed) {
                    (Some(length), Some(elapsed)) if elapsed >= length => {
                        PhaseTransition::To(MatchPhase::RoundOver)
                    }
                    _ => PhaseTransition::Stay,
                }
            }
            MatchPhase::RoundOver => {
                if in_phase >= timings.round_over {
                    PhaseTransition::To(MatchPhase::Waiting)
                } else {
                    PhaseTransition::Stay
                }
            }
        }
    }
}

/// Everyone against everyone, unlimited respawns, timed rounds
pub struct FreeForAll {
    timings: PhaseTimings,
    min_players: usize,
}

impl FreeForAll {
    pub const DEFAULT_MIN_PLAYERS: usize = 1;

    pub fn new(timings: PhaseTimings, min_players: usize) -> Self {
        Self {
            timings,
            min_players,
        }
    }
}

impl GameMode for FreeForAll {
    fn name(&self) -> &'static str {
        "free_for_all"
    }

    fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    fn min_required_players(&self) -> usize {
        self.min_players
    }

    fn starting_lives(&self) -> Lives {
        Lives::Unlimited
    }

    fn removes_bullets_on_leave(&self) -> bool {
        false
    }

    /// No win condition; the round ends on the clock.
    fn check_is_victory_condition_met(&self, _ctx: &ModeContext) -> bool {
        false
    }

    fn handle_new_player_join(&self, _phase: MatchPhase) -> JoinPolicy {
        JoinPolicy::Spawn
    }

    /// Top fragger; ties and scoreless rounds have no winner.
    fn winner(&self, ctx: &ModeContext) -> Option<PlayerId> {
        let best = ctx.participants.iter().map(|p| p.kills).max()?;
        let mut leaders = ctx.participants.iter().filter(|p| p.kills == best);
        match (leaders.next(), leaders.next()) {
            (Some(leader), None) if best > 0 => Some(leader.id),
            _ => None,
        }
    }
}

/// Limited lives; the last tank with lives left wins the round
pub struct LastTankStanding {
    timings: PhaseTimings,
    min_players: usize,
    respawns: u32,
}

impl LastTankStanding {
    pub const DEFAULT_MIN_PLAYERS: usize = 2;
    /// Respawns per round, on top of the first life
    pub const DEFAULT_RESPAWNS: u32 = 2;

    pub fn new(timings: PhaseTimings, min_players: usize, respawns: u32) -> Self {
        Self {
            timings,
            min_players,
            respawns,
        }
    }
}

impl GameMode for LastTankStanding {
    fn name(&self) -> &'static str {
        "last_tank_standing"
    }

    fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    fn min_required_players(&self) -> usize {
        self.min_players
    }

    fn starting_lives(&self) -> Lives {
        Lives::Limited(self.respawns)
    }

    fn removes_bullets_on_leave(&self) -> bool {
        true
    }

    fn check_is_victory_condition_met(&self, ctx: &ModeContext) -> bool {
        ctx.in_round().next().is_some() && ctx.standing().count() <= 1
    }

    /// Late joiners watch until the next round.
    fn handle_new_player_join(&self, phase: MatchPhase) -> JoinPolicy {
        match phase {
            MatchPhase::Playing => JoinPolicy::Spectate,
            _ => JoinPolicy::Spawn,
        }
    }

    fn winner(&self, ctx: &ModeContext) -> Option<PlayerId> {
        let mut standing = ctx.standing();
        match (standing.next(), standing.next()) {
            (Some(last), None) => Some(last.id),
            _ => None,
        }
    }
}

/// Build the configured mode
pub fn from_config(config: &Config) -> Arc<dyn GameMode> {
    match config.game_mode {
        GameModeKind::FreeForAll => Arc::new(FreeForAll::new(
            PhaseTimings {
                countdown: config.countdown,
                round_length: Some(config.round_length),
                round_over: config.round_over,
            },
            config.min_players.unwrap_or(FreeForAll::DEFAULT_MIN_PLAYERS),
        )),
        GameModeKind::LastTankStanding => Arc::new(LastTankStanding::new(
            PhaseTimings {
                countdown: config.countdown,
                round_length: None,
                round_over: config.round_over,
            },
            config
                .min_players
                .unwrap_or(LastTankStanding::DEFAULT_MIN_PLAYERS),
            LastTankStanding::DEFAULT_RESPAWNS,
        )),
    }
}
