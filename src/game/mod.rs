//! Game simulation modules

pub mod bullet;
pub mod combat;
pub mod geometry;
pub mod map;
pub mod mode;
pub mod physics;
pub mod simulation;
pub mod tank;

pub use simulation::{Outgoing, Simulation};

use tank::PlayerId;

/// Request queued by a connection for the next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    Shoot { player_id: PlayerId },
}
