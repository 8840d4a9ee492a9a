//! Line protocol message definitions
//!
//! One message per line, fields separated by `;`. The first field names the
//! command; the rest are positional and fixed per command. Trailing extra
//! fields are tolerated, missing ones are not.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::game::bullet::BulletId;
use crate::game::mode::MatchPhase;
use crate::game::tank::{Color, InputFlags, PlayerId};

/// Field separator; never valid inside a field value
pub const DELIMITER: char = ';';

/// Longest display name kept after sanitizing
pub const MAX_NAME_LEN: usize = 16;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `CONNECT;<displayName>`
    Connect { name: String },
    /// `INPUT;<forward>;<backward>;<left>;<right>`
    Input(InputFlags),
    /// `SHOOT_CMD`
    Shoot,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Id assignment plus spawn pose, sent once to the joining client
    AssignId { id: PlayerId, x: f32, y: f32, rotation: f32 },
    /// Full entity announce
    NewPlayer {
        id: PlayerId,
        x: f32,
        y: f32,
        rotation: f32,
        name: String,
        color: Color,
    },
    /// Position delta
    PlayerUpdate { id: PlayerId, x: f32, y: f32, rotation: f32 },
    Respawn { id: PlayerId, x: f32, y: f32, rotation: f32 },
    PlayerLeft { id: PlayerId },
    Shoot {
        bullet_id: BulletId,
        owner_id: PlayerId,
        x: f32,
        y: f32,
        dir_x: f32,
        dir_y: f32,
    },
    Hit {
        target_id: PlayerId,
        shooter_id: PlayerId,
        bullet_id: BulletId,
        damage: i32,
    },
    Destroyed { target_id: PlayerId, shooter_id: PlayerId },
    /// Remaining respawns, -1 for unlimited
    PlayerLives { id: PlayerId, lives: i64 },
    /// Phase plus milliseconds left in it
    GameState { phase: MatchPhase, time_ms: u64 },
    ShootCooldown { remaining_ms: u64 },
    Announce { text: String },
    MapInfo { width_tiles: u32, height_tiles: u32, tile_size: f32 },
    Error { reason: String },
}

/// Why an inbound line was discarded
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} needs {expected} fields, got {found}")]
    MissingFields {
        command: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("field {field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field {field} is not a boolean: {value:?}")]
    InvalidBool { field: &'static str, value: String },

    #[error("field {field} is not a match phase: {value:?}")]
    InvalidPhase { field: &'static str, value: String },
}

/// Tokenized line with typed field access
struct Fields<'a> {
    tokens: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    /// `arity` counts the command token itself
    fn new(command: &'static str, tokens: Vec<&'a str>, arity: usize) -> Result<Self, ProtocolError> {
        if tokens.len() < arity {
            return Err(ProtocolError::MissingFields {
                command,
                expected: arity,
                found: tokens.len(),
            });
        }
        Ok(Self { tokens })
    }

    fn text(&self, index: usize) -> &'a str {
        self.tokens[index]
    }

    fn number<T: FromStr>(&self, index: usize, field: &'static str) -> Result<T, ProtocolError> {
        let raw = self.tokens[index].trim();
        raw.parse().map_err(|_| ProtocolError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
    }

    /// Finite float; NaN and infinities are rejected at the trust boundary
    fn float(&self, index: usize, field: &'static str) -> Result<f32, ProtocolError> {
        let value: f32 = self.number(index, field)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ProtocolError::InvalidNumber {
                field,
                value: self.tokens[index].to_string(),
            })
        }
    }

    fn boolean(&self, index: usize, field: &'static str) -> Result<bool, ProtocolError> {
        let raw = self.tokens[index].trim();
        if raw.eq_ignore_ascii_case("true") || raw == "1" {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") || raw == "0" {
            Ok(false)
        } else {
            Err(ProtocolError::InvalidBool {
                field,
                value: raw.to_string(),
            })
        }
    }

    fn phase(&self, index: usize, field: &'static str) -> Result<MatchPhase, ProtocolError> {
        let raw = self.tokens[index].trim();
        raw.parse().map_err(|_| ProtocolError::InvalidPhase {
            field,
            value: raw.to_string(),
        })
    }
}

/// Split a raw line into tokens, dropping the line terminator.
fn tokenize(line: &str) -> Result<Vec<&str>, ProtocolError> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    if line.trim().is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(line.split(DELIMITER).collect())
}

impl ClientMessage {
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let tokens = tokenize(line)?;
        match tokens[0].trim() {
            "CONNECT" => {
                let f = Fields::new("CONNECT", tokens, 2)?;
                Ok(ClientMessage::Connect {
                    name: f.text(1).to_string(),
                })
            }
            "INPUT" => {
                let f = Fields::new("INPUT", tokens, 5)?;
                Ok(ClientMessage::Input(InputFlags {
                    forward: f.boolean(1, "forward")?,
                    backward: f.boolean(2, "backward")?,
                    turn_left: f.boolean(3, "left")?,
                    turn_right: f.boolean(4, "right")?,
                }))
            }
            "SHOOT_CMD" => Ok(ClientMessage::Shoot),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        let mut line = match self {
            ClientMessage::Connect { name } => format!("CONNECT;{}", sanitize_field(name)),
            ClientMessage::Input(flags) => format!(
                "INPUT;{};{};{};{}",
                flags.forward, flags.backward, flags.turn_left, flags.turn_right
            ),
            ClientMessage::Shoot => "SHOOT_CMD".to_string(),
        };
        line.push('\n');
        line
    }
}

impl ServerMessage {
    /// Encode as one newline-terminated line
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(48);
        // Writing into a String cannot fail
        let _ = match self {
            ServerMessage::AssignId { id, x, y, rotation } => {
                write!(out, "ASSIGN_ID;{id};{x:.2};{y:.2};{rotation:.2}")
            }
            ServerMessage::NewPlayer {
                id,
                x,
                y,
                rotation,
                name,
                color,
            } => write!(
                out,
                "NEW_PLAYER;{id};{x:.2};{y:.2};{rotation:.2};{};{};{};{}",
                sanitize_field(name),
                color.r,
                color.g,
                color.b
            ),
            ServerMessage::PlayerUpdate { id, x, y, rotation } => {
                write!(out, "PLAYER_UPDATE;{id};{x:.2};{y:.2};{rotation:.2}")
            }
            ServerMessage::Respawn { id, x, y, rotation } => {
                write!(out, "RESPAWN;{id};{x:.2};{y:.2};{rotation:.2}")
            }
            ServerMessage::PlayerLeft { id } => write!(out, "PLAYER_LEFT;{id}"),
            ServerMessage::Shoot {
                bullet_id,
                owner_id,
                x,
                y,
                dir_x,
                dir_y,
            } => write!(
                out,
                "SHOOT;{bullet_id};{owner_id};{x:.2};{y:.2};{dir_x:.4};{dir_y:.4}"
            ),
            ServerMessage::Hit {
                target_id,
                shooter_id,
                bullet_id,
                damage,
            } => write!(out, "HIT;{target_id};{shooter_id};{bullet_id};{damage}"),
            ServerMessage::Destroyed {
                target_id,
                shooter_id,
            } => write!(out, "DESTROYED;{target_id};{shooter_id}"),
            ServerMessage::PlayerLives { id, lives } => write!(out, "PLAYER_LIVES;{id};{lives}"),
            ServerMessage::GameState { phase, time_ms } => {
                write!(out, "GAME_STATE;{phase};{time_ms}")
            }
            ServerMessage::ShootCooldown { remaining_ms } => {
                write!(out, "SHOOT_COOLDOWN;{remaining_ms}")
            }
            ServerMessage::Announce { text } => write!(out, "ANNOUNCE;{}", sanitize_field(text)),
            ServerMessage::MapInfo {
                width_tiles,
                height_tiles,
                tile_size,
            } => write!(out, "MAP_INFO;{width_tiles};{height_tiles};{tile_size}"),
            ServerMessage::Error { reason } => write!(out, "ERROR_MSG;{}", sanitize_field(reason)),
        };
        out.push('\n');
        out
    }

    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let tokens = tokenize(line)?;
        let msg = match tokens[0].trim() {
            "ASSIGN_ID" => {
                let f = Fields::new("ASSIGN_ID", tokens, 5)?;
                ServerMessage::AssignId {
                    id: f.number(1, "id")?,
                    x: f.float(2, "x")?,
                    y: f.float(3, "y")?,
                    rotation: f.float(4, "rotation")?,
                }
            }
            "NEW_PLAYER" => {
                let f = Fields::new("NEW_PLAYER", tokens, 9)?;
                ServerMessage::NewPlayer {
                    id: f.number(1, "id")?,
                    x: f.float(2, "x")?,
                    y: f.float(3, "y")?,
                    rotation: f.float(4, "rotation")?,
                    name: f.text(5).to_string(),
                    color: Color::new(f.number(6, "r")?, f.number(7, "g")?, f.number(8, "b")?),
                }
            }
            "PLAYER_UPDATE" => {
                let f = Fields::new("PLAYER_UPDATE", tokens, 5)?;
                ServerMessage::PlayerUpdate {
                    id: f.number(1, "id")?,
                    x: f.float(2, "x")?,
                    y: f.float(3, "y")?,
                    rotation: f.float(4, "rotation")?,
                }
            }
            "RESPAWN" => {
                let f = Fields::new("RESPAWN", tokens, 5)?;
                ServerMessage::Respawn {
                    id: f.number(1, "id")?,
                    x: f.float(2, "x")?,
                    y: f.float(3, "y")?,
                    rotation: f.float(4, "rotation")?,
                }
            }
            "PLAYER_LEFT" => {
                let f = Fields::new("PLAYER_LEFT", tokens, 2)?;
                ServerMessage::PlayerLeft {
                    id: f.number(1, "id")?,
                }
            }
            "SHOOT" => {
                let f = Fields::new("SHOOT", tokens, 7)?;
                ServerMessage::Shoot {
                    bullet_id: f.number(1, "bullet_id")?,
                    owner_id: f.number(2, "owner_id")?,
                    x: f.float(3, "x")?,
                    y: f.float(4, "y")?,
                    dir_x: f.float(5, "dir_x")?,
                    dir_y: f.float(6, "dir_y")?,
                }
            }
            "HIT" => {
                let f = Fields::new("HIT", tokens, 5)?;
                ServerMessage::Hit {
                    target_id: f.number(1, "target_id")?,
                    shooter_id: f.number(2, "shooter_id")?,
                    bullet_id: f.number(3, "bullet_id")?,
                    damage: f.number(4, "damage")?,
                }
            }
            "DESTROYED" => {
                let f = Fields::new("DESTROYED", tokens, 3)?;
                ServerMessage::Destroyed {
                    target_id: f.number(1, "target_id")?,
                    shooter_id: f.number(2, "shooter_id")?,
                }
            }
            "PLAYER_LIVES" => {
                let f = Fields::new("PLAYER_LIVES", tokens, 3)?;
                ServerMessage::PlayerLives {
                    id: f.number(1, "id")?,
                    lives: f.number(2, "lives")?,
                }
            }
            "GAME_STATE" => {
                let f = Fields::new("GAME_STATE", tokens, 3)?;
                ServerMessage::GameState {
                    phase: f.phase(1, "phase")?,
                    time_ms: f.number(2, "time_ms")?,
                }
            }
            "SHOOT_COOLDOWN" => {
                let f = Fields::new("SHOOT_COOLDOWN", tokens, 2)?;
                ServerMessage::ShootCooldown {
                    remaining_ms: f.number(1, "remaining_ms")?,
                }
            }
            "ANNOUNCE" => {
                let f = Fields::new("ANNOUNCE", tokens, 2)?;
                ServerMessage::Announce {
                    text: f.text(1).to_string(),
                }
            }
            "MAP_INFO" => {
                let f = Fields::new("MAP_INFO", tokens, 4)?;
                ServerMessage::MapInfo {
                    width_tiles: f.number(1, "width_tiles")?,
                    height_tiles: f.number(2, "height_tiles")?,
                    tile_size: f.float(3, "tile_size")?,
                }
            }
            "ERROR_MSG" => {
                let f = Fields::new("ERROR_MSG", tokens, 2)?;
                ServerMessage::Error {
                    reason: f.text(1).to_string(),
                }
            }
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        };
        Ok(msg)
    }
}

/// Replace the delimiter and line breaks so a value stays one field.
pub fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == DELIMITER || c.is_control() { ' ' } else { c })
        .collect()
}

/// Clean a client-chosen display name; empty names fall back to `Player<id>`.
pub fn sanitize_name(raw: &str, id: PlayerId) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != DELIMITER && !c.is_control())
        .collect();
    let trimmed: String = cleaned.trim().chars().take(MAX_NAME_LEN).collect();
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() {
        format!("Player{id}")
    } else {
        trimmed.to_string()
    }
}
