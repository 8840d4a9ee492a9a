//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Which game mode the server runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameModeKind {
    /// Unlimited respawns, timed rounds, no victory condition
    FreeForAll,
    /// Limited lives, the last tank with lives left wins
    LastTankStanding,
}

impl FromStr for GameModeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ffa" | "free_for_all" => Ok(Self::FreeForAll),
            "lts" | "last_tank_standing" => Ok(Self::LastTankStanding),
            _ => Err(ConfigError::Invalid("GAME_MODE")),
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::Invalid("LOG_FORMAT")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,

    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Active game mode
    pub game_mode: GameModeKind,
    /// Override of the mode's minimum player count
    pub min_players: Option<usize>,
    /// Maximum simultaneously joined players
    pub max_players: usize,

    /// Map width in tiles
    pub map_width: u32,
    /// Map height in tiles
    pub map_height: u32,
    /// Tile edge length in world units
    pub tile_size: f32,
    /// Seed for spawn-point generation (random when unset)
    pub rng_seed: Option<u64>,

    /// Outbound frames buffered per connection before it counts as too slow
    pub send_buffer: usize,
    /// Max time a single outbound write may take
    pub send_timeout: Duration,
    /// Max time a fresh socket may take to send its join line
    pub join_timeout: Duration,

    /// Countdown length before a round starts
    pub countdown: Duration,
    /// Free-for-all round length
    pub round_length: Duration,
    /// Time the round result stays up before the next round is armed
    pub round_over: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            tick_rate: 30,
            game_mode: GameModeKind::FreeForAll,
            min_players: None,
            max_players: 16,
            map_width: 40,
            map_height: 30,
            tile_size: 32.0,
            rng_seed: None,
            send_buffer: 256,
            send_timeout: Duration::from_millis(2_000),
            join_timeout: Duration::from_millis(10_000),
            countdown: Duration::from_secs(5),
            round_length: Duration::from_secs(180),
            round_over: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| defaults.server_addr.to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_var("LOG_FORMAT", defaults.log_format)?,

            tick_rate: parse_var("TICK_RATE", defaults.tick_rate)?,
            game_mode: parse_var("GAME_MODE", defaults.game_mode)?,
            min_players: parse_optional("MIN_PLAYERS")?,
            max_players: parse_var("MAX_PLAYERS", defaults.max_players)?,

            map_width: parse_var("MAP_WIDTH", defaults.map_width)?,
            map_height: parse_var("MAP_HEIGHT", defaults.map_height)?,
            tile_size: parse_var("TILE_SIZE", defaults.tile_size)?,
            rng_seed: parse_optional("RNG_SEED")?,

            send_buffer: parse_var("SEND_BUFFER", defaults.send_buffer)?,
            send_timeout: parse_millis("SEND_TIMEOUT_MS", defaults.send_timeout)?,
            join_timeout: parse_millis("JOIN_TIMEOUT_MS", defaults.join_timeout)?,

            countdown: parse_secs("COUNTDOWN_SECS", defaults.countdown)?,
            round_length: parse_secs("ROUND_SECS", defaults.round_length)?,
            round_over: parse_secs("ROUND_OVER_SECS", defaults.round_over)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 || self.tick_rate > 1_000 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("MAX_PLAYERS"));
        }
        if !(self.tile_size.is_finite() && self.tile_size > 0.0) {
            return Err(ConfigError::Invalid("TILE_SIZE"));
        }
        if self.send_buffer < join_burst_len(self.max_players) + JOIN_BURST_HEADROOM {
            return Err(ConfigError::Invalid("SEND_BUFFER"));
        }
        Ok(())
    }
}

/// Lines queued to a joiner before its writer starts draining: ASSIGN_ID,
/// MAP_INFO and GAME_STATE, NEW_PLAYER and PLAYER_LIVES for each other tank,
/// then its own NEW_PLAYER and PLAYER_LIVES broadcast.
pub fn join_burst_len(max_players: usize) -> usize {
    3 + 2 * max_players
}

/// Room left after the join burst for ticks that land before the first write
pub const JOIN_BURST_HEADROOM: usize = 8;

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn parse_optional<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

fn parse_millis(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_optional::<u64>(name).map(|v| v.map(Duration::from_millis).unwrap_or(default))
}

fn parse_secs(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_optional::<u64>(name).map(|v| v.map(Duration::from_secs).unwrap_or(default))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!("ffa".parse::<GameModeKind>().ok(), Some(GameModeKind::FreeForAll));
        assert_eq!(
            "LTS".parse::<GameModeKind>().ok(),
            Some(GameModeKind::LastTankStanding)
        );
        assert!("capture_the_flag".parse::<GameModeKind>().is_err());
    }

    #[test]
    fn undersized_send_buffer_is_rejected() {
        let config = Config {
            send_buffer: 4,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid("SEND_BUFFER"))));
    }

    #[test]
    fn send_buffer_must_fit_a_full_join_burst() {
        let smallest = join_burst_len(16) + JOIN_BURST_HEADROOM;
        assert_eq!(smallest, 43);

        let at_bound = Config {
            max_players: 16,
            send_buffer: smallest,
            ..Config::default()
        };
        assert!(at_bound.validate().is_ok());

        let below = Config {
            send_buffer: smallest - 1,
            ..at_bound.clone()
        };
        assert!(matches!(below.validate(), Err(ConfigError::Invalid("SEND_BUFFER"))));

        let old_bound = Config {
            send_buffer: 24,
            ..at_bound
        };
        assert!(old_bound.validate().is_err());
    }
}
