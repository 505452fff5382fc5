//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::validate_options;
use crate::types::GameOptions;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub port: u16,
    /// Persist games as JSON files here; in memory when unset
    pub data_dir: Option<PathBuf>,
    /// Options for games created without explicit settings
    pub default_options: GameOptions,
    pub idle_ttl: Duration,
    pub reaper_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: None,
            default_options: GameOptions::default(),
            idle_ttl: Duration::from_secs(30 * 60),
            reaper_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let fallback = &defaults.default_options;

        let default_options = GameOptions {
            max_players: env_or("MEMEIT_MAX_PLAYERS", fallback.max_players),
            min_players: env_or("MEMEIT_MIN_PLAYERS", fallback.min_players),
            number_of_rounds: env_or("MEMEIT_ROUNDS", fallback.number_of_rounds),
            creative_seconds: env_or("MEMEIT_CREATIVE_SECONDS", fallback.creative_seconds),
            scoring_seconds: env_or("MEMEIT_SCORING_SECONDS", fallback.scoring_seconds),
            scoreboard_seconds: env_or("MEMEIT_SCOREBOARD_SECONDS", fallback.scoreboard_seconds),
            ..fallback.clone()
        };
        let default_options = match validate_options(&default_options) {
            Ok(()) => default_options,
            Err(e) => {
                tracing::warn!("Invalid default game options ({}), using built-in defaults", e);
                fallback.clone()
            }
        };

        let data_dir = std::env::var("MEMEIT_DATA_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let idle_ttl = env_or("MEMEIT_IDLE_TTL_SECONDS", defaults.idle_ttl.as_secs());
        let reaper_interval = env_or(
            "MEMEIT_REAPER_INTERVAL_SECONDS",
            defaults.reaper_interval.as_secs(),
        )
        .max(1);

        Self {
            port: env_or("MEMEIT_PORT", defaults.port),
            data_dir,
            default_options,
            idle_ttl: Duration::from_secs(idle_ttl),
            reaper_interval: Duration::from_secs(reaper_interval),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
