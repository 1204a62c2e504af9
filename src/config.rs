//! Server configuration from the environment

use crate::llm::LlmConfig;
use crate::tools::ToolProfile;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "./chat_history.db";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HISTORY_CACHE_SIZE: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    /// Selects which short-circuit tools start enabled
    pub environment: ToolProfile,
    /// `None` lets a turn run as long as the model keeps streaming
    pub turn_deadline: Option<Duration>,
    /// Threads whose history stays in memory between turns
    pub history_cache_size: usize,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            port: DEFAULT_PORT,
            environment: ToolProfile::default(),
            turn_deadline: None,
            history_cache_size: DEFAULT_HISTORY_CACHE_SIZE,
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values are logged and
    /// replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get("TURNSTILE_PORT").map(|p| p.parse::<u16>()) {
            Some(Ok(port)) => port,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Ignoring invalid TURNSTILE_PORT");
                defaults.port
            }
            None => defaults.port,
        };

        let environment = match get("TURNSTILE_ENV").map(|env| env.parse::<ToolProfile>()) {
            Some(Ok(profile)) => profile,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Falling back to development tools");
                defaults.environment
            }
            None => defaults.environment,
        };

        let turn_deadline = match get("TURNSTILE_TURN_DEADLINE_SECS").map(|s| s.parse::<u64>()) {
            Some(Ok(0)) | None => None,
            Some(Ok(secs)) => Some(Duration::from_secs(secs)),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Ignoring invalid TURNSTILE_TURN_DEADLINE_SECS");
                None
            }
        };

        let history_cache_size =
            match get("TURNSTILE_HISTORY_CACHE_SIZE").map(|s| s.parse::<usize>()) {
                Some(Ok(size)) => size,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Ignoring invalid TURNSTILE_HISTORY_CACHE_SIZE");
                    defaults.history_cache_size
                }
                None => defaults.history_cache_size,
            };

        Self {
            db_path: get("TURNSTILE_DB_PATH").map_or(defaults.db_path, PathBuf::from),
            port,
            environment,
            turn_deadline,
            history_cache_size,
            llm: LlmConfig::from_lookup(&lookup),
        }
    }
}
