use std::env;
use std::path::PathBuf;

/// Server configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub pool_size: u32,
    /// How far back a fresh backfill reaches.
    pub history_days: u32,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind: env_str("CANDLEPAD_BIND", "127.0.0.1"),
            port: env_u16("CANDLEPAD_PORT", 8787),
            db_path: PathBuf::from(env_str("CANDLEPAD_DB", "candlepad.db")),
            pool_size: env_u32("CANDLEPAD_POOL_SIZE", 4),
            history_days: env_u32("CANDLEPAD_HISTORY_DAYS", 730),
        }
    }
}
