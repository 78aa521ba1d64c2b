use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{CACHE_TTL_MINUTES, CHANNEL_SIZE};

use crate::transport::log::LogConfig;

/// Which transport decouples connection readers from the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Bounded in-process queue.
    InProc,
    /// Partitioned append-only log with a consumer group.
    Log,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub db_path: PathBuf,
    pub message_mode: TransportMode,
    /// Capacity of the transport queue and every per-client queue.
    pub channel_size: usize,
    /// TTL for cached conversation lists.
    pub cache_ttl: Duration,
    pub log: LogConfig,
    pub cache: CacheBackendConfig,
}

/// Connection settings for an external cache backend. Recognized for
/// deployments that carry them; this build serves from the in-process cache.
#[derive(Debug, Clone)]
pub struct CacheBackendConfig {
    pub host: Option<String>,
    pub port: u16,
    pub db: u32,
    pub password: Option<String>,
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8000).into(),
            db_path: PathBuf::from("./data/parley.db"),
            message_mode: TransportMode::InProc,
            channel_size: CHANNEL_SIZE,
            cache_ttl: Duration::from_secs(60 * CACHE_TTL_MINUTES),
            log: LogConfig::default(),
            cache: CacheBackendConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(mode) = std::env::var("MESSAGE_MODE") {
            match parse_mode(&mode) {
                Some(parsed) => config.message_mode = parsed,
                None => {
                    tracing::warn!(value = %mode, "Invalid MESSAGE_MODE, using inproc");
                }
            }
        }

        if let Ok(val) = std::env::var("CHANNEL_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.channel_size = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid CHANNEL_SIZE, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("CACHE_TTL_MINUTES") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.cache_ttl = Duration::from_secs(60 * n),
                _ => {
                    tracing::warn!(value = %val, "Invalid CACHE_TTL_MINUTES, using default");
                }
            }
        }

        if let Ok(dir) = std::env::var("LOG_DIR") {
            config.log.dir = PathBuf::from(dir);
        }

        if let Ok(topic) = std::env::var("LOG_TOPIC") {
            if !topic.is_empty() {
                config.log.topic = topic;
            }
        }

        if let Ok(val) = std::env::var("LOG_PARTITIONS") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.log.partitions = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid LOG_PARTITIONS, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("LOG_PARTITION") {
            match val.parse::<u32>() {
                Ok(n) => config.log.partition = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid LOG_PARTITION, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("LOG_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.log.timeout = Duration::from_secs(n),
                _ => {
                    tracing::warn!(value = %val, "Invalid LOG_TIMEOUT_SECS, using default");
                }
            }
        }

        if let Ok(host) = std::env::var("CACHE_HOST") {
            if !host.is_empty() {
                config.cache.host = Some(host);
            }
        }

        if let Ok(val) = std::env::var("CACHE_PORT") {
            match val.parse::<u16>() {
                Ok(port) => config.cache.port = port,
                _ => {
                    tracing::warn!(value = %val, "Invalid CACHE_PORT, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("CACHE_DB") {
            match val.parse::<u32>() {
                Ok(db) => config.cache.db = db,
                _ => {
                    tracing::warn!(value = %val, "Invalid CACHE_DB, using default");
                }
            }
        }

        if let Ok(password) = std::env::var("CACHE_PASSWORD") {
            if !password.is_empty() {
                config.cache.password = Some(password);
            }
        }

        config
    }
}

fn parse_mode(value: &str) -> Option<TransportMode> {
    match value {
        "inproc" => Some(TransportMode::InProc),
        "log" => Some(TransportMode::Log),
        _ => None,
    }
}
