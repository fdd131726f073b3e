//! Runtime configuration for the lobby server.

use std::path::PathBuf;
use std::time::Duration;

/// Sessions idle for longer than this are removed by the store.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the expiry sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const MAX_CONNECTIONS: usize = 256;

/// Attempts at finding an unused lobby code before giving up.
pub const MAX_CODE_ATTEMPTS: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory of prompt category files; the built-in catalog is used when unset.
    pub prompts_dir: Option<PathBuf>,
    /// Directory for persisted sessions; sessions live in memory when unset.
    pub data_dir: Option<PathBuf>,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_connections: usize,
    /// Seed for prompt sampling and code generation.
    pub seed: Option<u64>,
    /// Allowed CORS origins; empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            prompts_dir: None,
            data_dir: None,
            session_ttl: SESSION_TTL,
            sweep_interval: SWEEP_INTERVAL,
            max_connections: MAX_CONNECTIONS,
            seed: None,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:3001");
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
        assert!(config.data_dir.is_none());
        assert!(config.cors_origins.is_empty());
    }
}
