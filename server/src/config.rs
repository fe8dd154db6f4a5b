//! Server configuration.

use crate::error::ServerError;
use std::time::Duration;

/// Configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the TCP listener.
    pub listen_addr: String,
    /// Outbound queue per session. Messages beyond it are dropped.
    pub outbound_capacity: usize,
    /// Inbound queue per session.
    pub inbox_capacity: usize,
    /// Pending hub broadcasts.
    pub broadcast_capacity: usize,
    /// How long a battle round waits for commands.
    pub round_timeout: Duration,
    /// How long a battle waits for both sides to confirm the next round.
    pub confirm_timeout: Duration,
    /// How long a side may take to replace a fainted pet.
    pub replacement_timeout: Duration,
    /// Battle invites older than this are discarded.
    pub invite_expiry: Duration,
    pub invite_sweep_interval: Duration,
    /// Interval of the "save pets" broadcast.
    pub save_interval: Duration,
    /// After this many rounds the battle is decided on remaining hp.
    pub max_rounds: u32,
    /// Consecutive rounds without a command before a side forfeits.
    pub forfeit_after_missed_rounds: u32,
    /// Area new logins are routed into.
    pub default_area: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            outbound_capacity: 256,
            inbox_capacity: 256,
            broadcast_capacity: 1024,
            round_timeout: Duration::from_secs(15),
            confirm_timeout: Duration::from_secs(30),
            replacement_timeout: Duration::from_secs(10),
            invite_expiry: Duration::from_secs(10),
            invite_sweep_interval: Duration::from_secs(5),
            save_interval: Duration::from_secs(60),
            max_rounds: 100,
            forfeit_after_missed_rounds: 3,
            default_area: "InitialVillage".to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with `TOWBER_*` environment variables.
    pub fn from_env() -> Result<Self, ServerError> {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("TOWBER_ADDR") {
            config.listen_addr = addr;
        }
        if let Some(secs) = env_secs("TOWBER_SAVE_INTERVAL_SECS")? {
            config.save_interval = secs;
        }
        if let Some(secs) = env_secs("TOWBER_ROUND_TIMEOUT_SECS")? {
            config.round_timeout = secs;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.outbound_capacity == 0 || self.inbox_capacity == 0 || self.broadcast_capacity == 0 {
            return Err(ServerError::Config("queue capacities must be non-zero".into()));
        }
        if self.save_interval.is_zero() || self.invite_sweep_interval.is_zero() {
            return Err(ServerError::Config("intervals must be non-zero".into()));
        }
        if self.max_rounds == 0 || self.forfeit_after_missed_rounds == 0 {
            return Err(ServerError::Config("round limits must be non-zero".into()));
        }
        Ok(())
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>, ServerError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ServerError::Config(format!("{name} must be a whole number of seconds"))),
        Err(_) => Ok(None),
    }
}
