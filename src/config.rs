use std::fmt;
use std::str::FromStr;

use crate::error::OtMcpError;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 256;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;

/// Ceiling applied to every paginated tool argument.
pub const MAX_PAGE_SIZE: i64 = 500;

pub const TRANSPORT_ENV: &str = "MCP_TRANSPORT";
pub const SERVER_HOST_ENV: &str = "OTMCP_SERVER_HOST";
pub const SERVER_PORT_ENV: &str = "OTMCP_SERVER_PORT";
pub const RATE_LIMIT_ENABLED_ENV: &str = "OPEN_TARGETS_RATE_LIMIT_ENABLED";
pub const RATE_LIMIT_RPS_ENV: &str = "OPEN_TARGETS_RATE_LIMIT_RPS";
pub const RATE_LIMIT_BURST_ENV: &str = "OPEN_TARGETS_RATE_LIMIT_BURST";

pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8000;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 20;

/// Substituted when rate limiting is enabled without an explicit RPS.
pub const ENABLED_RATE_LIMIT_RPS: f64 = 3.0;
pub const ENABLED_RATE_LIMIT_BURST: u32 = 100;

/// Construction-time knobs for [`crate::sources::opentargets::OpenTargetsClient`].
///
/// Bounds are enforced by [`ClientConfig::validate`]; out-of-range values are
/// configuration errors, never silently clamped.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint override. `None` falls back to `OPEN_TARGETS_API_URL` or the
    /// platform default.
    pub base: Option<String>,
    /// Result-cache TTL in seconds. Zero disables caching entirely.
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    /// Total attempt budget per query, including the first attempt.
    pub max_retries: u32,
    /// Base backoff delay in seconds; attempt `n` sleeps `delay * 2^n`.
    pub retry_delay_secs: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), OtMcpError> {
        if self.max_retries < 1 {
            return Err(OtMcpError::InvalidConfig(
                "max_retries must be >= 1".to_string(),
            ));
        }
        if self.cache_max_entries < 1 {
            return Err(OtMcpError::InvalidConfig(
                "cache_max_entries must be >= 1".to_string(),
            ));
        }
        if !(self.retry_delay_secs >= 0.0) {
            return Err(OtMcpError::InvalidConfig(
                "retry_delay must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Sse,
}

impl FromStr for Transport {
    type Err = OtMcpError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "sse" => Ok(Transport::Sse),
            other => Err(OtMcpError::InvalidConfig(format!(
                "unsupported MCP transport: {other} (expected stdio or sse)"
            ))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stdio => f.write_str("stdio"),
            Transport::Sse => f.write_str("sse"),
        }
    }
}

/// Server runtime settings resolved from the environment; CLI flags override
/// individual fields after the fact.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub rate_limit_enabled: bool,
    pub rate_limit_rps: f64,
    pub rate_limit_burst: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            rate_limit_enabled: false,
            rate_limit_rps: 0.0,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

impl ServerSettings {
    pub fn from_env() -> Result<Self, OtMcpError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, OtMcpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(value) = lookup(TRANSPORT_ENV) {
            settings.transport = value.parse()?;
        }
        if let Some(value) = lookup(SERVER_HOST_ENV) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                settings.host = trimmed.to_string();
            }
        }
        if let Some(value) = lookup(SERVER_PORT_ENV) {
            settings.port = parse_port(&value)?;
        }
        if let Some(value) = lookup(RATE_LIMIT_ENABLED_ENV) {
            settings.rate_limit_enabled = parse_bool(RATE_LIMIT_ENABLED_ENV, &value)?;
        }
        if let Some(value) = lookup(RATE_LIMIT_RPS_ENV) {
            let rps: f64 = value.trim().parse().map_err(|_| {
                OtMcpError::InvalidConfig(format!("{RATE_LIMIT_RPS_ENV} must be a number >= 0"))
            })?;
            if !(rps >= 0.0) {
                return Err(OtMcpError::InvalidConfig(format!(
                    "{RATE_LIMIT_RPS_ENV} must be a number >= 0"
                )));
            }
            settings.rate_limit_rps = rps;
        }
        if let Some(value) = lookup(RATE_LIMIT_BURST_ENV) {
            let burst: u32 = value.trim().parse().map_err(|_| {
                OtMcpError::InvalidConfig(format!("{RATE_LIMIT_BURST_ENV} must be an integer >= 1"))
            })?;
            if burst < 1 {
                return Err(OtMcpError::InvalidConfig(format!(
                    "{RATE_LIMIT_BURST_ENV} must be an integer >= 1"
                )));
            }
            settings.rate_limit_burst = burst;
        }

        Ok(settings)
    }

    /// The (rps, burst) pair to enforce, or `None` when limiting is off.
    ///
    /// Any positive RPS enables limiting on its own. The enable flag with an
    /// unset RPS substitutes the documented defaults; a burst left at the
    /// settings default is raised alongside it.
    pub fn effective_rate_limit(&self) -> Option<(f64, u32)> {
        if self.rate_limit_rps > 0.0 {
            return Some((self.rate_limit_rps, self.rate_limit_burst));
        }
        if self.rate_limit_enabled {
            let burst = if self.rate_limit_burst == DEFAULT_RATE_LIMIT_BURST {
                ENABLED_RATE_LIMIT_BURST
            } else {
                self.rate_limit_burst
            };
            return Some((ENABLED_RATE_LIMIT_RPS, burst));
        }
        None
    }
}

fn parse_port(value: &str) -> Result<u16, OtMcpError> {
    let port: u16 = value.trim().parse().map_err(|_| {
        OtMcpError::InvalidConfig(format!(
            "{SERVER_PORT_ENV} must be an integer between 1 and 65535"
        ))
    })?;
    if port == 0 {
        return Err(OtMcpError::InvalidConfig(format!(
            "{SERVER_PORT_ENV} must be an integer between 1 and 65535"
        )));
    }
    Ok(port)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, OtMcpError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(OtMcpError::InvalidConfig(format!(
            "{name} must be a boolean (true/false)"
        ))),
    }
}
