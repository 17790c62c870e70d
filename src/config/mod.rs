use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::limiter::LimitConfig;

const DEFAULT_IP_RPS: u32 = 10;
const DEFAULT_IP_BLOCK_TIME: Duration = Duration::from_secs(300);
const DEFAULT_TOKEN_RPS: u32 = 100;
const DEFAULT_TOKEN_BLOCK_TIME: Duration = Duration::from_secs(600);
const DEFAULT_STORE_TIMEOUT_MS: u64 = 3000;
const DEFAULT_TOKEN_HEADER: &str = "API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// What the admission middleware does when the counter store fails.
///
/// `Open` lets the request through, so a store outage becomes a rate-limit
/// bypass. `Closed` rejects it, so a store outage becomes an availability
/// incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    Open,
    Closed,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailurePolicy::Open),
            "closed" => Ok(FailurePolicy::Closed),
            other => Err(format!("expected `open` or `closed`, got `{}`", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub store_timeout_ms: u64,
    pub ip_limit: LimitConfig,
    pub token_limit: LimitConfig,
    pub failure_policy: FailurePolicy,
    pub token_header: String,
    pub server_host: IpAddr,
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            redis_url: redis_url_from_parts("localhost", "6379", "", 0),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            ip_limit: LimitConfig::new(DEFAULT_IP_RPS, DEFAULT_IP_BLOCK_TIME),
            token_limit: LimitConfig::new(DEFAULT_TOKEN_RPS, DEFAULT_TOKEN_BLOCK_TIME),
            failure_policy: FailurePolicy::Open,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            server_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_port: 8080,
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Unset or
    /// empty variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let ip_rps = parse_var(&var, "RATE_LIMIT_IP_RPS", DEFAULT_IP_RPS, parse_rps)?;
        let ip_block = parse_var(
            &var,
            "RATE_LIMIT_IP_BLOCK_TIME",
            DEFAULT_IP_BLOCK_TIME,
            parse_duration,
        )?;
        let token_rps = parse_var(&var, "RATE_LIMIT_TOKEN_RPS", DEFAULT_TOKEN_RPS, parse_rps)?;
        let token_block = parse_var(
            &var,
            "RATE_LIMIT_TOKEN_BLOCK_TIME",
            DEFAULT_TOKEN_BLOCK_TIME,
            parse_duration,
        )?;

        let redis_url = match var("REDIS_URL") {
            Some(url) => url,
            None => {
                let host = var("REDIS_HOST").unwrap_or_else(|| "localhost".into());
                let port = var("REDIS_PORT").unwrap_or_else(|| "6379".into());
                let password = var("REDIS_PASSWORD").unwrap_or_default();
                let db = parse_var(&var, "REDIS_DB", 0u32, |s| {
                    s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
                })?;
                redis_url_from_parts(&host, &port, &password, db)
            }
        };

        Ok(Config {
            redis_url,
            store_timeout_ms: parse_var(
                &var,
                "STORE_TIMEOUT_MS",
                defaults.store_timeout_ms,
                parse_timeout_ms,
            )?,
            ip_limit: LimitConfig::new(ip_rps, ip_block),
            token_limit: LimitConfig::new(token_rps, token_block),
            failure_policy: parse_var(
                &var,
                "RATE_LIMIT_FAILURE_POLICY",
                defaults.failure_policy,
                |s| s.parse(),
            )?,
            token_header: var("RATE_LIMIT_TOKEN_HEADER").unwrap_or(defaults.token_header),
            server_host: parse_var(&var, "SERVER_HOST", defaults.server_host, |s| {
                s.parse()
                    .map_err(|_| format!("`{}` is not an IP address", s))
            })?,
            server_port: parse_var(&var, "SERVER_PORT", defaults.server_port, |s| {
                s.parse().map_err(|e: std::num::ParseIntError| e.to_string())
            })?,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn parse_var<T, V, P>(var: &V, key: &'static str, default: T, parse: P) -> Result<T, ConfigError>
where
    V: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, String>,
{
    match var(key) {
        Some(value) => parse(value.trim()).map_err(|reason| ConfigError::Invalid {
            key,
            value,
            reason,
        }),
        None => Ok(default),
    }
}

fn parse_rps(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

// A zero timeout would fail every store call.
fn parse_timeout_ms(s: &str) -> Result<u64, String> {
    match s.parse::<u64>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Parses `500ms`, `300s`, `5m`, `1h`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("`{}` is not a duration", s))?;
    value
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("`{}` is out of range", s))
}

fn redis_url_from_parts(host: &str, port: &str, password: &str, db: u32) -> String {
    if password.is_empty() {
        format!("redis://{}:{}/{}", host, port, db)
    } else {
        format!("redis://:{}@{}:{}/{}", password, host, port, db)
    }
}
