use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

use crate::cache::keys::{ip_identity, token_identity};
use crate::config::Config;
use crate::limiter::LimitConfig;

/// Subject a request is rate-limited against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Token(String),
    Address(String),
}

impl Identity {
    /// A non-empty token header always wins over the client address, even
    /// when both are present.
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>, token_header: &str) -> Self {
        let token = headers
            .get(token_header)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|t| !t.is_empty());

        match token {
            Some(token) => Identity::Token(token.to_string()),
            None => Identity::Address(client_ip(headers, peer)),
        }
    }

    /// Namespaced identity key handed to the limiter.
    pub fn key(&self) -> String {
        match self {
            Identity::Token(token) => token_identity(token),
            Identity::Address(addr) => ip_identity(addr),
        }
    }

    pub fn limit<'a>(&self, config: &'a Config) -> &'a LimitConfig {
        match self {
            Identity::Token(_) => &config.token_limit,
            Identity::Address(_) => &config.ip_limit,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Identity::Token(token) => Some(token),
            Identity::Address(_) => None,
        }
    }
}

/// Client address as seen through load balancers: first valid IP in
/// `X-Forwarded-For`, then a valid `X-Real-IP`, then the peer socket.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|ip| ip.parse::<IpAddr>().is_ok());

    let real = || {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|ip| ip.parse::<IpAddr>().is_ok())
    };

    forwarded
        .or_else(real)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
