use std::sync::Arc;

use config::Config;
use limiter::RateLimiter;

pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod result;
pub mod router;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config, limiter: RateLimiter) -> Self {
        Self {
            config: Arc::new(config),
            limiter,
        }
    }
}
