mod error_handler;
mod identity;
mod rate_limit;

pub use error_handler::log_rejections;
pub use identity::{Identity, client_ip};
pub use rate_limit::{LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER, rate_limit};
