mod handler;
mod model;

pub use handler::{echo_headers, protected, root};
