mod handler;
mod model;

pub use handler::counters;
pub use model::{CounterEntry, StatsQuery, StatsResponse};
