use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub prefix: Option<String>,
}

/// One live counter. Token keys are redacted, so two entries may share a
/// displayed key.
#[derive(Debug, Serialize, Deserialize)]
pub struct CounterEntry {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub prefix: String,
    pub total_keys: usize,
    pub counters: Vec<CounterEntry>,
}
