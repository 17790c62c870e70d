use axum::{
    extract::{Query, State},
    response::IntoResponse,
};

use super::model::{CounterEntry, StatsQuery, StatsResponse};
use crate::{
    AppState,
    cache::keys::{counting_key, is_counting_key, reaches_into_token, redact_counting_key},
    error::AppError,
    utils::success_to_api_response,
};

/// Live window counters, for debugging. Only the counting namespace is
/// exposed, and token values are redacted.
pub async fn counters(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let prefix = query.prefix.unwrap_or_else(|| counting_key(""));
    if !is_counting_key(&prefix) {
        return Err(AppError::BadRequest(format!(
            "prefix must start with `{}`",
            counting_key("")
        )));
    }

    if reaches_into_token(&prefix) {
        return Err(AppError::BadRequest(
            "prefix may not filter on token values".to_string(),
        ));
    }

    let counters = state
        .limiter
        .storage()
        .snapshot(&prefix)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, prefix = %prefix, "Failed to read counters");
            AppError::StoreUnavailable
        })?;

    let counters: Vec<CounterEntry> = counters
        .into_iter()
        .map(|(key, count)| CounterEntry {
            key: redact_counting_key(&key),
            count,
        })
        .collect();

    Ok(success_to_api_response(StatsResponse {
        prefix,
        total_keys: counters.len(),
        counters,
    }))
}
