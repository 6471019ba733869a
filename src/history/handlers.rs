use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use time::Date;
use tracing::{debug, instrument};

use super::aggregate::{annotate, summarize};
use super::dto::{HistoryQuery, HistoryResponse};
use crate::dates::{days_before, format_date_key, parse_date_key, today_utc, DateRange};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn history_routes() -> Router<AppState> {
    Router::new().route("/history", get(get_history))
}

/// Fills missing bounds: no end means today, no start means the six days
/// before the end.
fn resolve_window(q: &HistoryQuery, today: Date, max_days: i64) -> Result<DateRange, ApiError> {
    match (q.start.as_deref(), q.end.as_deref()) {
        (None, None) => DateRange::last_week(today),
        (start, end) => {
            let end = match end {
                Some(e) => e.to_string(),
                None => format_date_key(today),
            };
            let start = match start {
                Some(s) => s.to_string(),
                None => format_date_key(days_before(parse_date_key(&end)?, 6)?),
            };
            DateRange::validate(&start, &end, max_days)
        }
    }
}

#[instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let range = resolve_window(&q, today_utc(), state.config.max_range_days)?;
    let records = state.meals.get_range(&range.start, &range.end).await?;
    debug!(start = %range.start, end = %range.end, days = records.len(), "history loaded");

    Ok(Json(HistoryResponse {
        summary: summarize(&records),
        days: records.iter().map(annotate).collect(),
        start: range.start,
        end: range.end,
    }))
}
