use axum::extract::Extension;
use chrono::Datelike;
use serde::Deserialize;

use crate::middleware::{ApiResponse, ApiResult, AuthUser, Query};
use crate::services::calendar::{CalendarMonth, CalendarStats};
use crate::services::CalendarService;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// GET /api/calendar/view?year&month - Defaults to the current month
pub async fn month(
    Query(query): Query<MonthQuery>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<CalendarMonth> {
    let today = state.now().date_naive();
    let year = query.year.unwrap_or(today.year());
    let month = query.month.unwrap_or(today.month());
    let view = CalendarService::new(&state)
        .month_view(auth_user.user_id, year, month)
        .await?;
    Ok(ApiResponse::success(view))
}

/// GET /api/calendar/stats
pub async fn stats(
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<CalendarStats> {
    let stats = CalendarService::new(&state).stats(auth_user.user_id).await?;
    Ok(ApiResponse::success(stats))
}
