use axum::extract::Extension;
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::CalendarEvent;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Json, Path};
use crate::services::postponement::{ChainHistory, PostponeInput, Postponement};
use crate::services::PostponementService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EventEnvelope {
    pub event: CalendarEvent,
}

/// POST /api/calendar/events/:event_id/postpone
///
/// Body: `{new_start, new_end?, reason}`. Freezes the event as postponed and
/// returns it with the scheduled successor.
pub async fn postpone(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(input): Json<PostponeInput>,
) -> ApiResult<Postponement> {
    let result = PostponementService::new(&state)
        .postpone(auth_user.user_id, event_id, input)
        .await?;
    Ok(ApiResponse::created(result))
}

/// POST /api/calendar/events/:event_id/complete
pub async fn complete(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<EventEnvelope> {
    let event = PostponementService::new(&state)
        .mark_completed(auth_user.user_id, event_id)
        .await?;
    Ok(ApiResponse::success(EventEnvelope { event }))
}

/// POST /api/calendar/events/:event_id/cancel
pub async fn cancel(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<EventEnvelope> {
    let event = PostponementService::new(&state).cancel(auth_user.user_id, event_id).await?;
    Ok(ApiResponse::success(EventEnvelope { event }))
}

/// GET /api/calendar/events/:event_id/history - Whole chain, root first
pub async fn history(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<ChainHistory> {
    let history = PostponementService::new(&state)
        .history(auth_user.user_id, event_id)
        .await?;
    Ok(ApiResponse::success(history))
}
