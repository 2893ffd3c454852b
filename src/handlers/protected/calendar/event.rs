use axum::extract::Extension;
use uuid::Uuid;

use crate::database::models::{CalendarEvent, EventPatch, NewEvent};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Json, Path, Query};
use crate::services::calendar::{EventDetail, EventListFilter};
use crate::services::CalendarService;
use crate::state::AppState;

/// GET /api/calendar/events
///
/// Query: `type`, `status`, `case_id`, `date_from`, `date_to` (YYYY-MM-DD),
/// `upcoming`, `today`, `week`
pub async fn list(
    Query(filter): Query<EventListFilter>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Vec<CalendarEvent>> {
    let events = CalendarService::new(&state).list_events(auth_user.user_id, &filter).await?;
    Ok(ApiResponse::success(events))
}

/// POST /api/calendar/events
pub async fn create(
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<NewEvent>,
) -> ApiResult<CalendarEvent> {
    let event = CalendarService::new(&state).create_event(auth_user.user_id, payload).await?;
    Ok(ApiResponse::created(event))
}

/// GET /api/calendar/events/:event_id
pub async fn show(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<EventDetail> {
    let detail = CalendarService::new(&state).event_detail(auth_user.user_id, event_id).await?;
    Ok(ApiResponse::success(detail))
}

/// PATCH|PUT /api/calendar/events/:event_id - Scheduled events only
pub async fn update(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(patch): Json<EventPatch>,
) -> ApiResult<CalendarEvent> {
    let event = CalendarService::new(&state)
        .update_event(auth_user.user_id, event_id, patch)
        .await?;
    Ok(ApiResponse::success(event))
}

/// DELETE /api/calendar/events/:event_id - Re-links the postponement chain
pub async fn delete(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<()> {
    CalendarService::new(&state).delete_event(auth_user.user_id, event_id).await?;
    Ok(ApiResponse::no_content())
}
