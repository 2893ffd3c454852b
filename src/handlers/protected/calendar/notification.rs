use axum::extract::Extension;
use uuid::Uuid;

use crate::database::models::{EventNotification, NewNotification};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Json, Path};
use crate::services::NotificationService;
use crate::state::AppState;

/// GET /api/calendar/events/:event_id/notifications - The caller's reminders
pub async fn list(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Vec<EventNotification>> {
    let rows = NotificationService::new(&state).list(auth_user.user_id, event_id).await?;
    Ok(ApiResponse::success(rows))
}

/// POST /api/calendar/events/:event_id/notifications - `{notification_type, notification_time}`
pub async fn create(
    Path(event_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<NewNotification>,
) -> ApiResult<EventNotification> {
    let row = NotificationService::new(&state)
        .create(auth_user.user_id, event_id, payload)
        .await?;
    Ok(ApiResponse::created(row))
}
