use axum::extract::Extension;
use uuid::Uuid;

use crate::middleware::{ApiResponse, ApiResult, Path};
use crate::services::invitations::SystemInvitationView;
use crate::services::InvitationService;
use crate::state::AppState;

/// GET /auth/invitations/:token - Whether a system invitation can still be used
pub async fn system_invitation(
    Path(token): Path<Uuid>,
    Extension(state): Extension<AppState>,
) -> ApiResult<SystemInvitationView> {
    let view = InvitationService::new(&state).validate_system(token).await?;
    Ok(ApiResponse::success(view))
}
