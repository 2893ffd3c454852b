use axum::extract::Extension;
use uuid::Uuid;

use crate::database::models::{NewSystemInvitation, SystemInvitation};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Json, Path};
use crate::services::invitations::{Actor, SystemInvitationView};
use crate::services::InvitationService;
use crate::state::AppState;

/// POST /api/invitations/system - System owners only
pub async fn create(
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<NewSystemInvitation>,
) -> ApiResult<SystemInvitationView> {
    let actor = Actor { id: auth_user.user_id, email: &auth_user.email, role: auth_user.role };
    let invitation = InvitationService::new(&state).create_system(actor, payload).await?;
    Ok(ApiResponse::created(invitation))
}

/// DELETE /api/invitations/system/:token - Inviter only, pending only
pub async fn revoke(
    Path(token): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<SystemInvitation> {
    let invitation = InvitationService::new(&state)
        .revoke_system(auth_user.user_id, token)
        .await?;
    Ok(ApiResponse::success(invitation))
}
