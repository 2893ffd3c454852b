use axum::extract::Extension;
use uuid::Uuid;

use crate::database::models::NewCaseInvitation;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Json, Path};
use crate::services::invitations::{Actor, CaseInvitationView};
use crate::services::InvitationService;
use crate::state::AppState;

/// GET /api/cases/:case_id/invitations - Owner only; includes effective status
pub async fn list(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Vec<CaseInvitationView>> {
    let invitations = InvitationService::new(&state).list(auth_user.user_id, case_id).await?;
    Ok(ApiResponse::success(invitations))
}

/// POST /api/cases/:case_id/invitations - `{invitee_email, access_level, message?}`
pub async fn invite(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<NewCaseInvitation>,
) -> ApiResult<CaseInvitationView> {
    let actor = Actor { id: auth_user.user_id, email: &auth_user.email, role: auth_user.role };
    let invitation = InvitationService::new(&state).invite(actor, case_id, payload).await?;
    Ok(ApiResponse::created(invitation))
}
