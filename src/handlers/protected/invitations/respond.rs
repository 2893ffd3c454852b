use axum::extract::Extension;
use uuid::Uuid;

use crate::database::models::CaseInvitation;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Path};
use crate::services::invitations::{Acceptance, Actor};
use crate::services::InvitationService;
use crate::state::AppState;

fn actor(auth_user: &AuthUser) -> Actor<'_> {
    Actor { id: auth_user.user_id, email: &auth_user.email, role: auth_user.role }
}

/// POST /api/invitations/case/:token/accept - Invitee only
pub async fn accept(
    Path(token): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Acceptance> {
    let acceptance = InvitationService::new(&state).accept(actor(&auth_user), token).await?;
    Ok(ApiResponse::success(acceptance))
}

/// POST /api/invitations/case/:token/decline
pub async fn decline(
    Path(token): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<CaseInvitation> {
    let invitation = InvitationService::new(&state).decline(actor(&auth_user), token).await?;
    Ok(ApiResponse::success(invitation))
}
