use axum::extract::Extension;
use uuid::Uuid;

use crate::database::models::AccessGrant;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Json, Path};
use crate::services::access::GrantRequest;
use crate::services::AccessService;
use crate::state::AppState;

/// GET /api/cases/:case_id/access - Grants on the case (any access)
pub async fn list(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Vec<AccessGrant>> {
    let grants = AccessService::new(&state).list_grants(auth_user.user_id, case_id).await?;
    Ok(ApiResponse::success(grants))
}

/// POST /api/cases/:case_id/access - Owner grants `{user_id, access_level}`
pub async fn grant(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<GrantRequest>,
) -> ApiResult<AccessGrant> {
    let grant = AccessService::new(&state).grant(auth_user.user_id, case_id, request).await?;
    Ok(ApiResponse::created(grant))
}

/// DELETE /api/cases/:case_id/access/:grant_id
pub async fn revoke(
    Path((case_id, grant_id)): Path<(Uuid, Uuid)>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<()> {
    AccessService::new(&state).revoke(auth_user.user_id, case_id, grant_id).await?;
    Ok(ApiResponse::no_content())
}
