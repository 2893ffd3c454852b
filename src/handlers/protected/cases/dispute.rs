use axum::extract::Extension;
use uuid::Uuid;

use crate::database::models::{DisputePatch, NewDispute, SeparateDispute};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Json, Path};
use crate::services::CaseService;
use crate::state::AppState;

/// GET /api/cases/:case_id/disputes
pub async fn list(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Vec<SeparateDispute>> {
    let disputes = CaseService::new(&state).list_disputes(auth_user.user_id, case_id).await?;
    Ok(ApiResponse::success(disputes))
}

/// POST /api/cases/:case_id/disputes
pub async fn create(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<NewDispute>,
) -> ApiResult<SeparateDispute> {
    let dispute = CaseService::new(&state)
        .create_dispute(auth_user.user_id, case_id, payload)
        .await?;
    Ok(ApiResponse::created(dispute))
}

/// GET /api/cases/:case_id/disputes/:dispute_id
pub async fn show(
    Path((case_id, dispute_id)): Path<(Uuid, Uuid)>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<SeparateDispute> {
    let dispute = CaseService::new(&state)
        .dispute(auth_user.user_id, case_id, dispute_id)
        .await?;
    Ok(ApiResponse::success(dispute))
}

/// PATCH|PUT /api/cases/:case_id/disputes/:dispute_id
pub async fn update(
    Path((case_id, dispute_id)): Path<(Uuid, Uuid)>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(patch): Json<DisputePatch>,
) -> ApiResult<SeparateDispute> {
    let dispute = CaseService::new(&state)
        .update_dispute(auth_user.user_id, case_id, dispute_id, patch)
        .await?;
    Ok(ApiResponse::success(dispute))
}

/// DELETE /api/cases/:case_id/disputes/:dispute_id
pub async fn delete(
    Path((case_id, dispute_id)): Path<(Uuid, Uuid)>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<()> {
    CaseService::new(&state)
        .delete_dispute(auth_user.user_id, case_id, dispute_id)
        .await?;
    Ok(ApiResponse::no_content())
}
