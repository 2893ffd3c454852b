use axum::extract::Extension;
use uuid::Uuid;

use crate::database::models::{Case, CaseFilter, CasePatch, NewCase};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Json, Path, Query};
use crate::services::cases::{CaseDetail, CaseStats};
use crate::services::CaseService;
use crate::state::AppState;

/// GET /api/cases - Owned and shared cases, newest first
///
/// Query: `type`, `status`, `search`, `only_owned`
pub async fn list(
    Query(filter): Query<CaseFilter>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Vec<Case>> {
    let cases = CaseService::new(&state).list(auth_user.user_id, &filter).await?;
    Ok(ApiResponse::success(cases))
}

/// POST /api/cases - The caller becomes the owner
pub async fn create(
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<NewCase>,
) -> ApiResult<Case> {
    let case = CaseService::new(&state).create(auth_user.user_id, payload).await?;
    Ok(ApiResponse::created(case))
}

/// GET /api/cases/stats
pub async fn stats(
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<CaseStats> {
    let stats = CaseService::new(&state).stats(auth_user.user_id).await?;
    Ok(ApiResponse::success(stats))
}

/// GET /api/cases/:case_id
pub async fn show(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<CaseDetail> {
    let detail = CaseService::new(&state).detail(auth_user.user_id, case_id).await?;
    Ok(ApiResponse::success(detail))
}

/// PATCH|PUT /api/cases/:case_id - Partial update; requires full access
pub async fn update(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(patch): Json<CasePatch>,
) -> ApiResult<Case> {
    let case = CaseService::new(&state).update(auth_user.user_id, case_id, patch).await?;
    Ok(ApiResponse::success(case))
}

/// DELETE /api/cases/:case_id
pub async fn delete(
    Path(case_id): Path<Uuid>,
    Extension(state): Extension<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<()> {
    CaseService::new(&state).delete(auth_user.user_id, case_id).await?;
    Ok(ApiResponse::no_content())
}
