use axum::extract::Extension;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// GET / - Service description
pub async fn root() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "name": "Casebook API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Case, hearing and deadline tracking for legal practitioners",
        "endpoints": {
            "health": "/health (public)",
            "invitations": "/auth/invitations/:token (public)",
            "cases": "/api/cases[/:case_id[/access|/disputes|/invitations]] (protected)",
            "calendar": "/api/calendar/events, /api/calendar/view, /api/calendar/stats (protected)",
            "respond": "/api/invitations/case/:token/accept|decline (protected)"
        }
    })))
}

/// GET /health - Store connectivity
pub async fn health(Extension(state): Extension<AppState>) -> ApiResult<Value> {
    state.store.ping().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        ApiError::service_unavailable("Database temporarily unavailable")
    })?;

    Ok(ApiResponse::success(json!({
        "status": "ok",
        "store": state.store.backend(),
        "time": state.now(),
    })))
}
