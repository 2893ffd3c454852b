use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::HeaderValue,
    middleware::from_fn,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::config;
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// Full application router over `state`
pub fn app(state: AppState) -> Router {
    let settings = config();

    let mut router = Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/auth/invitations/:token", get(public::system_invitation_get))
        // Protected API
        .merge(
            Router::new()
                .merge(case_routes())
                .merge(calendar_routes())
                .merge(invitation_routes())
                .route_layer(from_fn(jwt_auth_middleware)),
        )
        // Global middleware
        .layer(DefaultBodyLimit::max(settings.api.max_request_size_bytes))
        .layer(Extension(state));

    if settings.security.enable_cors {
        router = router.layer(cors_layer(&settings.security.cors_origins));
    }
    if settings.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

fn case_routes() -> Router {
    use protected::cases;

    Router::new()
        .route("/api/cases", get(cases::case_list).post(cases::case_create))
        .route("/api/cases/stats", get(cases::case_stats))
        .route(
            "/api/cases/:case_id",
            get(cases::case_show)
                .patch(cases::case_update)
                .put(cases::case_update)
                .delete(cases::case_delete),
        )
        // Access grants
        .route(
            "/api/cases/:case_id/access",
            get(cases::access_list).post(cases::access_grant),
        )
        .route("/api/cases/:case_id/access/:grant_id", delete(cases::access_revoke))
        // Invitations issued by the owner
        .route(
            "/api/cases/:case_id/invitations",
            get(cases::invitation_list).post(cases::invitation_create),
        )
        // Separate disputes
        .route(
            "/api/cases/:case_id/disputes",
            get(cases::dispute_list).post(cases::dispute_create),
        )
        .route(
            "/api/cases/:case_id/disputes/:dispute_id",
            get(cases::dispute_show)
                .patch(cases::dispute_update)
                .put(cases::dispute_update)
                .delete(cases::dispute_delete),
        )
}

fn calendar_routes() -> Router {
    use protected::calendar;

    Router::new()
        .route(
            "/api/calendar/events",
            get(calendar::event_list).post(calendar::event_create),
        )
        .route(
            "/api/calendar/events/:event_id",
            get(calendar::event_show)
                .patch(calendar::event_update)
                .put(calendar::event_update)
                .delete(calendar::event_delete),
        )
        // Lifecycle
        .route("/api/calendar/events/:event_id/postpone", post(calendar::event_postpone))
        .route("/api/calendar/events/:event_id/complete", post(calendar::event_complete))
        .route("/api/calendar/events/:event_id/cancel", post(calendar::event_cancel))
        .route("/api/calendar/events/:event_id/history", get(calendar::event_history))
        .route(
            "/api/calendar/events/:event_id/notifications",
            get(calendar::notification_list).post(calendar::notification_create),
        )
        // Views
        .route("/api/calendar/view", get(calendar::calendar_view))
        .route("/api/calendar/stats", get(calendar::calendar_stats))
}

fn invitation_routes() -> Router {
    use protected::invitations;

    Router::new()
        .route(
            "/api/invitations/case/:token/accept",
            post(invitations::case_invitation_accept),
        )
        .route(
            "/api/invitations/case/:token/decline",
            post(invitations::case_invitation_decline),
        )
        .route("/api/invitations/system", post(invitations::system_invitation_create))
        .route(
            "/api/invitations/system/:token",
            delete(invitations::system_invitation_revoke),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::auth::{generate_jwt, Claims, UserRole};
    use crate::testing::Fixture;

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, body)
    }

    #[tokio::test]
    async fn health_is_public() {
        let fx = Fixture::new();
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = call(app(fx.state.clone()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["store"], "memory");
    }

    #[tokio::test]
    async fn api_rejects_missing_token() {
        let fx = Fixture::new();
        let request = Request::get("/api/cases").body(Body::empty()).unwrap();
        let (status, body) = call(app(fx.state.clone()), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn unknown_case_is_not_found_for_the_caller() {
        let fx = Fixture::new();
        let stranger = uuid::Uuid::new_v4();
        let case = fx.case(fx.owner).await;
        let token = generate_jwt(Claims::new(stranger, "x@firm.test".into(), String::new(), UserRole::Owner)).unwrap();

        let request = Request::get(format!("/api/cases/{}", case.id))
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(fx.state.clone()), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], true);
    }

    fn bearer(user: uuid::Uuid) -> String {
        let claims = Claims::new(user, "owner@firm.test".into(), String::new(), UserRole::Owner);
        format!("Bearer {}", generate_jwt(claims).unwrap())
    }

    #[tokio::test]
    async fn postpone_without_new_start_is_a_validation_error() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let event = fx.event(&case, fx.owner, chrono::Duration::days(3)).await;

        let request = Request::post(format!("/api/calendar/events/{}/postpone", event.id))
            .header("authorization", bearer(fx.owner))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"reason":"x"}"#))
            .unwrap();
        let (status, body) = call(app(fx.state.clone()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn broken_json_and_bad_ids_use_the_error_envelope() {
        let fx = Fixture::new();

        let request = Request::post("/api/cases")
            .header("authorization", bearer(fx.owner))
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(app(fx.state.clone()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_JSON");

        let request = Request::get("/api/cases/not-a-uuid")
            .header("authorization", bearer(fx.owner))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(fx.state.clone()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}
