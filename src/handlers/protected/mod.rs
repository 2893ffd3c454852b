// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every handler here receives the `AuthUser` inserted by
// `jwt_auth_middleware` and the shared `AppState`. Authorization is decided
// by the services, never in the handler.

pub mod calendar;
pub mod cases;
pub mod invitations;
