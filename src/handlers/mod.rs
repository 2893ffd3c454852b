// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (JWT auth, everything under /api)
pub mod public;
pub mod protected;
