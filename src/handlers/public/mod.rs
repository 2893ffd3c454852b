// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Service info, health, and the invitation lookup the registration page
// performs before the invitee has an account.

pub mod invitation;
pub mod root;

pub use invitation::system_invitation as system_invitation_get;
pub use root::{health, root};
