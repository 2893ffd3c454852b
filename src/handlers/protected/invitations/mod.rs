// handlers/protected/invitations - responding to case invitations and
// managing system invitations

pub mod respond;
pub mod system;

pub use respond::accept as case_invitation_accept;
pub use respond::decline as case_invitation_decline;
pub use system::create as system_invitation_create;
pub use system::revoke as system_invitation_revoke;
