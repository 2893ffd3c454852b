// handlers/protected/cases - /api/cases and everything hanging off a case

pub mod access;
pub mod case;
pub mod dispute;
pub mod invitation;

pub use case::list as case_list;
pub use case::create as case_create;
pub use case::stats as case_stats;
pub use case::show as case_show;
pub use case::update as case_update;
pub use case::delete as case_delete;

pub use access::list as access_list;
pub use access::grant as access_grant;
pub use access::revoke as access_revoke;

pub use dispute::list as dispute_list;
pub use dispute::create as dispute_create;
pub use dispute::show as dispute_show;
pub use dispute::update as dispute_update;
pub use dispute::delete as dispute_delete;

pub use invitation::list as invitation_list;
pub use invitation::invite as invitation_create;
