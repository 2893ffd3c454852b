// handlers/protected/calendar - /api/calendar events, lifecycle and views

pub mod event;
pub mod lifecycle;
pub mod notification;
pub mod view;

pub use event::list as event_list;
pub use event::create as event_create;
pub use event::show as event_show;
pub use event::update as event_update;
pub use event::delete as event_delete;

pub use lifecycle::postpone as event_postpone;
pub use lifecycle::complete as event_complete;
pub use lifecycle::cancel as event_cancel;
pub use lifecycle::history as event_history;

pub use notification::list as notification_list;
pub use notification::create as notification_create;

pub use view::month as calendar_view;
pub use view::stats as calendar_stats;
