pub mod access;
pub mod case;
pub mod chain;
pub mod dispute;
pub mod event;
pub mod invitation;
pub mod notification;

pub use access::{AccessGrant, GrantLevel, Level, NewGrant};
pub use case::{Case, CaseFilter, CasePatch, CaseStatus, CaseType, ClientRole, CourtInstance, NewCase};
pub use chain::{ChainError, ChainRelink, ChainView, RootWalk};
pub use dispute::{DisputePatch, DisputeStatus, NewDispute, SeparateDispute};
pub use event::{
    CalendarEvent, EventPatch, EventQuery, EventStatus, EventType, NewEvent, PostponeRequest,
};
pub use invitation::{
    normalize_email, CaseInvitation, CaseInvitationStatus, NewCaseInvitation, NewSystemInvitation,
    SystemInvitation, SystemInvitationStatus,
};
pub use notification::{
    DueNotification, EventNotification, NewNotification, NotificationTime, NotificationType,
};

use sqlx::{postgres::PgRow, Row};
use std::str::FromStr;

use crate::types::ParseEnumError;

/// Decode a TEXT column into one of the `text_enum!` types
pub(crate) fn text_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: ParseEnumError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
