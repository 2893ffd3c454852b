use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use super::text_column;

crate::text_enum! {
    /// Level stored on a grant row. Ownership is never stored as a grant.
    pub enum GrantLevel {
        Full => "full",
        Calendar => "calendar",
        View => "view",
    }
}

crate::text_enum! {
    /// Effective access a user holds on a case
    pub enum Level {
        Owner => "owner",
        Full => "full",
        Calendar => "calendar",
        View => "view",
    }
}

impl Level {
    /// Edit or delete the case, manage its disputes
    pub const MANAGE: &'static [Level] = &[Level::Owner, Level::Full];
    /// Create, reschedule and close calendar events
    pub const SCHEDULE: &'static [Level] = &[Level::Owner, Level::Full, Level::Calendar];
    /// Read anything on the case
    pub const ANY: &'static [Level] = &[Level::Owner, Level::Full, Level::Calendar, Level::View];
    /// Grant, revoke and invite
    pub const OWNER: &'static [Level] = &[Level::Owner];
}

impl From<GrantLevel> for Level {
    fn from(level: GrantLevel) -> Self {
        match level {
            GrantLevel::Full => Level::Full,
            GrantLevel::Calendar => Level::Calendar,
            GrantLevel::View => Level::View,
        }
    }
}

/// A row of `case_access`: at most one per (case, user)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub id: Uuid,
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub access_level: GrantLevel,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewGrant {
    pub case_id: Uuid,
    pub user_id: Uuid,
    pub access_level: GrantLevel,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
}

impl NewGrant {
    pub fn into_grant(self) -> AccessGrant {
        AccessGrant {
            id: Uuid::new_v4(),
            case_id: self.case_id,
            user_id: self.user_id,
            access_level: self.access_level,
            granted_by: self.granted_by,
            granted_at: self.granted_at,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for AccessGrant {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            case_id: row.try_get("case_id")?,
            user_id: row.try_get("user_id")?,
            access_level: text_column(row, "access_level")?,
            granted_by: row.try_get("granted_by")?,
            granted_at: row.try_get("granted_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_levels_never_map_to_owner() {
        for level in GrantLevel::ALL {
            assert_ne!(Level::from(*level), Level::Owner);
        }
    }

    #[test]
    fn level_sets_nest() {
        for level in Level::MANAGE {
            assert!(Level::SCHEDULE.contains(level));
        }
        for level in Level::SCHEDULE {
            assert!(Level::ANY.contains(level));
        }
        assert!(!Level::SCHEDULE.contains(&Level::View));
    }
}
