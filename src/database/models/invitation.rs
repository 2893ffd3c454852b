use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use super::access::GrantLevel;
use super::text_column;

crate::text_enum! {
    pub enum CaseInvitationStatus {
        Pending => "pending",
        Accepted => "accepted",
        Declined => "declined",
        Expired => "expired",
    }
}

crate::text_enum! {
    pub enum SystemInvitationStatus {
        Pending => "pending",
        Used => "used",
        Expired => "expired",
        Revoked => "revoked",
    }
}

/// Invitation of a colleague to one case, keyed by (case, invitee email).
///
/// Expiry is lazy: the stored status stays `pending` after `expires_at`,
/// readers go through [`CaseInvitation::effective_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseInvitation {
    pub id: Uuid,
    pub case_id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_email: String,
    pub invitee_id: Option<Uuid>,
    pub access_level: GrantLevel,
    pub status: CaseInvitationStatus,
    pub token: Uuid,
    pub message: String,
    pub invited_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCaseInvitation {
    pub invitee_email: String,
    pub access_level: GrantLevel,
    #[serde(default)]
    pub message: String,
}

impl NewCaseInvitation {
    pub fn into_invitation(
        self,
        case_id: Uuid,
        inviter_id: Uuid,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> CaseInvitation {
        CaseInvitation {
            id: Uuid::new_v4(),
            case_id,
            inviter_id,
            invitee_email: normalize_email(&self.invitee_email),
            invitee_id: None,
            access_level: self.access_level,
            status: CaseInvitationStatus::Pending,
            token: Uuid::new_v4(),
            message: self.message,
            invited_at: now,
            responded_at: None,
            expires_at: now + ttl,
        }
    }
}

impl CaseInvitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == CaseInvitationStatus::Pending && !self.is_expired(now)
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> CaseInvitationStatus {
        if self.status == CaseInvitationStatus::Pending && self.is_expired(now) {
            CaseInvitationStatus::Expired
        } else {
            self.status
        }
    }

    pub fn is_addressed_to(&self, email: &str) -> bool {
        self.invitee_email.eq_ignore_ascii_case(email.trim())
    }

    /// Reuse the (case, email) row for a fresh invitation
    pub fn reissue(&mut self, fresh: &CaseInvitation) {
        self.inviter_id = fresh.inviter_id;
        self.access_level = fresh.access_level;
        self.message = fresh.message.clone();
        self.status = CaseInvitationStatus::Pending;
        self.invitee_id = None;
        self.responded_at = None;
        self.invited_at = fresh.invited_at;
        self.expires_at = fresh.expires_at;
    }

    pub fn respond(&mut self, status: CaseInvitationStatus, invitee: Uuid, now: DateTime<Utc>) {
        self.status = status;
        self.invitee_id = Some(invitee);
        self.responded_at = Some(now);
    }
}

/// Invitation to register in the system, issued by a system owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInvitation {
    pub id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_email: String,
    pub token: Uuid,
    pub status: SystemInvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_by: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSystemInvitation {
    pub invitee_email: String,
}

impl NewSystemInvitation {
    pub fn into_invitation(self, inviter_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> SystemInvitation {
        SystemInvitation {
            id: Uuid::new_v4(),
            inviter_id,
            invitee_email: normalize_email(&self.invitee_email),
            token: Uuid::new_v4(),
            status: SystemInvitationStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            used_at: None,
            used_by: None,
        }
    }
}

impl SystemInvitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == SystemInvitationStatus::Pending && !self.is_expired(now)
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> SystemInvitationStatus {
        if self.status == SystemInvitationStatus::Pending && self.is_expired(now) {
            SystemInvitationStatus::Expired
        } else {
            self.status
        }
    }

    pub fn mark_used(&mut self, user_id: Uuid, now: DateTime<Utc>) {
        self.status = SystemInvitationStatus::Used;
        self.used_at = Some(now);
        self.used_by = Some(user_id);
    }

    pub fn revoke(&mut self) {
        self.status = SystemInvitationStatus::Revoked;
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl<'r> FromRow<'r, PgRow> for CaseInvitation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            case_id: row.try_get("case_id")?,
            inviter_id: row.try_get("inviter_id")?,
            invitee_email: row.try_get("invitee_email")?,
            invitee_id: row.try_get("invitee_id")?,
            access_level: text_column(row, "access_level")?,
            status: text_column(row, "status")?,
            token: row.try_get("token")?,
            message: row.try_get("message")?,
            invited_at: row.try_get("invited_at")?,
            responded_at: row.try_get("responded_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for SystemInvitation {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            inviter_id: row.try_get("inviter_id")?,
            invitee_email: row.try_get("invitee_email")?,
            token: row.try_get("token")?,
            status: text_column(row, "status")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            used_at: row.try_get("used_at")?,
            used_by: row.try_get("used_by")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation(now: DateTime<Utc>) -> CaseInvitation {
        NewCaseInvitation {
            invitee_email: "  Colleague@Example.com ".into(),
            access_level: GrantLevel::Calendar,
            message: String::new(),
        }
        .into_invitation(Uuid::new_v4(), Uuid::new_v4(), now, Duration::days(14))
    }

    #[test]
    fn expiry_is_computed_from_the_clock() {
        let now = Utc::now();
        let inv = invitation(now);
        assert!(inv.is_valid(now));
        assert_eq!(inv.effective_status(now), CaseInvitationStatus::Pending);

        let later = now + Duration::days(15);
        assert_eq!(inv.status, CaseInvitationStatus::Pending);
        assert!(!inv.is_valid(later));
        assert_eq!(inv.effective_status(later), CaseInvitationStatus::Expired);
    }

    #[test]
    fn responded_invitation_keeps_its_status_after_expiry() {
        let now = Utc::now();
        let mut inv = invitation(now);
        inv.respond(CaseInvitationStatus::Accepted, Uuid::new_v4(), now);
        assert_eq!(inv.effective_status(now + Duration::days(30)), CaseInvitationStatus::Accepted);
    }

    #[test]
    fn email_matching_ignores_case() {
        let inv = invitation(Utc::now());
        assert_eq!(inv.invitee_email, "colleague@example.com");
        assert!(inv.is_addressed_to("COLLEAGUE@example.com"));
        assert!(!inv.is_addressed_to("other@example.com"));
    }

    #[test]
    fn reissue_resets_to_pending() {
        let now = Utc::now();
        let mut inv = invitation(now);
        inv.respond(CaseInvitationStatus::Declined, Uuid::new_v4(), now);
        let mut fresh = invitation(now + Duration::days(1));
        fresh.access_level = GrantLevel::Full;
        inv.reissue(&fresh);
        assert_eq!(inv.status, CaseInvitationStatus::Pending);
        assert_eq!(inv.access_level, GrantLevel::Full);
        assert_eq!(inv.responded_at, None);
        assert_eq!(inv.expires_at, fresh.expires_at);
    }

    #[test]
    fn system_invitation_lifecycle() {
        let now = Utc::now();
        let mut inv = NewSystemInvitation { invitee_email: "new@example.com".into() }
            .into_invitation(Uuid::new_v4(), now, Duration::days(7));
        assert!(inv.is_valid(now));
        assert_eq!(inv.effective_status(now + Duration::days(8)), SystemInvitationStatus::Expired);

        let user = Uuid::new_v4();
        inv.mark_used(user, now);
        assert_eq!(inv.used_by, Some(user));
        assert!(!inv.is_valid(now));
    }
}
