//! Persistence seam. Services only see these traits; `PgStore` and
//! `MemoryStore` implement all of them.
//!
//! Every method that checks a row's state and then mutates it does both
//! under one transaction (or one write lock) and reports a lost race as
//! [`DatabaseError::StaleState`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{
    AccessGrant, CalendarEvent, Case, CaseFilter, CaseInvitation, DueNotification,
    EventNotification, EventQuery, EventStatus, GrantLevel, PostponeRequest, SeparateDispute,
    SystemInvitation, SystemInvitationStatus,
};

#[async_trait]
pub trait CaseRepository: Send + Sync {
    /// Fails with `Duplicate` on an existing (court_id, case_number)
    async fn insert_case(&self, case: &Case) -> Result<(), DatabaseError>;
    async fn get_case(&self, id: Uuid) -> Result<Option<Case>, DatabaseError>;
    async fn update_case(&self, case: &Case) -> Result<(), DatabaseError>;
    /// Cascades to disputes, events, grants and invitations
    async fn delete_case(&self, id: Uuid) -> Result<bool, DatabaseError>;
    /// Cases among `ids` matching the filter, newest first
    async fn list_cases(&self, ids: &[Uuid], filter: &CaseFilter) -> Result<Vec<Case>, DatabaseError>;
    async fn owned_case_ids(&self, owner_id: Uuid) -> Result<Vec<Uuid>, DatabaseError>;
}

#[async_trait]
pub trait AccessRepository: Send + Sync {
    async fn find_grant(&self, case_id: Uuid, user_id: Uuid) -> Result<Option<AccessGrant>, DatabaseError>;
    async fn list_grants(&self, case_id: Uuid) -> Result<Vec<AccessGrant>, DatabaseError>;
    /// Fails with `Duplicate` when (case, user) already holds a grant
    async fn insert_grant(&self, grant: &AccessGrant) -> Result<(), DatabaseError>;
    /// Deletes the grant only if it belongs to `case_id`
    async fn delete_grant(&self, case_id: Uuid, grant_id: Uuid) -> Result<bool, DatabaseError>;
    /// Cases where the user holds a grant, optionally restricted to some levels
    async fn granted_case_ids(
        &self,
        user_id: Uuid,
        levels: Option<&[GrantLevel]>,
    ) -> Result<Vec<Uuid>, DatabaseError>;
}

#[async_trait]
pub trait DisputeRepository: Send + Sync {
    async fn insert_dispute(&self, dispute: &SeparateDispute) -> Result<(), DatabaseError>;
    async fn get_dispute(&self, id: Uuid) -> Result<Option<SeparateDispute>, DatabaseError>;
    async fn list_disputes(&self, case_id: Uuid) -> Result<Vec<SeparateDispute>, DatabaseError>;
    async fn update_dispute(&self, dispute: &SeparateDispute) -> Result<(), DatabaseError>;
    async fn delete_dispute(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<(), DatabaseError>;
    async fn get_event(&self, id: Uuid) -> Result<Option<CalendarEvent>, DatabaseError>;
    /// Events matching the query, ordered by start
    async fn list_events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, DatabaseError>;
    /// Rows whose `original_event_id` is `root_id` (the root itself excluded)
    async fn chain_members(&self, root_id: Uuid) -> Result<Vec<CalendarEvent>, DatabaseError>;

    /// Overwrite descriptive fields of a row that is still scheduled
    async fn update_scheduled_event(&self, event: &CalendarEvent) -> Result<(), DatabaseError>;

    /// Freeze the row as postponed and insert its successor, atomically.
    /// Returns `(postponed, successor)`.
    async fn postpone_event(
        &self,
        id: Uuid,
        request: &PostponeRequest,
    ) -> Result<(CalendarEvent, CalendarEvent), DatabaseError>;

    /// Move a scheduled row to a terminal status
    async fn close_event(
        &self,
        id: Uuid,
        status: EventStatus,
        at: DateTime<Utc>,
    ) -> Result<CalendarEvent, DatabaseError>;

    /// Delete the row and re-link the rest of its chain
    async fn delete_event(&self, id: Uuid, max_chain_depth: usize) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Fails with `Duplicate` on an existing (event, user, type, time)
    async fn insert_notification(&self, notification: &EventNotification) -> Result<(), DatabaseError>;
    async fn list_notifications(&self, event_id: Uuid, user_id: Uuid) -> Result<Vec<EventNotification>, DatabaseError>;
    /// Unsent rows of scheduled events whose send time is at or before `now`
    async fn due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<DueNotification>, DatabaseError>;
    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<EventNotification, DatabaseError>;
}

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    /// Insert, or reset the existing (case, email) row to pending with the
    /// new level, message and expiry. Returns the stored row.
    async fn upsert_case_invitation(&self, invitation: &CaseInvitation) -> Result<CaseInvitation, DatabaseError>;
    async fn list_case_invitations(&self, case_id: Uuid) -> Result<Vec<CaseInvitation>, DatabaseError>;
    async fn case_invitation_by_token(&self, token: Uuid) -> Result<Option<CaseInvitation>, DatabaseError>;

    /// Mark a valid invitation accepted and get-or-create the grant it
    /// carries, atomically. An existing grant for the invitee is kept.
    async fn accept_case_invitation(
        &self,
        token: Uuid,
        invitee_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(CaseInvitation, AccessGrant), DatabaseError>;

    async fn decline_case_invitation(
        &self,
        token: Uuid,
        invitee_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CaseInvitation, DatabaseError>;

    async fn insert_system_invitation(&self, invitation: &SystemInvitation) -> Result<(), DatabaseError>;
    async fn system_invitation_by_token(&self, token: Uuid) -> Result<Option<SystemInvitation>, DatabaseError>;

    /// Move a pending, unexpired system invitation to `Used` or `Revoked`
    async fn close_system_invitation(
        &self,
        token: Uuid,
        status: SystemInvitationStatus,
        used_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<SystemInvitation, DatabaseError>;
}

/// Everything the services need from persistence
#[async_trait]
pub trait Store:
    CaseRepository
    + AccessRepository
    + DisputeRepository
    + EventRepository
    + NotificationRepository
    + InvitationRepository
{
    /// Short backend name for logs and the health endpoint
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), DatabaseError>;
}
