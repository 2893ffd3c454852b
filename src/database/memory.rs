//! In-process store used by tests and by development servers started
//! without DATABASE_URL. One write lock covers each read-modify-write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{
    AccessGrant, CalendarEvent, Case, CaseFilter, CaseInvitation, CaseInvitationStatus,
    ChainError, ChainView, DueNotification, EventNotification, EventQuery, EventStatus,
    GrantLevel, NewGrant, PostponeRequest, SeparateDispute, SystemInvitation,
    SystemInvitationStatus,
};
use crate::database::repository::{
    AccessRepository, CaseRepository, DisputeRepository, EventRepository, InvitationRepository,
    NotificationRepository, Store,
};

#[derive(Default)]
struct Tables {
    cases: HashMap<Uuid, Case>,
    grants: HashMap<Uuid, AccessGrant>,
    disputes: HashMap<Uuid, SeparateDispute>,
    events: HashMap<Uuid, CalendarEvent>,
    notifications: HashMap<Uuid, EventNotification>,
    case_invitations: HashMap<Uuid, CaseInvitation>,
    system_invitations: HashMap<Uuid, SystemInvitation>,
}

impl Tables {
    fn remove_events_where(&mut self, doomed: impl Fn(&CalendarEvent) -> bool) {
        let ids: Vec<Uuid> = self.events.values().filter(|e| doomed(e)).map(|e| e.id).collect();
        for id in &ids {
            self.events.remove(id);
        }
        self.notifications.retain(|_, n| !ids.contains(&n.event_id));
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CaseRepository for MemoryStore {
    async fn insert_case(&self, case: &Case) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        if t.cases
            .values()
            .any(|c| c.court_id == case.court_id && c.case_number == case.case_number)
        {
            return Err(DatabaseError::Duplicate("case with this court and number".into()));
        }
        t.cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>, DatabaseError> {
        Ok(self.tables.read().await.cases.get(&id).cloned())
    }

    async fn update_case(&self, case: &Case) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        if t.cases.values().any(|c| {
            c.id != case.id && c.court_id == case.court_id && c.case_number == case.case_number
        }) {
            return Err(DatabaseError::Duplicate("case with this court and number".into()));
        }
        match t.cases.get_mut(&case.id) {
            Some(slot) => {
                *slot = case.clone();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!("case {}", case.id))),
        }
    }

    async fn delete_case(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut t = self.tables.write().await;
        if t.cases.remove(&id).is_none() {
            return Ok(false);
        }
        t.grants.retain(|_, g| g.case_id != id);
        t.disputes.retain(|_, d| d.case_id != id);
        t.case_invitations.retain(|_, i| i.case_id != id);
        t.remove_events_where(|e| e.case_id == id);
        Ok(true)
    }

    async fn list_cases(&self, ids: &[Uuid], filter: &CaseFilter) -> Result<Vec<Case>, DatabaseError> {
        let t = self.tables.read().await;
        let mut cases: Vec<Case> = t
            .cases
            .values()
            .filter(|c| ids.contains(&c.id))
            .filter(|c| filter.case_type.map_or(true, |ty| c.case_type == ty))
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .filter(|c| filter.matches_search(c))
            .cloned()
            .collect();
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(cases)
    }

    async fn owned_case_ids(&self, owner_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
        let t = self.tables.read().await;
        Ok(t.cases.values().filter(|c| c.owner_id == owner_id).map(|c| c.id).collect())
    }
}

#[async_trait]
impl AccessRepository for MemoryStore {
    async fn find_grant(&self, case_id: Uuid, user_id: Uuid) -> Result<Option<AccessGrant>, DatabaseError> {
        let t = self.tables.read().await;
        Ok(t.grants
            .values()
            .find(|g| g.case_id == case_id && g.user_id == user_id)
            .cloned())
    }

    async fn list_grants(&self, case_id: Uuid) -> Result<Vec<AccessGrant>, DatabaseError> {
        let t = self.tables.read().await;
        let mut grants: Vec<AccessGrant> =
            t.grants.values().filter(|g| g.case_id == case_id).cloned().collect();
        grants.sort_by_key(|g| g.granted_at);
        Ok(grants)
    }

    async fn insert_grant(&self, grant: &AccessGrant) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        if t.grants
            .values()
            .any(|g| g.case_id == grant.case_id && g.user_id == grant.user_id)
        {
            return Err(DatabaseError::Duplicate("access grant for this user".into()));
        }
        t.grants.insert(grant.id, grant.clone());
        Ok(())
    }

    async fn delete_grant(&self, case_id: Uuid, grant_id: Uuid) -> Result<bool, DatabaseError> {
        let mut t = self.tables.write().await;
        match t.grants.get(&grant_id) {
            Some(g) if g.case_id == case_id => {
                t.grants.remove(&grant_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn granted_case_ids(
        &self,
        user_id: Uuid,
        levels: Option<&[GrantLevel]>,
    ) -> Result<Vec<Uuid>, DatabaseError> {
        let t = self.tables.read().await;
        Ok(t.grants
            .values()
            .filter(|g| g.user_id == user_id)
            .filter(|g| levels.map_or(true, |ls| ls.contains(&g.access_level)))
            .map(|g| g.case_id)
            .collect())
    }
}

#[async_trait]
impl DisputeRepository for MemoryStore {
    async fn insert_dispute(&self, dispute: &SeparateDispute) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        if !t.cases.contains_key(&dispute.case_id) {
            return Err(DatabaseError::NotFound(format!("case {}", dispute.case_id)));
        }
        t.disputes.insert(dispute.id, dispute.clone());
        Ok(())
    }

    async fn get_dispute(&self, id: Uuid) -> Result<Option<SeparateDispute>, DatabaseError> {
        Ok(self.tables.read().await.disputes.get(&id).cloned())
    }

    async fn list_disputes(&self, case_id: Uuid) -> Result<Vec<SeparateDispute>, DatabaseError> {
        let t = self.tables.read().await;
        let mut disputes: Vec<SeparateDispute> =
            t.disputes.values().filter(|d| d.case_id == case_id).cloned().collect();
        disputes.sort_by_key(|d| d.created_at);
        Ok(disputes)
    }

    async fn update_dispute(&self, dispute: &SeparateDispute) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        match t.disputes.get_mut(&dispute.id) {
            Some(slot) => {
                *slot = dispute.clone();
                Ok(())
            }
            None => Err(DatabaseError::NotFound(format!("dispute {}", dispute.id))),
        }
    }

    async fn delete_dispute(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut t = self.tables.write().await;
        if t.disputes.remove(&id).is_none() {
            return Ok(false);
        }
        t.remove_events_where(|e| e.dispute_id == Some(id));
        Ok(true)
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        if !t.cases.contains_key(&event.case_id) {
            return Err(DatabaseError::NotFound(format!("case {}", event.case_id)));
        }
        t.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<CalendarEvent>, DatabaseError> {
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn list_events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, DatabaseError> {
        let t = self.tables.read().await;
        let mut events: Vec<CalendarEvent> =
            t.events.values().filter(|e| query.matches(e)).cloned().collect();
        events.sort_by(|a, b| a.start_datetime.cmp(&b.start_datetime).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn chain_members(&self, root_id: Uuid) -> Result<Vec<CalendarEvent>, DatabaseError> {
        let t = self.tables.read().await;
        Ok(t.events
            .values()
            .filter(|e| e.original_event_id == Some(root_id) && e.id != root_id)
            .cloned()
            .collect())
    }

    async fn update_scheduled_event(&self, event: &CalendarEvent) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        let slot = t
            .events
            .get_mut(&event.id)
            .ok_or_else(|| DatabaseError::NotFound(format!("event {}", event.id)))?;
        if slot.status != EventStatus::Scheduled {
            return Err(DatabaseError::StaleState(format!("event {} is {}", event.id, slot.status)));
        }
        *slot = event.clone();
        Ok(())
    }

    async fn postpone_event(
        &self,
        id: Uuid,
        request: &PostponeRequest,
    ) -> Result<(CalendarEvent, CalendarEvent), DatabaseError> {
        let mut t = self.tables.write().await;
        let event = t
            .events
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("event {}", id)))?;
        if event.status != EventStatus::Scheduled {
            return Err(DatabaseError::StaleState(format!("event {} is {}", id, event.status)));
        }
        event.mark_postponed(request);
        let postponed = event.clone();
        let successor = postponed.successor(request);
        t.events.insert(successor.id, successor.clone());
        Ok((postponed, successor))
    }

    async fn close_event(
        &self,
        id: Uuid,
        status: EventStatus,
        at: DateTime<Utc>,
    ) -> Result<CalendarEvent, DatabaseError> {
        let mut t = self.tables.write().await;
        let event = t
            .events
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("event {}", id)))?;
        if event.status != EventStatus::Scheduled {
            return Err(DatabaseError::StaleState(format!("event {} is {}", id, event.status)));
        }
        event.status = status;
        event.updated_at = at;
        Ok(event.clone())
    }

    async fn delete_event(&self, id: Uuid, max_chain_depth: usize) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        let event = t
            .events
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("event {}", id)))?;

        let root_id = event.chain_root_id();
        let root = t
            .events
            .get(&root_id)
            .cloned()
            .ok_or(ChainError::MissingLink(root_id))?;
        let members: Vec<CalendarEvent> = t
            .events
            .values()
            .filter(|e| e.original_event_id == Some(root_id) && e.id != root_id)
            .cloned()
            .collect();

        let relinks = ChainView::new(root, members).detach(id, max_chain_depth)?;
        for relink in relinks {
            if let Some(member) = t.events.get_mut(&relink.event_id) {
                member.original_event_id = relink.original_event_id;
                member.previous_event_id = relink.previous_event_id;
            }
        }
        t.remove_events_where(|e| e.id == id);
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notification(&self, notification: &EventNotification) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        if !t.events.contains_key(&notification.event_id) {
            return Err(DatabaseError::NotFound(format!("event {}", notification.event_id)));
        }
        if t.notifications.values().any(|n| n.same_slot(notification)) {
            return Err(DatabaseError::Duplicate("notification for this event, type and time".into()));
        }
        t.notifications.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, event_id: Uuid, user_id: Uuid) -> Result<Vec<EventNotification>, DatabaseError> {
        let t = self.tables.read().await;
        let mut rows: Vec<EventNotification> = t
            .notifications
            .values()
            .filter(|n| n.event_id == event_id && n.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|n| n.created_at);
        Ok(rows)
    }

    async fn due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<DueNotification>, DatabaseError> {
        let t = self.tables.read().await;
        let mut due: Vec<DueNotification> = t
            .notifications
            .values()
            .filter(|n| !n.is_sent)
            .filter_map(|n| {
                let event = t.events.get(&n.event_id)?;
                let ready = event.status == EventStatus::Scheduled
                    && n.notification_time.send_at(event.start_datetime) <= now;
                ready.then(|| DueNotification { notification: n.clone(), event: event.clone() })
            })
            .collect();
        due.sort_by_key(|d| d.notification.notification_time.send_at(d.event.start_datetime));
        Ok(due)
    }

    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<EventNotification, DatabaseError> {
        let mut t = self.tables.write().await;
        let row = t
            .notifications
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("notification {}", id)))?;
        row.is_sent = true;
        row.sent_at = Some(at);
        Ok(row.clone())
    }
}

#[async_trait]
impl InvitationRepository for MemoryStore {
    async fn upsert_case_invitation(&self, invitation: &CaseInvitation) -> Result<CaseInvitation, DatabaseError> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.case_invitations.values_mut().find(|i| {
            i.case_id == invitation.case_id && i.invitee_email == invitation.invitee_email
        }) {
            existing.reissue(invitation);
            return Ok(existing.clone());
        }
        t.case_invitations.insert(invitation.id, invitation.clone());
        Ok(invitation.clone())
    }

    async fn list_case_invitations(&self, case_id: Uuid) -> Result<Vec<CaseInvitation>, DatabaseError> {
        let t = self.tables.read().await;
        let mut rows: Vec<CaseInvitation> =
            t.case_invitations.values().filter(|i| i.case_id == case_id).cloned().collect();
        rows.sort_by(|a, b| b.invited_at.cmp(&a.invited_at));
        Ok(rows)
    }

    async fn case_invitation_by_token(&self, token: Uuid) -> Result<Option<CaseInvitation>, DatabaseError> {
        let t = self.tables.read().await;
        Ok(t.case_invitations.values().find(|i| i.token == token).cloned())
    }

    async fn accept_case_invitation(
        &self,
        token: Uuid,
        invitee_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(CaseInvitation, AccessGrant), DatabaseError> {
        let mut guard = self.tables.write().await;
        let t = &mut *guard;
        let invitation = t
            .case_invitations
            .values_mut()
            .find(|i| i.token == token)
            .ok_or_else(|| DatabaseError::NotFound("case invitation".into()))?;
        if !invitation.is_valid(now) {
            return Err(DatabaseError::StaleState(format!(
                "invitation is {}",
                invitation.effective_status(now)
            )));
        }
        invitation.respond(CaseInvitationStatus::Accepted, invitee_id, now);
        let invitation = invitation.clone();

        let existing = t
            .grants
            .values()
            .find(|g| g.case_id == invitation.case_id && g.user_id == invitee_id)
            .cloned();
        let grant = match existing {
            Some(grant) => grant,
            None => {
                let grant = NewGrant {
                    case_id: invitation.case_id,
                    user_id: invitee_id,
                    access_level: invitation.access_level,
                    granted_by: invitation.inviter_id,
                    granted_at: now,
                }
                .into_grant();
                t.grants.insert(grant.id, grant.clone());
                grant
            }
        };
        Ok((invitation, grant))
    }

    async fn decline_case_invitation(
        &self,
        token: Uuid,
        invitee_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CaseInvitation, DatabaseError> {
        let mut t = self.tables.write().await;
        let invitation = t
            .case_invitations
            .values_mut()
            .find(|i| i.token == token)
            .ok_or_else(|| DatabaseError::NotFound("case invitation".into()))?;
        if !invitation.is_valid(now) {
            return Err(DatabaseError::StaleState(format!(
                "invitation is {}",
                invitation.effective_status(now)
            )));
        }
        invitation.respond(CaseInvitationStatus::Declined, invitee_id, now);
        Ok(invitation.clone())
    }

    async fn insert_system_invitation(&self, invitation: &SystemInvitation) -> Result<(), DatabaseError> {
        let mut t = self.tables.write().await;
        t.system_invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn system_invitation_by_token(&self, token: Uuid) -> Result<Option<SystemInvitation>, DatabaseError> {
        let t = self.tables.read().await;
        Ok(t.system_invitations.values().find(|i| i.token == token).cloned())
    }

    async fn close_system_invitation(
        &self,
        token: Uuid,
        status: SystemInvitationStatus,
        used_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<SystemInvitation, DatabaseError> {
        let mut t = self.tables.write().await;
        let invitation = t
            .system_invitations
            .values_mut()
            .find(|i| i.token == token)
            .ok_or_else(|| DatabaseError::NotFound("system invitation".into()))?;
        if !invitation.is_valid(now) {
            return Err(DatabaseError::StaleState(format!(
                "invitation is {}",
                invitation.effective_status(now)
            )));
        }
        match (status, used_by) {
            (SystemInvitationStatus::Used, Some(user)) => invitation.mark_used(user, now),
            (SystemInvitationStatus::Revoked, _) => invitation.revoke(),
            (other, _) => {
                return Err(DatabaseError::StaleState(format!(
                    "system invitation cannot move to {}",
                    other
                )))
            }
        }
        Ok(invitation.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
