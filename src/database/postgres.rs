//! PostgreSQL store. Check-then-mutate operations run inside one
//! transaction, with `WHERE status = ...` guards or `FOR UPDATE` row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{
    AccessGrant, CalendarEvent, Case, CaseFilter, CaseInvitation, ChainError, ChainView,
    DueNotification, EventNotification, EventQuery, EventStatus, GrantLevel, NewGrant,
    PostponeRequest, SeparateDispute, SystemInvitation, SystemInvitationStatus,
};
use crate::database::repository::{
    AccessRepository, CaseRepository, DisputeRepository, EventRepository, InvitationRepository,
    NotificationRepository, Store,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store on the main pool from DATABASE_URL
    pub async fn connect() -> Result<Self, DatabaseError> {
        Ok(Self::new(DatabaseManager::main_pool().await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const INSERT_EVENT: &str = "INSERT INTO calendar_events (
        id, case_id, dispute_id, event_type, title, description, start_datetime, end_datetime,
        courtroom, court_address, participants, agenda, status, postponement_reason,
        postponed_by, postponed_at, original_event_id, previous_event_id,
        email_notifications, telegram_notifications, created_by, created_at, updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)";

async fn insert_event_row(conn: &mut PgConnection, e: &CalendarEvent) -> Result<(), DatabaseError> {
    sqlx::query(INSERT_EVENT)
        .bind(e.id)
        .bind(e.case_id)
        .bind(e.dispute_id)
        .bind(e.event_type.as_str())
        .bind(&e.title)
        .bind(&e.description)
        .bind(e.start_datetime)
        .bind(e.end_datetime)
        .bind(&e.courtroom)
        .bind(&e.court_address)
        .bind(&e.participants)
        .bind(&e.agenda)
        .bind(e.status.as_str())
        .bind(&e.postponement_reason)
        .bind(e.postponed_by)
        .bind(e.postponed_at)
        .bind(e.original_event_id)
        .bind(e.previous_event_id)
        .bind(e.email_notifications)
        .bind(e.telegram_notifications)
        .bind(e.created_by)
        .bind(e.created_at)
        .bind(e.updated_at)
        .execute(conn)
        .await
        .map_err(|err| DatabaseError::from_write(err, "calendar event"))?;
    Ok(())
}

/// Tell a vanished row apart from one a concurrent writer already moved on
async fn explain_event_miss(conn: &mut PgConnection, id: Uuid) -> DatabaseError {
    match sqlx::query_scalar::<_, String>("SELECT status FROM calendar_events WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
    {
        Ok(Some(status)) => DatabaseError::StaleState(format!("event {} is {}", id, status)),
        Ok(None) => DatabaseError::NotFound(format!("event {}", id)),
        Err(e) => e.into(),
    }
}

/// Escape LIKE wildcards so search text matches literally
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl CaseRepository for PgStore {
    async fn insert_case(&self, c: &Case) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO cases (
                id, court_id, case_number, case_type, court_instance, subject_matter, claim_amount,
                status, received_date, judge_name, plaintiff, defendant, third_party, client_role,
                subcategory, description, notes, owner_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
        )
        .bind(c.id)
        .bind(c.court_id)
        .bind(&c.case_number)
        .bind(c.case_type.as_str())
        .bind(c.court_instance.as_str())
        .bind(&c.subject_matter)
        .bind(c.claim_amount)
        .bind(c.status.as_str())
        .bind(c.received_date)
        .bind(&c.judge_name)
        .bind(&c.plaintiff)
        .bind(&c.defendant)
        .bind(&c.third_party)
        .bind(c.client_role.as_str())
        .bind(&c.subcategory)
        .bind(&c.description)
        .bind(&c.notes)
        .bind(c.owner_id)
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "case with this court and number"))?;
        Ok(())
    }

    async fn get_case(&self, id: Uuid) -> Result<Option<Case>, DatabaseError> {
        Ok(sqlx::query_as::<_, Case>("SELECT * FROM cases WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_case(&self, c: &Case) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE cases SET
                court_id = $2, case_number = $3, case_type = $4, court_instance = $5,
                subject_matter = $6, claim_amount = $7, status = $8, received_date = $9,
                judge_name = $10, plaintiff = $11, defendant = $12, third_party = $13,
                client_role = $14, subcategory = $15, description = $16, notes = $17,
                updated_at = $18
            WHERE id = $1",
        )
        .bind(c.id)
        .bind(c.court_id)
        .bind(&c.case_number)
        .bind(c.case_type.as_str())
        .bind(c.court_instance.as_str())
        .bind(&c.subject_matter)
        .bind(c.claim_amount)
        .bind(c.status.as_str())
        .bind(c.received_date)
        .bind(&c.judge_name)
        .bind(&c.plaintiff)
        .bind(&c.defendant)
        .bind(&c.third_party)
        .bind(c.client_role.as_str())
        .bind(&c.subcategory)
        .bind(&c.description)
        .bind(&c.notes)
        .bind(c.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "case with this court and number"))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("case {}", c.id)));
        }
        Ok(())
    }

    async fn delete_case(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM cases WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_cases(&self, ids: &[Uuid], filter: &CaseFilter) -> Result<Vec<Case>, DatabaseError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM cases WHERE id = ANY(");
        qb.push_bind(ids.to_vec()).push(")");
        if let Some(case_type) = filter.case_type {
            qb.push(" AND case_type = ").push_bind(case_type.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = like_pattern(search);
            qb.push(" AND (case_number ILIKE ").push_bind(pattern.clone());
            qb.push(" OR subject_matter ILIKE ").push_bind(pattern.clone());
            qb.push(" OR plaintiff ILIKE ").push_bind(pattern.clone());
            qb.push(" OR defendant ILIKE ").push_bind(pattern);
            qb.push(")");
        }
        qb.push(" ORDER BY created_at DESC, id");
        Ok(qb.build_query_as::<Case>().fetch_all(&self.pool).await?)
    }

    async fn owned_case_ids(&self, owner_id: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
        Ok(sqlx::query_scalar::<_, Uuid>("SELECT id FROM cases WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl AccessRepository for PgStore {
    async fn find_grant(&self, case_id: Uuid, user_id: Uuid) -> Result<Option<AccessGrant>, DatabaseError> {
        Ok(sqlx::query_as::<_, AccessGrant>(
            "SELECT * FROM case_access WHERE case_id = $1 AND user_id = $2",
        )
        .bind(case_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_grants(&self, case_id: Uuid) -> Result<Vec<AccessGrant>, DatabaseError> {
        Ok(sqlx::query_as::<_, AccessGrant>(
            "SELECT * FROM case_access WHERE case_id = $1 ORDER BY granted_at",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_grant(&self, g: &AccessGrant) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO case_access (id, case_id, user_id, access_level, granted_by, granted_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(g.id)
        .bind(g.case_id)
        .bind(g.user_id)
        .bind(g.access_level.as_str())
        .bind(g.granted_by)
        .bind(g.granted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "access grant for this user"))?;
        Ok(())
    }

    async fn delete_grant(&self, case_id: Uuid, grant_id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM case_access WHERE id = $1 AND case_id = $2")
            .bind(grant_id)
            .bind(case_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn granted_case_ids(
        &self,
        user_id: Uuid,
        levels: Option<&[GrantLevel]>,
    ) -> Result<Vec<Uuid>, DatabaseError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT case_id FROM case_access WHERE user_id = ");
        qb.push_bind(user_id);
        if let Some(levels) = levels {
            let names: Vec<String> = levels.iter().map(|l| l.as_str().to_string()).collect();
            qb.push(" AND access_level = ANY(").push_bind(names).push(")");
        }
        Ok(qb.build_query_scalar::<Uuid>().fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl DisputeRepository for PgStore {
    async fn insert_dispute(&self, d: &SeparateDispute) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO separate_disputes (
                id, case_id, name, determination_number, amount, plaintiff, defendant,
                status, description, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(d.id)
        .bind(d.case_id)
        .bind(&d.name)
        .bind(&d.determination_number)
        .bind(d.amount)
        .bind(&d.plaintiff)
        .bind(&d.defendant)
        .bind(d.status.as_str())
        .bind(&d.description)
        .bind(d.created_at)
        .bind(d.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "separate dispute"))?;
        Ok(())
    }

    async fn get_dispute(&self, id: Uuid) -> Result<Option<SeparateDispute>, DatabaseError> {
        Ok(sqlx::query_as::<_, SeparateDispute>("SELECT * FROM separate_disputes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_disputes(&self, case_id: Uuid) -> Result<Vec<SeparateDispute>, DatabaseError> {
        Ok(sqlx::query_as::<_, SeparateDispute>(
            "SELECT * FROM separate_disputes WHERE case_id = $1 ORDER BY created_at",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_dispute(&self, d: &SeparateDispute) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE separate_disputes SET
                name = $2, determination_number = $3, amount = $4, plaintiff = $5,
                defendant = $6, status = $7, description = $8, updated_at = $9
            WHERE id = $1",
        )
        .bind(d.id)
        .bind(&d.name)
        .bind(&d.determination_number)
        .bind(d.amount)
        .bind(&d.plaintiff)
        .bind(&d.defendant)
        .bind(d.status.as_str())
        .bind(&d.description)
        .bind(d.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("dispute {}", d.id)));
        }
        Ok(())
    }

    async fn delete_dispute(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM separate_disputes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl EventRepository for PgStore {
    async fn insert_event(&self, event: &CalendarEvent) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        insert_event_row(&mut conn, event).await
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<CalendarEvent>, DatabaseError> {
        Ok(sqlx::query_as::<_, CalendarEvent>("SELECT * FROM calendar_events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, DatabaseError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM calendar_events WHERE case_id = ANY(");
        qb.push_bind(query.case_ids.clone()).push(")");
        if let Some(case_id) = query.case_id {
            qb.push(" AND case_id = ").push_bind(case_id);
        }
        if let Some(event_type) = query.event_type {
            qb.push(" AND event_type = ").push_bind(event_type.as_str());
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = query.start_from {
            qb.push(" AND start_datetime >= ").push_bind(from);
        }
        if let Some(to) = query.start_to {
            qb.push(" AND start_datetime <= ").push_bind(to);
        }
        qb.push(" ORDER BY start_datetime, id");
        Ok(qb.build_query_as::<CalendarEvent>().fetch_all(&self.pool).await?)
    }

    async fn chain_members(&self, root_id: Uuid) -> Result<Vec<CalendarEvent>, DatabaseError> {
        Ok(sqlx::query_as::<_, CalendarEvent>(
            "SELECT * FROM calendar_events WHERE original_event_id = $1 AND id <> $1",
        )
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_scheduled_event(&self, e: &CalendarEvent) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let result = sqlx::query(
            "UPDATE calendar_events SET
                event_type = $2, title = $3, description = $4, start_datetime = $5,
                end_datetime = $6, courtroom = $7, court_address = $8, participants = $9,
                agenda = $10, email_notifications = $11, telegram_notifications = $12,
                updated_at = $13
            WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(e.id)
        .bind(e.event_type.as_str())
        .bind(&e.title)
        .bind(&e.description)
        .bind(e.start_datetime)
        .bind(e.end_datetime)
        .bind(&e.courtroom)
        .bind(&e.court_address)
        .bind(&e.participants)
        .bind(&e.agenda)
        .bind(e.email_notifications)
        .bind(e.telegram_notifications)
        .bind(e.updated_at)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(explain_event_miss(&mut conn, e.id).await);
        }
        Ok(())
    }

    async fn postpone_event(
        &self,
        id: Uuid,
        request: &PostponeRequest,
    ) -> Result<(CalendarEvent, CalendarEvent), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let postponed = sqlx::query_as::<_, CalendarEvent>(
            "UPDATE calendar_events SET
                status = 'postponed', postponement_reason = $2, postponed_by = $3,
                postponed_at = $4, updated_at = $4
            WHERE id = $1 AND status = 'scheduled'
            RETURNING *",
        )
        .bind(id)
        .bind(&request.reason)
        .bind(request.actor)
        .bind(request.at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(postponed) = postponed else {
            return Err(explain_event_miss(&mut tx, id).await);
        };

        let successor = postponed.successor(request);
        insert_event_row(&mut tx, &successor).await?;
        tx.commit().await?;
        Ok((postponed, successor))
    }

    async fn close_event(
        &self,
        id: Uuid,
        status: EventStatus,
        at: DateTime<Utc>,
    ) -> Result<CalendarEvent, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        let closed = sqlx::query_as::<_, CalendarEvent>(
            "UPDATE calendar_events SET status = $2, updated_at = $3
             WHERE id = $1 AND status = 'scheduled'
             RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?;
        match closed {
            Some(event) => Ok(event),
            None => Err(explain_event_miss(&mut conn, id).await),
        }
    }

    async fn delete_event(&self, id: Uuid, max_chain_depth: usize) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let event = sqlx::query_as::<_, CalendarEvent>(
            "SELECT * FROM calendar_events WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("event {}", id)))?;

        let root_id = event.chain_root_id();
        let root = sqlx::query_as::<_, CalendarEvent>(
            "SELECT * FROM calendar_events WHERE id = $1 FOR UPDATE",
        )
        .bind(root_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ChainError::MissingLink(root_id))?;

        let members = sqlx::query_as::<_, CalendarEvent>(
            "SELECT * FROM calendar_events WHERE original_event_id = $1 AND id <> $1 FOR UPDATE",
        )
        .bind(root_id)
        .fetch_all(&mut *tx)
        .await?;

        let relinks = ChainView::new(root, members).detach(id, max_chain_depth)?;
        for relink in &relinks {
            sqlx::query(
                "UPDATE calendar_events SET original_event_id = $2, previous_event_id = $3 WHERE id = $1",
            )
            .bind(relink.event_id)
            .bind(relink.original_event_id)
            .bind(relink.previous_event_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM calendar_events WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn insert_notification(&self, n: &EventNotification) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO event_notifications (
                id, event_id, user_id, notification_type, notification_time, is_sent, sent_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(n.id)
        .bind(n.event_id)
        .bind(n.user_id)
        .bind(n.notification_type.as_str())
        .bind(n.notification_time.as_str())
        .bind(n.is_sent)
        .bind(n.sent_at)
        .bind(n.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "notification for this event, type and time"))?;
        Ok(())
    }

    async fn list_notifications(&self, event_id: Uuid, user_id: Uuid) -> Result<Vec<EventNotification>, DatabaseError> {
        Ok(sqlx::query_as::<_, EventNotification>(
            "SELECT * FROM event_notifications WHERE event_id = $1 AND user_id = $2 ORDER BY created_at",
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn due_notifications(&self, now: DateTime<Utc>) -> Result<Vec<DueNotification>, DatabaseError> {
        let notifications = sqlx::query_as::<_, EventNotification>(
            "SELECT n.* FROM event_notifications n
             JOIN calendar_events e ON e.id = n.event_id
             WHERE NOT n.is_sent
               AND e.status = 'scheduled'
               AND e.start_datetime - CASE n.notification_time
                     WHEN '3_days' THEN INTERVAL '3 days'
                     WHEN '1_day' THEN INTERVAL '1 day'
                     WHEN '2_hours' THEN INTERVAL '2 hours'
                     ELSE INTERVAL '30 minutes'
                   END <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let event_ids: Vec<Uuid> = notifications.iter().map(|n| n.event_id).collect();
        let events: HashMap<Uuid, CalendarEvent> = sqlx::query_as::<_, CalendarEvent>(
            "SELECT * FROM calendar_events WHERE id = ANY($1)",
        )
        .bind(event_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();

        let mut due: Vec<DueNotification> = notifications
            .into_iter()
            .filter_map(|n| {
                let event = events.get(&n.event_id)?.clone();
                Some(DueNotification { notification: n, event })
            })
            .collect();
        due.sort_by_key(|d| d.notification.notification_time.send_at(d.event.start_datetime));
        Ok(due)
    }

    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<EventNotification, DatabaseError> {
        sqlx::query_as::<_, EventNotification>(
            "UPDATE event_notifications SET is_sent = TRUE, sent_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("notification {}", id)))
    }
}

#[async_trait]
impl InvitationRepository for PgStore {
    async fn upsert_case_invitation(&self, i: &CaseInvitation) -> Result<CaseInvitation, DatabaseError> {
        Ok(sqlx::query_as::<_, CaseInvitation>(
            "INSERT INTO case_invitations (
                id, case_id, inviter_id, invitee_email, invitee_id, access_level, status,
                token, message, invited_at, responded_at, expires_at
            ) VALUES ($1, $2, $3, $4, NULL, $5, 'pending', $6, $7, $8, NULL, $9)
            ON CONFLICT (case_id, invitee_email) DO UPDATE SET
                inviter_id = EXCLUDED.inviter_id,
                access_level = EXCLUDED.access_level,
                message = EXCLUDED.message,
                status = 'pending',
                invitee_id = NULL,
                responded_at = NULL,
                invited_at = EXCLUDED.invited_at,
                expires_at = EXCLUDED.expires_at
            RETURNING *",
        )
        .bind(i.id)
        .bind(i.case_id)
        .bind(i.inviter_id)
        .bind(&i.invitee_email)
        .bind(i.access_level.as_str())
        .bind(i.token)
        .bind(&i.message)
        .bind(i.invited_at)
        .bind(i.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "case invitation"))?)
    }

    async fn list_case_invitations(&self, case_id: Uuid) -> Result<Vec<CaseInvitation>, DatabaseError> {
        Ok(sqlx::query_as::<_, CaseInvitation>(
            "SELECT * FROM case_invitations WHERE case_id = $1 ORDER BY invited_at DESC",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn case_invitation_by_token(&self, token: Uuid) -> Result<Option<CaseInvitation>, DatabaseError> {
        Ok(sqlx::query_as::<_, CaseInvitation>("SELECT * FROM case_invitations WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn accept_case_invitation(
        &self,
        token: Uuid,
        invitee_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(CaseInvitation, AccessGrant), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let invitation = sqlx::query_as::<_, CaseInvitation>(
            "SELECT * FROM case_invitations WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("case invitation".into()))?;
        if !invitation.is_valid(now) {
            return Err(DatabaseError::StaleState(format!(
                "invitation is {}",
                invitation.effective_status(now)
            )));
        }

        let invitation = sqlx::query_as::<_, CaseInvitation>(
            "UPDATE case_invitations SET status = 'accepted', invitee_id = $2, responded_at = $3
             WHERE id = $1 RETURNING *",
        )
        .bind(invitation.id)
        .bind(invitee_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let candidate = NewGrant {
            case_id: invitation.case_id,
            user_id: invitee_id,
            access_level: invitation.access_level,
            granted_by: invitation.inviter_id,
            granted_at: now,
        }
        .into_grant();
        sqlx::query(
            "INSERT INTO case_access (id, case_id, user_id, access_level, granted_by, granted_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (case_id, user_id) DO NOTHING",
        )
        .bind(candidate.id)
        .bind(candidate.case_id)
        .bind(candidate.user_id)
        .bind(candidate.access_level.as_str())
        .bind(candidate.granted_by)
        .bind(candidate.granted_at)
        .execute(&mut *tx)
        .await?;

        let grant = sqlx::query_as::<_, AccessGrant>(
            "SELECT * FROM case_access WHERE case_id = $1 AND user_id = $2",
        )
        .bind(invitation.case_id)
        .bind(invitee_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((invitation, grant))
    }

    async fn decline_case_invitation(
        &self,
        token: Uuid,
        invitee_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CaseInvitation, DatabaseError> {
        let declined = sqlx::query_as::<_, CaseInvitation>(
            "UPDATE case_invitations SET status = 'declined', invitee_id = $2, responded_at = $3
             WHERE token = $1 AND status = 'pending' AND expires_at >= $3
             RETURNING *",
        )
        .bind(token)
        .bind(invitee_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(invitation) = declined {
            return Ok(invitation);
        }
        match self.case_invitation_by_token(token).await? {
            Some(invitation) => Err(DatabaseError::StaleState(format!(
                "invitation is {}",
                invitation.effective_status(now)
            ))),
            None => Err(DatabaseError::NotFound("case invitation".into())),
        }
    }

    async fn insert_system_invitation(&self, i: &SystemInvitation) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO system_invitations (
                id, inviter_id, invitee_email, token, status, created_at, expires_at, used_at, used_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(i.id)
        .bind(i.inviter_id)
        .bind(&i.invitee_email)
        .bind(i.token)
        .bind(i.status.as_str())
        .bind(i.created_at)
        .bind(i.expires_at)
        .bind(i.used_at)
        .bind(i.used_by)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "system invitation"))?;
        Ok(())
    }

    async fn system_invitation_by_token(&self, token: Uuid) -> Result<Option<SystemInvitation>, DatabaseError> {
        Ok(sqlx::query_as::<_, SystemInvitation>("SELECT * FROM system_invitations WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn close_system_invitation(
        &self,
        token: Uuid,
        status: SystemInvitationStatus,
        used_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<SystemInvitation, DatabaseError> {
        let used_at = match (status, used_by) {
            (SystemInvitationStatus::Used, Some(_)) => Some(now),
            (SystemInvitationStatus::Revoked, _) => None,
            (other, _) => {
                return Err(DatabaseError::StaleState(format!(
                    "system invitation cannot move to {}",
                    other
                )))
            }
        };

        let closed = sqlx::query_as::<_, SystemInvitation>(
            "UPDATE system_invitations SET status = $2, used_by = COALESCE($3, used_by), used_at = COALESCE($4, used_at)
             WHERE token = $1 AND status = 'pending' AND expires_at >= $5
             RETURNING *",
        )
        .bind(token)
        .bind(status.as_str())
        .bind(used_by)
        .bind(used_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(invitation) = closed {
            return Ok(invitation);
        }
        match self.system_invitation_by_token(token).await? {
            Some(invitation) => Err(DatabaseError::StaleState(format!(
                "invitation is {}",
                invitation.effective_status(now)
            ))),
            None => Err(DatabaseError::NotFound("system invitation".into())),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
