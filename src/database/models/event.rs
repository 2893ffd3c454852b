use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use super::text_column;

crate::text_enum! {
    pub enum EventType {
        Hearing => "hearing",
        SeparateHearing => "separate_hearing",
        Deadline => "deadline",
        Reminder => "reminder",
    }
}

crate::text_enum! {
    /// `scheduled` is the only non-terminal status
    pub enum EventStatus {
        Scheduled => "scheduled",
        Postponed => "postponed",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

/// A hearing, deadline or reminder on a case.
///
/// Postponement never edits the schedule of a row: the row is frozen as
/// `postponed` and a successor is inserted. Every successor points at the
/// chain root through `original_event_id` and at the row it replaced through
/// `previous_event_id`; both are `None` on the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub case_id: Uuid,
    pub dispute_id: Option<Uuid>,
    pub event_type: EventType,
    pub title: String,
    pub description: String,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: Option<DateTime<Utc>>,
    pub courtroom: String,
    pub court_address: String,
    pub participants: String,
    pub agenda: String,
    pub status: EventStatus,
    pub postponement_reason: String,
    pub postponed_by: Option<Uuid>,
    pub postponed_at: Option<DateTime<Utc>>,
    pub original_event_id: Option<Uuid>,
    pub previous_event_id: Option<Uuid>,
    pub email_notifications: bool,
    pub telegram_notifications: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to turn a scheduled row into a postponed one
#[derive(Debug, Clone)]
pub struct PostponeRequest {
    pub new_start: DateTime<Utc>,
    pub new_end: Option<DateTime<Utc>>,
    pub reason: String,
    pub actor: Uuid,
    pub at: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn is_root(&self) -> bool {
        self.original_event_id.is_none()
    }

    /// Root id as recorded on this row (denormalized, no traversal)
    pub fn chain_root_id(&self) -> Uuid {
        self.original_event_id.unwrap_or(self.id)
    }

    pub fn can_be_postponed(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Scheduled && self.start_datetime > now
    }

    /// Freeze this row as postponed
    pub fn mark_postponed(&mut self, req: &PostponeRequest) {
        self.status = EventStatus::Postponed;
        self.postponement_reason = req.reason.clone();
        self.postponed_by = Some(req.actor);
        self.postponed_at = Some(req.at);
        self.updated_at = req.at;
    }

    /// The row that replaces this one after a postponement
    pub fn successor(&self, req: &PostponeRequest) -> CalendarEvent {
        CalendarEvent {
            id: Uuid::new_v4(),
            case_id: self.case_id,
            dispute_id: self.dispute_id,
            event_type: self.event_type,
            title: self.title.clone(),
            description: self.description.clone(),
            start_datetime: req.new_start,
            end_datetime: req.new_end.or(self.end_datetime),
            courtroom: self.courtroom.clone(),
            court_address: self.court_address.clone(),
            participants: self.participants.clone(),
            agenda: self.agenda.clone(),
            status: EventStatus::Scheduled,
            postponement_reason: String::new(),
            postponed_by: None,
            postponed_at: None,
            original_event_id: Some(self.chain_root_id()),
            previous_event_id: Some(self.id),
            email_notifications: self.email_notifications,
            telegram_notifications: self.telegram_notifications,
            created_by: self.created_by,
            created_at: req.at,
            updated_at: req.at,
        }
    }
}

/// Input for a directly created event
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub case_id: Uuid,
    #[serde(default)]
    pub dispute_id: Option<Uuid>,
    pub event_type: EventType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_datetime: DateTime<Utc>,
    #[serde(default)]
    pub end_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub courtroom: String,
    #[serde(default)]
    pub court_address: String,
    #[serde(default)]
    pub participants: String,
    #[serde(default)]
    pub agenda: String,
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default)]
    pub telegram_notifications: bool,
}

fn default_true() -> bool {
    true
}

impl NewEvent {
    pub fn into_event(self, created_by: Uuid, now: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: Uuid::new_v4(),
            case_id: self.case_id,
            dispute_id: self.dispute_id,
            event_type: self.event_type,
            title: self.title,
            description: self.description,
            start_datetime: self.start_datetime,
            end_datetime: self.end_datetime,
            courtroom: self.courtroom,
            court_address: self.court_address,
            participants: self.participants,
            agenda: self.agenda,
            status: EventStatus::Scheduled,
            postponement_reason: String::new(),
            postponed_by: None,
            postponed_at: None,
            original_event_id: None,
            previous_event_id: None,
            email_notifications: self.email_notifications,
            telegram_notifications: self.telegram_notifications,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Editable descriptive fields. Status and chain links are not editable here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub event_type: Option<EventType>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_datetime: Option<DateTime<Utc>>,
    /// Absent leaves the end alone; `null` clears it
    #[serde(default, deserialize_with = "present")]
    pub end_datetime: Option<Option<DateTime<Utc>>>,
    pub courtroom: Option<String>,
    pub court_address: Option<String>,
    pub participants: Option<String>,
    pub agenda: Option<String>,
    pub email_notifications: Option<bool>,
    pub telegram_notifications: Option<bool>,
}

/// Distinguishes an explicit `null` from a missing field
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl EventPatch {
    pub fn apply(self, event: &mut CalendarEvent, now: DateTime<Utc>) {
        if let Some(v) = self.event_type { event.event_type = v; }
        if let Some(v) = self.title { event.title = v; }
        if let Some(v) = self.description { event.description = v; }
        if let Some(v) = self.start_datetime { event.start_datetime = v; }
        if let Some(v) = self.end_datetime { event.end_datetime = v; }
        if let Some(v) = self.courtroom { event.courtroom = v; }
        if let Some(v) = self.court_address { event.court_address = v; }
        if let Some(v) = self.participants { event.participants = v; }
        if let Some(v) = self.agenda { event.agenda = v; }
        if let Some(v) = self.email_notifications { event.email_notifications = v; }
        if let Some(v) = self.telegram_notifications { event.telegram_notifications = v; }
        event.updated_at = now;
    }
}

/// Store-level event filter. `case_ids` is the caller's accessible set.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub case_ids: Vec<Uuid>,
    pub case_id: Option<Uuid>,
    pub event_type: Option<EventType>,
    pub status: Option<EventStatus>,
    pub start_from: Option<DateTime<Utc>>,
    pub start_to: Option<DateTime<Utc>>,
}

impl EventQuery {
    pub fn matches(&self, event: &CalendarEvent) -> bool {
        self.case_ids.contains(&event.case_id)
            && self.case_id.map_or(true, |id| event.case_id == id)
            && self.event_type.map_or(true, |t| event.event_type == t)
            && self.status.map_or(true, |s| event.status == s)
            && self.start_from.map_or(true, |from| event.start_datetime >= from)
            && self.start_to.map_or(true, |to| event.start_datetime <= to)
    }
}

impl<'r> FromRow<'r, PgRow> for CalendarEvent {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            case_id: row.try_get("case_id")?,
            dispute_id: row.try_get("dispute_id")?,
            event_type: text_column(row, "event_type")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            start_datetime: row.try_get("start_datetime")?,
            end_datetime: row.try_get("end_datetime")?,
            courtroom: row.try_get("courtroom")?,
            court_address: row.try_get("court_address")?,
            participants: row.try_get("participants")?,
            agenda: row.try_get("agenda")?,
            status: text_column(row, "status")?,
            postponement_reason: row.try_get("postponement_reason")?,
            postponed_by: row.try_get("postponed_by")?,
            postponed_at: row.try_get("postponed_at")?,
            original_event_id: row.try_get("original_event_id")?,
            previous_event_id: row.try_get("previous_event_id")?,
            email_notifications: row.try_get("email_notifications")?,
            telegram_notifications: row.try_get("telegram_notifications")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn patch_tells_null_end_from_missing_end() {
        let missing: EventPatch = serde_json::from_str(r#"{"title":"Appeal hearing"}"#).unwrap();
        assert_eq!(missing.end_datetime, None);

        let cleared: EventPatch = serde_json::from_str(r#"{"end_datetime":null}"#).unwrap();
        assert_eq!(cleared.end_datetime, Some(None));

        let set: EventPatch = serde_json::from_str(r#"{"end_datetime":"2025-04-01T10:00:00Z"}"#).unwrap();
        assert!(matches!(set.end_datetime, Some(Some(_))));
    }

    fn hearing(now: DateTime<Utc>) -> CalendarEvent {
        NewEvent {
            case_id: Uuid::new_v4(),
            dispute_id: None,
            event_type: EventType::Hearing,
            title: "Preliminary hearing".into(),
            description: String::new(),
            start_datetime: now + Duration::days(1),
            end_datetime: Some(now + Duration::days(1) + Duration::hours(2)),
            courtroom: "305".into(),
            court_address: String::new(),
            participants: String::new(),
            agenda: String::new(),
            email_notifications: true,
            telegram_notifications: false,
        }
        .into_event(Uuid::new_v4(), now)
    }

    fn request(now: DateTime<Utc>, days: i64) -> PostponeRequest {
        PostponeRequest {
            new_start: now + Duration::days(days),
            new_end: None,
            reason: "expert unavailable".into(),
            actor: Uuid::new_v4(),
            at: now,
        }
    }

    #[test]
    fn successor_of_root_points_at_root() {
        let now = Utc::now();
        let root = hearing(now);
        let next = root.successor(&request(now, 5));
        assert_eq!(next.original_event_id, Some(root.id));
        assert_eq!(next.previous_event_id, Some(root.id));
        assert_eq!(next.status, EventStatus::Scheduled);
        assert_eq!(next.courtroom, "305");
        // end carried over from the original when no new end is given
        assert_eq!(next.end_datetime, root.end_datetime);
    }

    #[test]
    fn successor_of_successor_skips_to_root() {
        let now = Utc::now();
        let root = hearing(now);
        let b = root.successor(&request(now, 5));
        let c = b.successor(&request(now, 10));
        assert_eq!(c.original_event_id, Some(root.id));
        assert_eq!(c.previous_event_id, Some(b.id));
    }

    #[test]
    fn mark_postponed_records_actor_and_reason() {
        let now = Utc::now();
        let mut root = hearing(now);
        let req = request(now, 5);
        root.mark_postponed(&req);
        assert_eq!(root.status, EventStatus::Postponed);
        assert_eq!(root.postponed_by, Some(req.actor));
        assert_eq!(root.postponed_at, Some(now));
        assert_eq!(root.postponement_reason, "expert unavailable");
    }

    #[test]
    fn can_be_postponed_requires_future_scheduled_event() {
        let now = Utc::now();
        let mut event = hearing(now);
        assert!(event.can_be_postponed(now));
        assert!(!event.can_be_postponed(now + Duration::days(2)));
        event.status = EventStatus::Completed;
        assert!(!event.can_be_postponed(now));
    }

    #[test]
    fn query_is_bounded_by_accessible_cases() {
        let now = Utc::now();
        let event = hearing(now);
        let mut query = EventQuery::default();
        assert!(!query.matches(&event));
        query.case_ids.push(event.case_id);
        assert!(query.matches(&event));
        query.status = Some(EventStatus::Postponed);
        assert!(!query.matches(&event));
    }
}
