use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use super::event::CalendarEvent;
use super::text_column;

crate::text_enum! {
    pub enum NotificationType {
        Email => "email",
        Telegram => "telegram",
    }
}

crate::text_enum! {
    /// How long before the event start the reminder goes out
    pub enum NotificationTime {
        ThreeDays => "3_days",
        OneDay => "1_day",
        TwoHours => "2_hours",
        ThirtyMinutes => "30_minutes",
    }
}

impl NotificationTime {
    pub fn lead_time(&self) -> Duration {
        match self {
            NotificationTime::ThreeDays => Duration::days(3),
            NotificationTime::OneDay => Duration::days(1),
            NotificationTime::TwoHours => Duration::hours(2),
            NotificationTime::ThirtyMinutes => Duration::minutes(30),
        }
    }

    pub fn send_at(&self, event_start: DateTime<Utc>) -> DateTime<Utc> {
        event_start - self.lead_time()
    }
}

/// Unique on (event, user, type, time)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventNotification {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub notification_time: NotificationTime,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub notification_type: NotificationType,
    pub notification_time: NotificationTime,
}

impl NewNotification {
    pub fn into_notification(self, event_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> EventNotification {
        EventNotification {
            id: Uuid::new_v4(),
            event_id,
            user_id,
            notification_type: self.notification_type,
            notification_time: self.notification_time,
            is_sent: false,
            sent_at: None,
            created_at: now,
        }
    }
}

impl EventNotification {
    pub fn same_slot(&self, other: &EventNotification) -> bool {
        self.event_id == other.event_id
            && self.user_id == other.user_id
            && self.notification_type == other.notification_type
            && self.notification_time == other.notification_time
    }
}

/// An unsent notification whose send time has arrived, with its event
#[derive(Debug, Clone, Serialize)]
pub struct DueNotification {
    pub notification: EventNotification,
    pub event: CalendarEvent,
}

impl<'r> FromRow<'r, PgRow> for EventNotification {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            user_id: row.try_get("user_id")?,
            notification_type: text_column(row, "notification_type")?,
            notification_time: text_column(row, "notification_time")?,
            is_sent: row.try_get("is_sent")?,
            sent_at: row.try_get("sent_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_times() {
        let start = Utc::now();
        assert_eq!(NotificationTime::ThreeDays.send_at(start), start - Duration::hours(72));
        assert_eq!(NotificationTime::ThirtyMinutes.lead_time(), Duration::minutes(30));
        assert_eq!("2_hours".parse::<NotificationTime>().unwrap(), NotificationTime::TwoHours);
    }
}
