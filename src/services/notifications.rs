use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::database::models::{DueNotification, EventNotification, NewNotification};
use crate::services::{AccessService, ServiceResult};
use crate::state::AppState;

/// Per-user reminders on calendar events. Delivery is external: a dispatcher
/// polls [`NotificationService::due`] and acknowledges with `mark_sent`.
#[derive(Clone)]
pub struct NotificationService {
    state: AppState,
    access: AccessService,
}

impl NotificationService {
    pub fn new(state: &AppState) -> Self {
        Self { state: state.clone(), access: AccessService::new(state) }
    }

    pub async fn list(&self, actor: Uuid, event_id: Uuid) -> ServiceResult<Vec<EventNotification>> {
        let (event, _, _) = self.access.visible_event(actor, event_id).await?;
        Ok(self.state.store.list_notifications(event.id, actor).await?)
    }

    pub async fn create(&self, actor: Uuid, event_id: Uuid, input: NewNotification) -> ServiceResult<EventNotification> {
        let (event, _, _) = self.access.visible_event(actor, event_id).await?;
        let notification = input.into_notification(event.id, actor, self.state.now());
        self.state.store.insert_notification(&notification).await?;
        Ok(notification)
    }

    pub async fn due(&self, now: DateTime<Utc>) -> ServiceResult<Vec<DueNotification>> {
        Ok(self.state.store.due_notifications(now).await?)
    }

    pub async fn mark_sent(&self, notification_id: Uuid, now: DateTime<Utc>) -> ServiceResult<EventNotification> {
        let row = self.state.store.mark_notification_sent(notification_id, now).await?;
        info!(notification_id = %row.id, event_id = %row.event_id, "Notification marked sent");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{GrantLevel, NotificationTime, NotificationType};
    use crate::services::postponement::PostponeInput;
    use crate::services::ServiceError;
    use crate::testing::Fixture;
    use chrono::Duration;

    fn reminder(time: NotificationTime) -> NewNotification {
        NewNotification { notification_type: NotificationType::Email, notification_time: time }
    }

    #[tokio::test]
    async fn each_slot_is_unique_per_user() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let viewer = Uuid::new_v4();
        fx.grant(&case, viewer, GrantLevel::View).await;
        let event = fx.event(&case, fx.owner, Duration::days(5)).await;
        let svc = fx.notifications();

        svc.create(fx.owner, event.id, reminder(NotificationTime::OneDay)).await.unwrap();
        assert!(matches!(
            svc.create(fx.owner, event.id, reminder(NotificationTime::OneDay)).await,
            Err(ServiceError::Validation { .. })
        ));
        // a different user may hold the same slot
        svc.create(viewer, event.id, reminder(NotificationTime::OneDay)).await.unwrap();

        assert_eq!(svc.list(fx.owner, event.id).await.unwrap().len(), 1);
        assert!(matches!(
            svc.list(Uuid::new_v4(), event.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn due_respects_lead_time_status_and_sent_flag() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let soon = fx.event(&case, fx.owner, Duration::hours(1)).await;
        let later = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.notifications();

        let two_hours = svc.create(fx.owner, soon.id, reminder(NotificationTime::TwoHours)).await.unwrap();
        svc.create(fx.owner, soon.id, reminder(NotificationTime::ThirtyMinutes)).await.unwrap();
        svc.create(fx.owner, later.id, reminder(NotificationTime::ThreeDays)).await.unwrap();
        let one_day = svc.create(fx.owner, later.id, reminder(NotificationTime::OneDay)).await.unwrap();

        let due: Vec<Uuid> = svc.due(fx.now()).await.unwrap().iter().map(|d| d.notification.id).collect();
        assert_eq!(due.len(), 2);
        assert!(due.contains(&two_hours.id));

        svc.mark_sent(two_hours.id, fx.now()).await.unwrap();
        let due: Vec<Uuid> = svc.due(fx.now()).await.unwrap().iter().map(|d| d.notification.id).collect();
        assert_eq!(due.len(), 1);
        assert!(!due.contains(&one_day.id));

        // postponed rows stop producing reminders
        fx.postponement()
            .postpone(
                fx.owner,
                later.id,
                PostponeInput { new_start: fx.now() + Duration::days(30), new_end: None, reason: String::new() },
            )
            .await
            .unwrap();
        assert!(svc.due(fx.now()).await.unwrap().is_empty());
    }
}
