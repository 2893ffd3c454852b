//! Calendar reads and direct event edits. Postponement and the other status
//! transitions live in [`crate::services::postponement`].

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::{config, CalendarConfig};
use crate::database::models::{
    CalendarEvent, Case, EventPatch, EventQuery, EventStatus, EventType, GrantLevel, Level,
    NewEvent,
};
use crate::services::{AccessService, PostponementService, ServiceError, ServiceResult};
use crate::state::AppState;

/// Grants that put a shared case on the user's calendar
const CALENDAR_GRANTS: &[GrantLevel] = &[GrantLevel::Full, GrantLevel::Calendar];

/// Query string of `GET /api/calendar/events`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventListFilter {
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub status: Option<EventStatus>,
    pub case_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub upcoming: bool,
    #[serde(default)]
    pub today: bool,
    #[serde(default)]
    pub week: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: CalendarEvent,
    pub is_original: bool,
    pub postponement_count: usize,
    pub can_be_postponed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    /// day of month -> events starting that day, by start time
    pub days: BTreeMap<u32, Vec<CalendarEvent>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CalendarStats {
    pub total: usize,
    pub upcoming: usize,
    pub today: usize,
    pub week: usize,
    pub postponed: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Last instant of `date`, for inclusive upper bounds
fn day_end(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + Duration::days(1) - Duration::nanoseconds(1)
}

fn narrow_from(current: Option<DateTime<Utc>>, bound: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(bound, |c| c.max(bound)))
}

fn narrow_to(current: Option<DateTime<Utc>>, bound: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(bound, |c| c.min(bound)))
}

#[derive(Clone)]
pub struct CalendarService {
    state: AppState,
    access: AccessService,
    postponement: PostponementService,
    settings: CalendarConfig,
}

impl CalendarService {
    pub fn new(state: &AppState) -> Self {
        Self {
            state: state.clone(),
            access: AccessService::new(state),
            postponement: PostponementService::new(state),
            settings: config().calendar.clone(),
        }
    }

    pub async fn create_event(&self, actor: Uuid, input: NewEvent) -> ServiceResult<CalendarEvent> {
        let (case, _) = self.access.case_for(actor, input.case_id, Level::SCHEDULE).await?;
        let event = input.into_event(actor, self.state.now());
        self.validate(&case, &event).await?;
        self.state.store.insert_event(&event).await?;
        info!(event_id = %event.id, case_id = %case.id, event_type = %event.event_type, "Event created");
        Ok(event)
    }

    pub async fn list_events(&self, actor: Uuid, filter: &EventListFilter) -> ServiceResult<Vec<CalendarEvent>> {
        let now = self.state.now();
        let today = now.date_naive();
        let mut query = EventQuery {
            case_ids: self.access.accessible_case_ids(actor, Some(CALENDAR_GRANTS)).await?,
            case_id: filter.case_id,
            event_type: filter.event_type,
            status: filter.status,
            start_from: filter.date_from.map(day_start),
            start_to: filter.date_to.map(day_end),
        };
        if filter.upcoming {
            query.start_from = narrow_from(query.start_from, now);
            query.status = Some(EventStatus::Scheduled);
        }
        if filter.today {
            query.start_from = narrow_from(query.start_from, day_start(today));
            query.start_to = narrow_to(query.start_to, day_end(today));
        }
        if filter.week {
            query.start_from = narrow_from(query.start_from, day_start(today));
            query.start_to = narrow_to(query.start_to, day_end(today + Duration::days(6)));
        }
        Ok(self.state.store.list_events(&query).await?)
    }

    pub async fn event_detail(&self, actor: Uuid, event_id: Uuid) -> ServiceResult<EventDetail> {
        let (event, _, _) = self.access.visible_event(actor, event_id).await?;
        let postponement_count = self.postponement.postponement_count(&event).await?;
        Ok(EventDetail {
            is_original: event.is_root(),
            can_be_postponed: self.postponement.can_be_postponed(&event),
            postponement_count,
            event,
        })
    }

    pub async fn update_event(&self, actor: Uuid, event_id: Uuid, patch: EventPatch) -> ServiceResult<CalendarEvent> {
        let mut event = self.access.load_event(event_id).await?;
        let (case, _) = self.access.require_event_control(actor, &event).await?;
        if event.status != EventStatus::Scheduled {
            return Err(ServiceError::invalid_state(format!(
                "Only scheduled events can be edited; this event is {}",
                event.status
            )));
        }
        patch.apply(&mut event, self.state.now());
        self.validate(&case, &event).await?;
        self.state.store.update_scheduled_event(&event).await?;
        Ok(event)
    }

    pub async fn delete_event(&self, actor: Uuid, event_id: Uuid) -> ServiceResult<()> {
        self.postponement.delete(actor, event_id).await
    }

    pub async fn month_view(&self, actor: Uuid, year: i32, month: u32) -> ServiceResult<CalendarMonth> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| ServiceError::field("month", "Invalid year or month"))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| ServiceError::field("year", "Invalid year or month"))?;

        let query = EventQuery {
            case_ids: self.access.accessible_case_ids(actor, None).await?,
            start_from: Some(day_start(first)),
            start_to: Some(day_start(next) - Duration::nanoseconds(1)),
            ..EventQuery::default()
        };
        let mut days: BTreeMap<u32, Vec<CalendarEvent>> = BTreeMap::new();
        for event in self.state.store.list_events(&query).await? {
            days.entry(event.start_datetime.day()).or_default().push(event);
        }
        Ok(CalendarMonth { year, month, days })
    }

    pub async fn stats(&self, actor: Uuid) -> ServiceResult<CalendarStats> {
        let now = self.state.now();
        let today = now.date_naive();
        let week_end = day_end(today + Duration::days(6));
        let query = EventQuery {
            case_ids: self.access.accessible_case_ids(actor, None).await?,
            ..EventQuery::default()
        };

        let mut stats = CalendarStats::default();
        for event in self.state.store.list_events(&query).await? {
            let start = event.start_datetime;
            stats.total += 1;
            if event.status == EventStatus::Scheduled && start >= now {
                stats.upcoming += 1;
            }
            if start.date_naive() == today {
                stats.today += 1;
            }
            if start >= day_start(today) && start <= week_end {
                stats.week += 1;
            }
            if event.status == EventStatus::Postponed {
                stats.postponed += 1;
            }
            *stats.by_type.entry(event.event_type.to_string()).or_default() += 1;
            *stats.by_status.entry(event.status.to_string()).or_default() += 1;
        }
        Ok(stats)
    }

    async fn validate(&self, case: &Case, event: &CalendarEvent) -> ServiceResult<()> {
        let title_len = event.title.trim().chars().count();
        if title_len == 0 || title_len > self.settings.max_title_len {
            return Err(ServiceError::field(
                "title",
                format!("Title must be 1 to {} characters", self.settings.max_title_len),
            ));
        }
        if let Some(end) = event.end_datetime {
            if end <= event.start_datetime {
                return Err(ServiceError::field("end_datetime", "End must be after start"));
            }
        }
        match event.dispute_id {
            Some(dispute_id) => {
                let belongs = self
                    .state
                    .store
                    .get_dispute(dispute_id)
                    .await?
                    .is_some_and(|d| d.case_id == case.id);
                if !belongs {
                    return Err(ServiceError::field("dispute_id", "Dispute does not belong to this case"));
                }
            }
            None if event.event_type == EventType::SeparateHearing => {
                return Err(ServiceError::field("dispute_id", "A separate hearing requires a dispute"));
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{DisputeStatus, NewDispute};
    use crate::services::postponement::PostponeInput;
    use crate::services::AccessDenial;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn create_requires_schedule_level() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let clerk = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        fx.grant(&case, clerk, GrantLevel::Calendar).await;
        fx.grant(&case, viewer, GrantLevel::View).await;
        let calendar = fx.calendar();

        let start = fx.now() + Duration::days(1);
        let created = calendar.create_event(clerk, Fixture::new_event(&case, start)).await.unwrap();
        assert_eq!(created.created_by, clerk);
        assert_eq!(created.status, EventStatus::Scheduled);
        assert!(matches!(
            calendar.create_event(viewer, Fixture::new_event(&case, start)).await,
            Err(ServiceError::AccessDenied(AccessDenial::InsufficientLevel))
        ));
    }

    #[tokio::test]
    async fn create_validates_title_dates_and_dispute() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let other = fx.case(fx.owner).await;
        let calendar = fx.calendar();
        let start = fx.now() + Duration::days(1);

        let mut untitled = Fixture::new_event(&case, start);
        untitled.title = "   ".into();
        assert!(matches!(calendar.create_event(fx.owner, untitled).await, Err(ServiceError::Validation { .. })));

        let mut inverted = Fixture::new_event(&case, start);
        inverted.end_datetime = Some(start - Duration::hours(1));
        assert!(matches!(calendar.create_event(fx.owner, inverted).await, Err(ServiceError::Validation { .. })));

        let mut separate = Fixture::new_event(&case, start);
        separate.event_type = EventType::SeparateHearing;
        assert!(matches!(calendar.create_event(fx.owner, separate).await, Err(ServiceError::Validation { .. })));

        let foreign = fx
            .cases()
            .create_dispute(
                fx.owner,
                other.id,
                NewDispute {
                    name: "Counterclaim".into(),
                    determination_number: String::new(),
                    amount: None,
                    plaintiff: String::new(),
                    defendant: String::new(),
                    status: DisputeStatus::Separated,
                    description: String::new(),
                },
            )
            .await
            .unwrap();
        let mut misplaced = Fixture::new_event(&case, start);
        misplaced.event_type = EventType::SeparateHearing;
        misplaced.dispute_id = Some(foreign.id);
        assert!(matches!(calendar.create_event(fx.owner, misplaced).await, Err(ServiceError::Validation { .. })));
    }

    #[tokio::test]
    async fn list_skips_view_only_cases() {
        let fx = Fixture::new();
        let mine = fx.case(fx.owner).await;
        let shared = fx.case(Uuid::new_v4()).await;
        let watched = fx.case(Uuid::new_v4()).await;
        fx.grant(&shared, fx.owner, GrantLevel::Calendar).await;
        fx.grant(&watched, fx.owner, GrantLevel::View).await;
        fx.event(&mine, fx.owner, Duration::days(1)).await;
        fx.event(&shared, shared.owner_id, Duration::days(2)).await;
        fx.event(&watched, watched.owner_id, Duration::days(3)).await;

        let events = fx.calendar().list_events(fx.owner, &EventListFilter::default()).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.windows(2).all(|w| w[0].start_datetime <= w[1].start_datetime));
        assert!(events.iter().all(|e| e.case_id != watched.id));
    }

    #[tokio::test]
    async fn list_time_windows() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        // clock sits at 09:00 on a Monday
        let past = fx.event(&case, fx.owner, Duration::hours(-2)).await;
        let later_today = fx.event(&case, fx.owner, Duration::hours(3)).await;
        let in_five_days = fx.event(&case, fx.owner, Duration::days(5)).await;
        fx.event(&case, fx.owner, Duration::days(20)).await;
        let calendar = fx.calendar();

        let today = calendar
            .list_events(fx.owner, &EventListFilter { today: true, ..Default::default() })
            .await
            .unwrap();
        let ids: Vec<Uuid> = today.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![past.id, later_today.id]);

        let upcoming = calendar
            .list_events(fx.owner, &EventListFilter { upcoming: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 3);

        let week = calendar
            .list_events(fx.owner, &EventListFilter { week: true, ..Default::default() })
            .await
            .unwrap();
        let ids: Vec<Uuid> = week.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![past.id, later_today.id, in_five_days.id]);

        let ranged = calendar
            .list_events(
                fx.owner,
                &EventListFilter {
                    date_from: NaiveDate::from_ymd_opt(2025, 3, 15),
                    date_to: NaiveDate::from_ymd_opt(2025, 3, 15),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].id, in_five_days.id);
    }

    #[tokio::test]
    async fn detail_reports_chain_position() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let b = fx
            .postponement()
            .postpone(
                fx.owner,
                a.id,
                PostponeInput { new_start: fx.now() + Duration::days(4), new_end: None, reason: String::new() },
            )
            .await
            .unwrap()
            .new_event;
        let calendar = fx.calendar();

        let root = calendar.event_detail(fx.owner, a.id).await.unwrap();
        assert!(root.is_original);
        assert!(!root.can_be_postponed);
        assert_eq!(root.postponement_count, 1);

        let current = calendar.event_detail(fx.owner, b.id).await.unwrap();
        assert!(!current.is_original);
        assert!(current.can_be_postponed);
        assert_eq!(current.postponement_count, 1);
    }

    #[tokio::test]
    async fn postponed_rows_are_frozen() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let calendar = fx.calendar();

        let patch = EventPatch { courtroom: Some("101".into()), ..EventPatch::default() };
        let edited = calendar.update_event(fx.owner, a.id, patch.clone()).await.unwrap();
        assert_eq!(edited.courtroom, "101");

        fx.postponement()
            .postpone(
                fx.owner,
                a.id,
                PostponeInput { new_start: fx.now() + Duration::days(4), new_end: None, reason: String::new() },
            )
            .await
            .unwrap();
        assert!(matches!(
            calendar.update_event(fx.owner, a.id, patch).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn inherited_stale_end_can_be_cleared() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let calendar = fx.calendar();

        let moved = fx
            .postponement()
            .postpone(
                fx.owner,
                a.id,
                PostponeInput { new_start: fx.now() + Duration::days(9), new_end: None, reason: String::new() },
            )
            .await
            .unwrap()
            .new_event;
        assert_eq!(moved.end_datetime, a.end_datetime);

        let rename = EventPatch { title: Some("Resumed hearing".into()), ..EventPatch::default() };
        assert!(matches!(
            calendar.update_event(fx.owner, moved.id, rename).await,
            Err(ServiceError::Validation { .. })
        ));

        let fix = EventPatch {
            title: Some("Resumed hearing".into()),
            end_datetime: Some(None),
            ..EventPatch::default()
        };
        let edited = calendar.update_event(fx.owner, moved.id, fix).await.unwrap();
        assert_eq!(edited.title, "Resumed hearing");
        assert_eq!(edited.end_datetime, None);
    }

    #[tokio::test]
    async fn month_view_groups_by_day() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        fx.event(&case, fx.owner, Duration::hours(1)).await;
        fx.event(&case, fx.owner, Duration::hours(4)).await;
        fx.event(&case, fx.owner, Duration::days(3)).await;
        fx.event(&case, fx.owner, Duration::days(40)).await;
        let calendar = fx.calendar();

        let march = calendar.month_view(fx.owner, 2025, 3).await.unwrap();
        assert_eq!(march.days.get(&10).map(Vec::len), Some(2));
        assert_eq!(march.days.get(&13).map(Vec::len), Some(1));
        assert_eq!(march.days.values().map(Vec::len).sum::<usize>(), 3);

        assert!(matches!(
            calendar.month_view(fx.owner, 2025, 13).await,
            Err(ServiceError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn stats_count_windows_and_statuses() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::hours(2)).await;
        fx.event(&case, fx.owner, Duration::days(10)).await;
        fx.postponement()
            .postpone(
                fx.owner,
                a.id,
                PostponeInput { new_start: fx.now() + Duration::days(3), new_end: None, reason: String::new() },
            )
            .await
            .unwrap();

        let stats = fx.calendar().stats(fx.owner).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.upcoming, 2);
        assert_eq!(stats.today, 1);
        assert_eq!(stats.week, 2);
        assert_eq!(stats.postponed, 1);
        assert_eq!(stats.by_status.get("scheduled"), Some(&2));
        assert_eq!(stats.by_type.get("hearing"), Some(&3));
    }
}
