//! Event lifecycle (postpone, complete, cancel, delete) and chain queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{config, CalendarConfig};
use crate::database::models::{
    CalendarEvent, ChainError, ChainView, EventStatus, PostponeRequest, RootWalk,
};
use crate::services::{AccessService, ServiceError, ServiceResult};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct PostponeInput {
    pub new_start: DateTime<Utc>,
    #[serde(default)]
    pub new_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Postponement {
    pub postponed_event: CalendarEvent,
    pub new_event: CalendarEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainHistory {
    pub history: Vec<CalendarEvent>,
    pub total_postponements: usize,
    pub latest_event_id: Uuid,
    pub branch_points: Vec<Uuid>,
}

#[derive(Clone)]
pub struct PostponementService {
    state: AppState,
    access: AccessService,
    settings: CalendarConfig,
}

impl PostponementService {
    pub fn new(state: &AppState) -> Self {
        Self {
            state: state.clone(),
            access: AccessService::new(state),
            settings: config().calendar.clone(),
        }
    }

    pub async fn postpone(&self, actor: Uuid, event_id: Uuid, input: PostponeInput) -> ServiceResult<Postponement> {
        let event = self.access.load_event(event_id).await?;
        self.access.require_event_control(actor, &event).await?;

        if input.reason.chars().count() > self.settings.max_postponement_reason_len {
            return Err(ServiceError::field(
                "reason",
                format!(
                    "Reason must be at most {} characters",
                    self.settings.max_postponement_reason_len
                ),
            ));
        }
        if event.status != EventStatus::Scheduled {
            return Err(ServiceError::invalid_state(format!(
                "Only scheduled events can be postponed; this event is {}",
                event.status
            )));
        }

        let now = self.state.now();
        if input.new_start <= now {
            return Err(ServiceError::invalid_state("New start must be in the future"));
        }
        if let Some(end) = input.new_end {
            if end <= input.new_start {
                return Err(ServiceError::invalid_state("New end must be after the new start"));
            }
        }

        let request = PostponeRequest {
            new_start: input.new_start,
            new_end: input.new_end,
            reason: input.reason,
            actor,
            at: now,
        };
        let (postponed_event, new_event) = self.state.store.postpone_event(event.id, &request).await?;

        if new_event.end_datetime.is_some_and(|end| end <= new_event.start_datetime) {
            warn!(
                new_event_id = %new_event.id,
                "Successor kept an end time at or before its new start; clear or reset it before editing"
            );
        }

        info!(
            event_id = %postponed_event.id,
            new_event_id = %new_event.id,
            root_id = %new_event.chain_root_id(),
            actor = %actor,
            "Event postponed"
        );
        Ok(Postponement { postponed_event, new_event })
    }

    pub async fn mark_completed(&self, actor: Uuid, event_id: Uuid) -> ServiceResult<CalendarEvent> {
        self.close(actor, event_id, EventStatus::Completed).await
    }

    pub async fn cancel(&self, actor: Uuid, event_id: Uuid) -> ServiceResult<CalendarEvent> {
        self.close(actor, event_id, EventStatus::Cancelled).await
    }

    async fn close(&self, actor: Uuid, event_id: Uuid, status: EventStatus) -> ServiceResult<CalendarEvent> {
        let event = self.access.load_event(event_id).await?;
        self.access.require_event_control(actor, &event).await?;
        if event.status != EventStatus::Scheduled {
            return Err(ServiceError::invalid_state(format!(
                "Only scheduled events can be {}; this event is {}",
                status, event.status
            )));
        }
        let closed = self.state.store.close_event(event.id, status, self.state.now()).await?;
        info!(event_id = %closed.id, status = %closed.status, actor = %actor, "Event closed");
        Ok(closed)
    }

    pub async fn delete(&self, actor: Uuid, event_id: Uuid) -> ServiceResult<()> {
        let event = self.access.load_event(event_id).await?;
        self.access.require_event_control(actor, &event).await?;
        self.state
            .store
            .delete_event(event.id, self.settings.max_chain_depth)
            .await?;
        info!(event_id = %event.id, root = event.is_root(), actor = %actor, "Event deleted");
        Ok(())
    }

    /// Walk `original_event_id` links up to the root
    pub async fn original_event(&self, event: &CalendarEvent) -> ServiceResult<CalendarEvent> {
        let mut walk = RootWalk::new(self.settings.max_chain_depth);
        let mut current = event.clone();
        loop {
            walk.visit(current.id).map_err(|e| {
                warn!(event_id = %event.id, error = %e, "Malformed postponement chain");
                ServiceError::from(e)
            })?;
            match current.original_event_id {
                None => return Ok(current),
                Some(next) => {
                    current = self.state.store.get_event(next).await?.ok_or_else(|| {
                        ServiceError::from(ChainError::MissingLink(next))
                    })?;
                }
            }
        }
    }

    /// Whole chain the event belongs to, rebuilt from its root
    pub async fn chain(&self, event: &CalendarEvent) -> ServiceResult<ChainView> {
        let root = self.original_event(event).await?;
        let members = self.state.store.chain_members(root.id).await?;
        Ok(ChainView::new(root, members))
    }

    pub async fn postponement_history(&self, event: &CalendarEvent) -> ServiceResult<Vec<CalendarEvent>> {
        let chain = self.chain(event).await?;
        let history = chain.history(self.settings.max_chain_depth)?;
        Ok(history.into_iter().cloned().collect())
    }

    pub async fn latest_event(&self, event: &CalendarEvent) -> ServiceResult<CalendarEvent> {
        let chain = self.chain(event).await?;
        let latest = chain.latest(self.settings.max_chain_depth)?;
        Ok(latest.clone())
    }

    pub async fn postponement_count(&self, event: &CalendarEvent) -> ServiceResult<usize> {
        let chain = self.chain(event).await?;
        Ok(chain.postponement_count(self.settings.max_chain_depth)?)
    }

    pub async fn branch_points(&self, event: &CalendarEvent) -> ServiceResult<Vec<Uuid>> {
        Ok(self.chain(event).await?.branch_points())
    }

    pub fn can_be_postponed(&self, event: &CalendarEvent) -> bool {
        event.can_be_postponed(self.state.now())
    }

    /// History view for `GET /events/:id/history`; any access to the case
    pub async fn history(&self, actor: Uuid, event_id: Uuid) -> ServiceResult<ChainHistory> {
        let (event, _, _) = self.access.visible_event(actor, event_id).await?;
        let chain = self.chain(&event).await?;
        let depth = self.settings.max_chain_depth;
        let history: Vec<CalendarEvent> = chain.history(depth)?.into_iter().cloned().collect();
        let latest_event_id = chain.latest(depth)?.id;
        Ok(ChainHistory {
            total_postponements: history.len().saturating_sub(1),
            latest_event_id,
            branch_points: chain.branch_points(),
            history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::GrantLevel;
    use crate::services::AccessDenial;
    use crate::testing::Fixture;
    use chrono::Duration;

    fn later(fx: &Fixture, days: i64) -> PostponeInput {
        PostponeInput {
            new_start: fx.now() + Duration::days(days),
            new_end: None,
            reason: "Judge on leave".into(),
        }
    }

    #[tokio::test]
    async fn postpone_freezes_row_and_links_successor() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;

        let result = fx.postponement().postpone(fx.owner, a.id, later(&fx, 5)).await.unwrap();
        assert_eq!(result.postponed_event.status, EventStatus::Postponed);
        assert_eq!(result.postponed_event.postponed_by, Some(fx.owner));
        assert_eq!(result.postponed_event.postponed_at, Some(fx.now()));
        assert_eq!(result.new_event.status, EventStatus::Scheduled);
        assert_eq!(result.new_event.original_event_id, Some(a.id));
        assert_eq!(result.new_event.previous_event_id, Some(a.id));
        assert_eq!(result.new_event.start_datetime, fx.now() + Duration::days(5));
        // no new end given: the original end is carried over
        assert_eq!(result.new_event.end_datetime, a.end_datetime);
    }

    #[tokio::test]
    async fn scenario_a_b_c() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();

        let b = svc.postpone(fx.owner, a.id, later(&fx, 5)).await.unwrap().new_event;
        fx.clock.advance(Duration::minutes(1));
        let c = svc.postpone(fx.owner, b.id, later(&fx, 9)).await.unwrap().new_event;

        let a = fx.access().load_event(a.id).await.unwrap();
        let b = fx.access().load_event(b.id).await.unwrap();
        assert_eq!(a.status, EventStatus::Postponed);
        assert_eq!(b.status, EventStatus::Postponed);
        assert_eq!(c.status, EventStatus::Scheduled);
        assert_eq!(c.original_event_id, Some(a.id));
        assert_eq!(svc.original_event(&c).await.unwrap().id, a.id);

        let ids: Vec<Uuid> = svc.postponement_history(&a).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(svc.postponement_count(&c).await.unwrap(), 2);
        assert_eq!(svc.latest_event(&a).await.unwrap().id, c.id);
        assert!(svc.branch_points(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_member_points_at_root_after_many_postponements() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let root = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();

        let mut current = root.clone();
        for i in 0..5 {
            fx.clock.advance(Duration::minutes(1));
            current = svc.postpone(fx.owner, current.id, later(&fx, 3 + i)).await.unwrap().new_event;
        }

        let members = fx.state.store.chain_members(root.id).await.unwrap();
        assert_eq!(members.len(), 5);
        assert!(members.iter().all(|m| m.original_event_id == Some(root.id)));
        let history = svc.postponement_history(&current).await.unwrap();
        assert_eq!(history.len(), 1 + members.len());
    }

    #[tokio::test]
    async fn stale_event_cannot_be_postponed_twice() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();

        svc.postpone(fx.owner, a.id, later(&fx, 5)).await.unwrap();
        let second = svc.postpone(fx.owner, a.id, later(&fx, 6)).await;
        assert!(matches!(second, Err(ServiceError::InvalidState(_))));
        assert_eq!(fx.state.store.chain_members(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_postpones_produce_one_successor() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();

        let (first, second) = tokio::join!(
            svc.postpone(fx.owner, a.id, later(&fx, 5)),
            svc.postpone(fx.owner, a.id, later(&fx, 6)),
        );
        assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(fx.state.store.chain_members(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_start_must_be_in_the_future_and_end_after_start() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();

        let past = PostponeInput {
            new_start: fx.now() - Duration::seconds(1),
            new_end: None,
            reason: String::new(),
        };
        assert!(matches!(svc.postpone(fx.owner, a.id, past).await, Err(ServiceError::InvalidState(_))));

        let start = fx.now() + Duration::days(3);
        let inverted = PostponeInput {
            new_start: start,
            new_end: Some(start - Duration::hours(1)),
            reason: String::new(),
        };
        assert!(matches!(svc.postpone(fx.owner, a.id, inverted).await, Err(ServiceError::InvalidState(_))));

        // nothing was written by the rejected calls
        let a = fx.access().load_event(a.id).await.unwrap();
        assert_eq!(a.status, EventStatus::Scheduled);
    }

    #[tokio::test]
    async fn overlong_reason_is_a_validation_error() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let mut input = later(&fx, 5);
        input.reason = "x".repeat(1001);
        assert!(matches!(
            fx.postponement().postpone(fx.owner, a.id, input).await,
            Err(ServiceError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn view_grantee_cannot_postpone() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let viewer = Uuid::new_v4();
        fx.grant(&case, viewer, GrantLevel::View).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;

        let result = fx.postponement().postpone(viewer, a.id, later(&fx, 5)).await;
        assert!(matches!(
            result,
            Err(ServiceError::AccessDenied(AccessDenial::InsufficientLevel))
        ));
    }

    #[tokio::test]
    async fn creator_keeps_control_only_while_holding_access() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let creator = Uuid::new_v4();
        let grant = fx.grant(&case, creator, GrantLevel::Calendar).await;
        let a = fx.event(&case, creator, Duration::days(2)).await;
        let b = fx.event(&case, creator, Duration::days(3)).await;
        let access = fx.access();
        let svc = fx.postponement();

        // downgraded to view: still the creator, still allowed
        access.revoke(fx.owner, case.id, grant.id).await.unwrap();
        fx.grant(&case, creator, GrantLevel::View).await;
        assert!(svc.mark_completed(creator, a.id).await.is_ok());

        // no access at all: the creator exception no longer applies
        let grants = access.list_grants(fx.owner, case.id).await.unwrap();
        access.revoke(fx.owner, case.id, grants[0].id).await.unwrap();
        assert!(matches!(
            svc.cancel(creator, b.id).await,
            Err(ServiceError::AccessDenied(AccessDenial::NoAccess))
        ));
    }

    #[tokio::test]
    async fn complete_and_cancel_are_terminal() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();

        let done = svc.mark_completed(fx.owner, a.id).await.unwrap();
        assert_eq!(done.status, EventStatus::Completed);
        assert!(matches!(svc.cancel(fx.owner, a.id).await, Err(ServiceError::InvalidState(_))));
        assert!(matches!(
            svc.postpone(fx.owner, a.id, later(&fx, 5)).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert!(!svc.can_be_postponed(&done));
    }

    #[tokio::test]
    async fn cycle_in_original_links_is_reported_not_followed() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let mut a = Fixture::new_event(&case, fx.now() + Duration::days(1)).into_event(fx.owner, fx.now());
        let mut b = Fixture::new_event(&case, fx.now() + Duration::days(2)).into_event(fx.owner, fx.now());
        a.original_event_id = Some(b.id);
        a.previous_event_id = Some(b.id);
        b.original_event_id = Some(a.id);
        b.previous_event_id = Some(a.id);
        fx.state.store.insert_event(&a).await.unwrap();
        fx.state.store.insert_event(&b).await.unwrap();

        let svc = fx.postponement();
        assert!(matches!(svc.original_event(&a).await, Err(ServiceError::InvalidState(_))));
        assert!(matches!(svc.postponement_history(&b).await, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn deleting_root_re_roots_the_chain() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();
        let b = svc.postpone(fx.owner, a.id, later(&fx, 5)).await.unwrap().new_event;
        fx.clock.advance(Duration::minutes(1));
        let c = svc.postpone(fx.owner, b.id, later(&fx, 9)).await.unwrap().new_event;

        svc.delete(fx.owner, a.id).await.unwrap();

        let b = fx.access().load_event(b.id).await.unwrap();
        let c = fx.access().load_event(c.id).await.unwrap();
        assert!(b.is_root());
        assert_eq!(b.previous_event_id, None);
        assert_eq!(c.original_event_id, Some(b.id));
        assert_eq!(svc.original_event(&c).await.unwrap().id, b.id);
        let ids: Vec<Uuid> = svc.postponement_history(&c).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b.id, c.id]);
    }

    #[tokio::test]
    async fn deleting_middle_row_bridges_the_chain() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();
        let b = svc.postpone(fx.owner, a.id, later(&fx, 5)).await.unwrap().new_event;
        fx.clock.advance(Duration::minutes(1));
        let c = svc.postpone(fx.owner, b.id, later(&fx, 9)).await.unwrap().new_event;

        svc.delete(fx.owner, b.id).await.unwrap();

        let c = fx.access().load_event(c.id).await.unwrap();
        assert_eq!(c.previous_event_id, Some(a.id));
        assert_eq!(svc.postponement_count(&a).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn history_view_reports_branches() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        let svc = fx.postponement();
        svc.postpone(fx.owner, a.id, later(&fx, 5)).await.unwrap();

        // A second successor of A written directly, as a legacy import might
        let a_row = fx.access().load_event(a.id).await.unwrap();
        fx.clock.advance(Duration::minutes(1));
        let stray = a_row.successor(&PostponeRequest {
            new_start: fx.now() + Duration::days(7),
            new_end: None,
            reason: String::new(),
            actor: fx.owner,
            at: fx.now(),
        });
        fx.state.store.insert_event(&stray).await.unwrap();

        let view = svc.history(fx.owner, a.id).await.unwrap();
        assert_eq!(view.history.len(), 3);
        assert_eq!(view.total_postponements, 2);
        assert_eq!(view.branch_points, vec![a.id]);
        assert_eq!(view.latest_event_id, stray.id);
    }

    #[tokio::test]
    async fn history_of_invisible_event_is_not_found() {
        let fx = Fixture::new();
        let case = fx.case(fx.owner).await;
        let a = fx.event(&case, fx.owner, Duration::days(2)).await;
        assert!(matches!(
            fx.postponement().history(Uuid::new_v4(), a.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
