//! Access resolution. Ownership first, then the grant table; everything
//! that mutates a case passes through [`AccessService::require_level`].

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::database::models::{AccessGrant, CalendarEvent, Case, GrantLevel, Level, NewGrant};
use crate::services::{AccessDenial, ServiceError, ServiceResult};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct GrantRequest {
    pub user_id: Uuid,
    pub access_level: GrantLevel,
}

#[derive(Clone)]
pub struct AccessService {
    state: AppState,
}

impl AccessService {
    pub fn new(state: &AppState) -> Self {
        Self { state: state.clone() }
    }

    /// Effective level of `user` on `case`, or `None`
    pub async fn resolve_access(&self, user: Uuid, case: &Case) -> ServiceResult<Option<Level>> {
        if case.owner_id == user {
            return Ok(Some(Level::Owner));
        }
        let grant = self.state.store.find_grant(case.id, user).await?;
        Ok(grant.map(|g| g.access_level.into()))
    }

    pub async fn require_level(&self, user: Uuid, case: &Case, allowed: &[Level]) -> ServiceResult<Level> {
        match self.resolve_access(user, case).await? {
            None => Err(ServiceError::AccessDenied(AccessDenial::NoAccess)),
            Some(level) if allowed.contains(&level) => Ok(level),
            Some(_) => Err(ServiceError::AccessDenied(AccessDenial::InsufficientLevel)),
        }
    }

    pub async fn load_case(&self, case_id: Uuid) -> ServiceResult<Case> {
        self.state
            .store
            .get_case(case_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Case"))
    }

    /// Case the user can see at all; invisible cases read as missing
    pub async fn visible_case(&self, user: Uuid, case_id: Uuid) -> ServiceResult<(Case, Level)> {
        let case = self.load_case(case_id).await?;
        match self.resolve_access(user, &case).await? {
            Some(level) => Ok((case, level)),
            None => Err(ServiceError::not_found("Case")),
        }
    }

    /// Load a case and gate it in one step
    pub async fn case_for(&self, user: Uuid, case_id: Uuid, allowed: &[Level]) -> ServiceResult<(Case, Level)> {
        let case = self.load_case(case_id).await?;
        let level = self.require_level(user, &case, allowed).await?;
        Ok((case, level))
    }

    pub async fn load_event(&self, event_id: Uuid) -> ServiceResult<CalendarEvent> {
        self.state
            .store
            .get_event(event_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Event"))
    }

    /// Event on a case the user can see; invisible events read as missing
    pub async fn visible_event(&self, user: Uuid, event_id: Uuid) -> ServiceResult<(CalendarEvent, Case, Level)> {
        let event = self.load_event(event_id).await?;
        let case = self.load_case(event.case_id).await?;
        match self.resolve_access(user, &case).await? {
            Some(level) => Ok((event, case, level)),
            None => Err(ServiceError::not_found("Event")),
        }
    }

    /// Gate for event mutations: `SCHEDULE`, or the event's creator while
    /// they keep any access to the case
    pub async fn require_event_control(&self, user: Uuid, event: &CalendarEvent) -> ServiceResult<(Case, Level)> {
        let case = self.load_case(event.case_id).await?;
        let allowed = if event.created_by == user { Level::ANY } else { Level::SCHEDULE };
        let level = self.require_level(user, &case, allowed).await?;
        Ok((case, level))
    }

    /// Owned cases plus granted ones, optionally only grants of `levels`
    pub async fn accessible_case_ids(&self, user: Uuid, levels: Option<&[GrantLevel]>) -> ServiceResult<Vec<Uuid>> {
        let mut ids = self.state.store.owned_case_ids(user).await?;
        for id in self.state.store.granted_case_ids(user, levels).await? {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub async fn list_grants(&self, actor: Uuid, case_id: Uuid) -> ServiceResult<Vec<AccessGrant>> {
        let (case, _) = self.visible_case(actor, case_id).await?;
        Ok(self.state.store.list_grants(case.id).await?)
    }

    pub async fn grant(&self, actor: Uuid, case_id: Uuid, request: GrantRequest) -> ServiceResult<AccessGrant> {
        let (case, _) = self.case_for(actor, case_id, Level::OWNER).await?;
        if request.user_id == case.owner_id {
            return Err(ServiceError::field("user_id", "The case owner already has full access"));
        }

        let grant = NewGrant {
            case_id: case.id,
            user_id: request.user_id,
            access_level: request.access_level,
            granted_by: actor,
            granted_at: self.state.now(),
        }
        .into_grant();
        self.state.store.insert_grant(&grant).await?;

        info!(case_id = %case.id, user_id = %grant.user_id, level = %grant.access_level, "Access granted");
        Ok(grant)
    }

    pub async fn revoke(&self, actor: Uuid, case_id: Uuid, grant_id: Uuid) -> ServiceResult<()> {
        let (case, _) = self.case_for(actor, case_id, Level::OWNER).await?;
        if !self.state.store.delete_grant(case.id, grant_id).await? {
            return Err(ServiceError::not_found("Access grant"));
        }
        info!(case_id = %case.id, grant_id = %grant_id, "Access revoked");
        Ok(())
    }
}
