//! Case and system invitations.
//!
//! Expiry is never written back: every decision here reads
//! `effective_status`/`is_valid` against the injected clock. Each action is
//! logged with an `action` field, which serves as the invitation history.

use chrono::Duration;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::UserRole;
use crate::config::{config, InvitationConfig};
use crate::database::models::{
    normalize_email, AccessGrant, CaseInvitation, CaseInvitationStatus, Level, NewCaseInvitation,
    NewSystemInvitation, SystemInvitation, SystemInvitationStatus,
};
use crate::services::{AccessDenial, AccessService, ServiceError, ServiceResult};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct CaseInvitationView {
    #[serde(flatten)]
    pub invitation: CaseInvitation,
    pub effective_status: CaseInvitationStatus,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInvitationView {
    #[serde(flatten)]
    pub invitation: SystemInvitation,
    pub effective_status: SystemInvitationStatus,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub invitation: CaseInvitation,
    pub grant: AccessGrant,
}

/// The authenticated user responding to or issuing an invitation
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub role: UserRole,
}

fn plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}

#[derive(Clone)]
pub struct InvitationService {
    state: AppState,
    access: AccessService,
    settings: InvitationConfig,
}

impl InvitationService {
    pub fn new(state: &AppState) -> Self {
        Self {
            state: state.clone(),
            access: AccessService::new(state),
            settings: config().invitations.clone(),
        }
    }

    fn case_view(&self, invitation: CaseInvitation) -> CaseInvitationView {
        let now = self.state.now();
        CaseInvitationView {
            effective_status: invitation.effective_status(now),
            is_valid: invitation.is_valid(now),
            invitation,
        }
    }

    fn system_view(&self, invitation: SystemInvitation) -> SystemInvitationView {
        let now = self.state.now();
        SystemInvitationView {
            effective_status: invitation.effective_status(now),
            is_valid: invitation.is_valid(now),
            invitation,
        }
    }

    pub async fn invite(&self, actor: Actor<'_>, case_id: Uuid, input: NewCaseInvitation) -> ServiceResult<CaseInvitationView> {
        let (case, _) = self.access.case_for(actor.id, case_id, Level::OWNER).await?;
        let email = normalize_email(&input.invitee_email);
        if !plausible_email(&email) {
            return Err(ServiceError::field("invitee_email", "Enter a valid email address"));
        }
        if email == normalize_email(actor.email) {
            return Err(ServiceError::field("invitee_email", "You cannot invite yourself"));
        }

        let ttl = Duration::days(self.settings.case_invitation_ttl_days);
        let invitation = input.into_invitation(case.id, actor.id, self.state.now(), ttl);
        let stored = self.state.store.upsert_case_invitation(&invitation).await?;

        info!(
            action = "invited",
            invitation_id = %stored.id,
            case_id = %case.id,
            invitee = %stored.invitee_email,
            level = %stored.access_level,
            "Case invitation issued"
        );
        Ok(self.case_view(stored))
    }

    pub async fn list(&self, actor: Uuid, case_id: Uuid) -> ServiceResult<Vec<CaseInvitationView>> {
        let (case, _) = self.access.case_for(actor, case_id, Level::OWNER).await?;
        let rows = self.state.store.list_case_invitations(case.id).await?;
        Ok(rows.into_iter().map(|i| self.case_view(i)).collect())
    }

    /// Invitation addressed to the actor; any other caller sees nothing
    async fn addressed_invitation(&self, actor: Actor<'_>, token: Uuid) -> ServiceResult<CaseInvitation> {
        match self.state.store.case_invitation_by_token(token).await? {
            Some(invitation) if invitation.is_addressed_to(actor.email) => Ok(invitation),
            _ => Err(ServiceError::not_found("Invitation")),
        }
    }

    fn require_valid(&self, invitation: &CaseInvitation) -> ServiceResult<()> {
        let now = self.state.now();
        if invitation.is_valid(now) {
            Ok(())
        } else {
            Err(ServiceError::invalid_state(format!(
                "Invitation is {}",
                invitation.effective_status(now)
            )))
        }
    }

    pub async fn accept(&self, actor: Actor<'_>, token: Uuid) -> ServiceResult<Acceptance> {
        let invitation = self.addressed_invitation(actor, token).await?;
        let case = self.access.load_case(invitation.case_id).await?;
        if case.owner_id == actor.id {
            return Err(ServiceError::validation("You already own this case"));
        }
        self.require_valid(&invitation)?;

        let (invitation, grant) = self
            .state
            .store
            .accept_case_invitation(token, actor.id, self.state.now())
            .await?;
        info!(
            action = "accepted",
            invitation_id = %invitation.id,
            case_id = %invitation.case_id,
            user_id = %actor.id,
            level = %grant.access_level,
            "Case invitation accepted"
        );
        Ok(Acceptance { invitation, grant })
    }

    pub async fn decline(&self, actor: Actor<'_>, token: Uuid) -> ServiceResult<CaseInvitation> {
        let invitation = self.addressed_invitation(actor, token).await?;
        self.require_valid(&invitation)?;
        let invitation = self
            .state
            .store
            .decline_case_invitation(token, actor.id, self.state.now())
            .await?;
        info!(
            action = "declined",
            invitation_id = %invitation.id,
            case_id = %invitation.case_id,
            user_id = %actor.id,
            "Case invitation declined"
        );
        Ok(invitation)
    }

    pub async fn create_system(&self, actor: Actor<'_>, input: NewSystemInvitation) -> ServiceResult<SystemInvitationView> {
        if actor.role != UserRole::Owner {
            return Err(ServiceError::AccessDenied(AccessDenial::InsufficientLevel));
        }
        if !plausible_email(&normalize_email(&input.invitee_email)) {
            return Err(ServiceError::field("invitee_email", "Enter a valid email address"));
        }
        let ttl = Duration::days(self.settings.system_invitation_ttl_days);
        let invitation = input.into_invitation(actor.id, self.state.now(), ttl);
        self.state.store.insert_system_invitation(&invitation).await?;
        info!(
            action = "invited",
            invitation_id = %invitation.id,
            invitee = %invitation.invitee_email,
            "System invitation issued"
        );
        Ok(self.system_view(invitation))
    }

    /// Public lookup used by the registration page
    pub async fn validate_system(&self, token: Uuid) -> ServiceResult<SystemInvitationView> {
        let invitation = self.load_system(token).await?;
        Ok(self.system_view(invitation))
    }

    pub async fn revoke_system(&self, actor: Uuid, token: Uuid) -> ServiceResult<SystemInvitation> {
        let invitation = self.load_system(token).await?;
        if invitation.inviter_id != actor {
            return Err(ServiceError::AccessDenied(AccessDenial::NoAccess));
        }
        let revoked = self.close_system(&invitation, SystemInvitationStatus::Revoked, None).await?;
        info!(action = "revoked", invitation_id = %revoked.id, "System invitation revoked");
        Ok(revoked)
    }

    /// Consume the invitation once the invitee has registered
    pub async fn mark_system_used(&self, token: Uuid, user_id: Uuid) -> ServiceResult<SystemInvitation> {
        let invitation = self.load_system(token).await?;
        let used = self
            .close_system(&invitation, SystemInvitationStatus::Used, Some(user_id))
            .await?;
        info!(action = "used", invitation_id = %used.id, user_id = %user_id, "System invitation used");
        Ok(used)
    }

    async fn load_system(&self, token: Uuid) -> ServiceResult<SystemInvitation> {
        self.state
            .store
            .system_invitation_by_token(token)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invitation"))
    }

    async fn close_system(
        &self,
        invitation: &SystemInvitation,
        status: SystemInvitationStatus,
        used_by: Option<Uuid>,
    ) -> ServiceResult<SystemInvitation> {
        let now = self.state.now();
        if !invitation.is_valid(now) {
            return Err(ServiceError::invalid_state(format!(
                "Invitation is {}",
                invitation.effective_status(now)
            )));
        }
        Ok(self
            .state
            .store
            .close_system_invitation(invitation.token, status, used_by, now)
            .await?)
    }
}
