use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::database::models::{
    Case, CaseFilter, CasePatch, Level, NewCase, NewDispute, DisputePatch, SeparateDispute,
};
use crate::services::{AccessService, ServiceError, ServiceResult};
use crate::state::AppState;

/// Case with the caller's relationship to it
#[derive(Debug, Clone, Serialize)]
pub struct CaseDetail {
    #[serde(flatten)]
    pub case: Case,
    pub access_level: Level,
    pub is_owner: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CaseStats {
    pub owned: usize,
    pub shared: usize,
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Clone)]
pub struct CaseService {
    state: AppState,
    access: AccessService,
}

impl CaseService {
    pub fn new(state: &AppState) -> Self {
        Self { state: state.clone(), access: AccessService::new(state) }
    }

    pub async fn create(&self, actor: Uuid, input: NewCase) -> ServiceResult<Case> {
        if input.case_number.trim().is_empty() {
            return Err(ServiceError::field("case_number", "Case number is required"));
        }
        let case = input.into_case(actor, self.state.now());
        self.state.store.insert_case(&case).await?;
        info!(case_id = %case.id, case_number = %case.case_number, owner = %actor, "Case created");
        Ok(case)
    }

    pub async fn list(&self, actor: Uuid, filter: &CaseFilter) -> ServiceResult<Vec<Case>> {
        let ids = if filter.only_owned {
            self.state.store.owned_case_ids(actor).await?
        } else {
            self.access.accessible_case_ids(actor, None).await?
        };
        Ok(self.state.store.list_cases(&ids, filter).await?)
    }

    pub async fn detail(&self, actor: Uuid, case_id: Uuid) -> ServiceResult<CaseDetail> {
        let (case, level) = self.access.visible_case(actor, case_id).await?;
        Ok(CaseDetail { is_owner: case.owner_id == actor, access_level: level, case })
    }

    pub async fn update(&self, actor: Uuid, case_id: Uuid, patch: CasePatch) -> ServiceResult<Case> {
        let (mut case, _) = self.access.case_for(actor, case_id, Level::MANAGE).await?;
        patch.apply(&mut case, self.state.now());
        if case.case_number.trim().is_empty() {
            return Err(ServiceError::field("case_number", "Case number is required"));
        }
        self.state.store.update_case(&case).await?;
        Ok(case)
    }

    pub async fn delete(&self, actor: Uuid, case_id: Uuid) -> ServiceResult<()> {
        let (case, _) = self.access.case_for(actor, case_id, Level::MANAGE).await?;
        if !self.state.store.delete_case(case.id).await? {
            return Err(ServiceError::not_found("Case"));
        }
        info!(case_id = %case.id, actor = %actor, "Case deleted");
        Ok(())
    }

    pub async fn stats(&self, actor: Uuid) -> ServiceResult<CaseStats> {
        let owned_ids = self.state.store.owned_case_ids(actor).await?;
        let all_ids = self.access.accessible_case_ids(actor, None).await?;
        let owned = self.state.store.list_cases(&owned_ids, &CaseFilter::default()).await?;

        let mut stats = CaseStats {
            owned: owned.len(),
            shared: all_ids.len() - owned_ids.len(),
            total: all_ids.len(),
            ..CaseStats::default()
        };
        for case in &owned {
            *stats.by_status.entry(case.status.to_string()).or_default() += 1;
            *stats.by_type.entry(case.case_type.to_string()).or_default() += 1;
        }
        Ok(stats)
    }

    pub async fn list_disputes(&self, actor: Uuid, case_id: Uuid) -> ServiceResult<Vec<SeparateDispute>> {
        let (case, _) = self.access.visible_case(actor, case_id).await?;
        Ok(self.state.store.list_disputes(case.id).await?)
    }

    pub async fn dispute(&self, actor: Uuid, case_id: Uuid, dispute_id: Uuid) -> ServiceResult<SeparateDispute> {
        let (case, _) = self.access.visible_case(actor, case_id).await?;
        self.load_dispute(&case, dispute_id).await
    }

    pub async fn create_dispute(&self, actor: Uuid, case_id: Uuid, input: NewDispute) -> ServiceResult<SeparateDispute> {
        let (case, _) = self.access.case_for(actor, case_id, Level::MANAGE).await?;
        if input.name.trim().is_empty() {
            return Err(ServiceError::field("name", "Dispute name is required"));
        }
        let dispute = input.into_dispute(case.id, self.state.now());
        self.state.store.insert_dispute(&dispute).await?;
        Ok(dispute)
    }

    pub async fn update_dispute(
        &self,
        actor: Uuid,
        case_id: Uuid,
        dispute_id: Uuid,
        patch: DisputePatch,
    ) -> ServiceResult<SeparateDispute> {
        let (case, _) = self.access.case_for(actor, case_id, Level::MANAGE).await?;
        let mut dispute = self.load_dispute(&case, dispute_id).await?;
        patch.apply(&mut dispute, self.state.now());
        self.state.store.update_dispute(&dispute).await?;
        Ok(dispute)
    }

    pub async fn delete_dispute(&self, actor: Uuid, case_id: Uuid, dispute_id: Uuid) -> ServiceResult<()> {
        let (case, _) = self.access.case_for(actor, case_id, Level::MANAGE).await?;
        let dispute = self.load_dispute(&case, dispute_id).await?;
        self.state.store.delete_dispute(dispute.id).await?;
        Ok(())
    }

    /// Dispute of this case; a dispute of another case reads as missing
    async fn load_dispute(&self, case: &Case, dispute_id: Uuid) -> ServiceResult<SeparateDispute> {
        match self.state.store.get_dispute(dispute_id).await? {
            Some(dispute) if dispute.case_id == case.id => Ok(dispute),
            _ => Err(ServiceError::not_found("Dispute")),
        }
    }
}
