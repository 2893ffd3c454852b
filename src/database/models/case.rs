use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use super::text_column;

crate::text_enum! {
    pub enum CaseType {
        Civil => "civil",
        Administrative => "administrative",
        Criminal => "criminal",
        Arbitration => "arbitration",
        Bankruptcy => "bankruptcy",
    }
}

crate::text_enum! {
    pub enum CourtInstance {
        First => "first",
        Appeal => "appeal",
        Cassation => "cassation",
        Supervisory => "supervisory",
    }
}

crate::text_enum! {
    pub enum CaseStatus {
        Accepted => "accepted",
        Scheduled => "scheduled",
        Hearing => "hearing",
        Decided => "decided",
        AppealFiled => "appeal_filed",
        Final => "final",
        Execution => "execution",
        Closed => "closed",
    }
}

crate::text_enum! {
    /// Which side of the case the practitioner represents
    pub enum ClientRole {
        Plaintiff => "plaintiff",
        Defendant => "defendant",
        ThirdParty => "third_party",
        Other => "other",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub court_id: Uuid,
    pub case_number: String,
    pub case_type: CaseType,
    pub court_instance: CourtInstance,
    pub subject_matter: String,
    pub claim_amount: Option<Decimal>,
    pub status: CaseStatus,
    pub received_date: NaiveDate,
    pub judge_name: String,
    pub plaintiff: String,
    pub defendant: String,
    pub third_party: String,
    pub client_role: ClientRole,
    pub subcategory: String,
    pub description: String,
    pub notes: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new case; the owner is always the acting user
#[derive(Debug, Clone, Deserialize)]
pub struct NewCase {
    pub court_id: Uuid,
    pub case_number: String,
    pub case_type: CaseType,
    pub court_instance: CourtInstance,
    pub subject_matter: String,
    #[serde(default)]
    pub claim_amount: Option<Decimal>,
    pub status: CaseStatus,
    pub received_date: NaiveDate,
    pub judge_name: String,
    pub plaintiff: String,
    pub defendant: String,
    #[serde(default)]
    pub third_party: String,
    pub client_role: ClientRole,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub notes: String,
}

impl NewCase {
    pub fn into_case(self, owner_id: Uuid, now: DateTime<Utc>) -> Case {
        Case {
            id: Uuid::new_v4(),
            court_id: self.court_id,
            case_number: self.case_number,
            case_type: self.case_type,
            court_instance: self.court_instance,
            subject_matter: self.subject_matter,
            claim_amount: self.claim_amount,
            status: self.status,
            received_date: self.received_date,
            judge_name: self.judge_name,
            plaintiff: self.plaintiff,
            defendant: self.defendant,
            third_party: self.third_party,
            client_role: self.client_role,
            subcategory: self.subcategory,
            description: self.description,
            notes: self.notes,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CasePatch {
    pub court_id: Option<Uuid>,
    pub case_number: Option<String>,
    pub case_type: Option<CaseType>,
    pub court_instance: Option<CourtInstance>,
    pub subject_matter: Option<String>,
    pub claim_amount: Option<Decimal>,
    pub status: Option<CaseStatus>,
    pub received_date: Option<NaiveDate>,
    pub judge_name: Option<String>,
    pub plaintiff: Option<String>,
    pub defendant: Option<String>,
    pub third_party: Option<String>,
    pub client_role: Option<ClientRole>,
    pub subcategory: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

impl CasePatch {
    pub fn apply(self, case: &mut Case, now: DateTime<Utc>) {
        if let Some(v) = self.court_id { case.court_id = v; }
        if let Some(v) = self.case_number { case.case_number = v; }
        if let Some(v) = self.case_type { case.case_type = v; }
        if let Some(v) = self.court_instance { case.court_instance = v; }
        if let Some(v) = self.subject_matter { case.subject_matter = v; }
        if let Some(v) = self.claim_amount { case.claim_amount = Some(v); }
        if let Some(v) = self.status { case.status = v; }
        if let Some(v) = self.received_date { case.received_date = v; }
        if let Some(v) = self.judge_name { case.judge_name = v; }
        if let Some(v) = self.plaintiff { case.plaintiff = v; }
        if let Some(v) = self.defendant { case.defendant = v; }
        if let Some(v) = self.third_party { case.third_party = v; }
        if let Some(v) = self.client_role { case.client_role = v; }
        if let Some(v) = self.subcategory { case.subcategory = v; }
        if let Some(v) = self.description { case.description = v; }
        if let Some(v) = self.notes { case.notes = v; }
        case.updated_at = now;
    }
}

/// List filters for `GET /api/cases`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseFilter {
    #[serde(rename = "type")]
    pub case_type: Option<CaseType>,
    pub status: Option<CaseStatus>,
    pub search: Option<String>,
    #[serde(default)]
    pub only_owned: bool,
}

impl CaseFilter {
    /// Case-insensitive match on number, subject and parties
    pub fn matches_search(&self, case: &Case) -> bool {
        let Some(needle) = self.search.as_deref().map(str::to_lowercase) else {
            return true;
        };
        [&case.case_number, &case.subject_matter, &case.plaintiff, &case.defendant]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

impl<'r> FromRow<'r, PgRow> for Case {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            court_id: row.try_get("court_id")?,
            case_number: row.try_get("case_number")?,
            case_type: text_column(row, "case_type")?,
            court_instance: text_column(row, "court_instance")?,
            subject_matter: row.try_get("subject_matter")?,
            claim_amount: row.try_get("claim_amount")?,
            status: text_column(row, "status")?,
            received_date: row.try_get("received_date")?,
            judge_name: row.try_get("judge_name")?,
            plaintiff: row.try_get("plaintiff")?,
            defendant: row.try_get("defendant")?,
            third_party: row.try_get("third_party")?,
            client_role: text_column(row, "client_role")?,
            subcategory: row.try_get("subcategory")?,
            description: row.try_get("description")?,
            notes: row.try_get("notes")?,
            owner_id: row.try_get("owner_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
