use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use super::text_column;

crate::text_enum! {
    pub enum DisputeStatus {
        Separated => "separated",
        Scheduled => "scheduled",
        Hearing => "hearing",
        Decided => "decided",
        Closed => "closed",
    }
}

/// A separate dispute carved out of a (bankruptcy) case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparateDispute {
    pub id: Uuid,
    pub case_id: Uuid,
    pub name: String,
    pub determination_number: String,
    pub amount: Option<Decimal>,
    pub plaintiff: String,
    pub defendant: String,
    pub status: DisputeStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDispute {
    pub name: String,
    #[serde(default)]
    pub determination_number: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub plaintiff: String,
    pub defendant: String,
    pub status: DisputeStatus,
    #[serde(default)]
    pub description: String,
}

impl NewDispute {
    pub fn into_dispute(self, case_id: Uuid, now: DateTime<Utc>) -> SeparateDispute {
        SeparateDispute {
            id: Uuid::new_v4(),
            case_id,
            name: self.name,
            determination_number: self.determination_number,
            amount: self.amount,
            plaintiff: self.plaintiff,
            defendant: self.defendant,
            status: self.status,
            description: self.description,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisputePatch {
    pub name: Option<String>,
    pub determination_number: Option<String>,
    pub amount: Option<Decimal>,
    pub plaintiff: Option<String>,
    pub defendant: Option<String>,
    pub status: Option<DisputeStatus>,
    pub description: Option<String>,
}

impl DisputePatch {
    pub fn apply(self, dispute: &mut SeparateDispute, now: DateTime<Utc>) {
        if let Some(v) = self.name { dispute.name = v; }
        if let Some(v) = self.determination_number { dispute.determination_number = v; }
        if let Some(v) = self.amount { dispute.amount = Some(v); }
        if let Some(v) = self.plaintiff { dispute.plaintiff = v; }
        if let Some(v) = self.defendant { dispute.defendant = v; }
        if let Some(v) = self.status { dispute.status = v; }
        if let Some(v) = self.description { dispute.description = v; }
        dispute.updated_at = now;
    }
}

impl<'r> FromRow<'r, PgRow> for SeparateDispute {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            case_id: row.try_get("case_id")?,
            name: row.try_get("name")?,
            determination_number: row.try_get("determination_number")?,
            amount: row.try_get("amount")?,
            plaintiff: row.try_get("plaintiff")?,
            defendant: row.try_get("defendant")?,
            status: text_column(row, "status")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
