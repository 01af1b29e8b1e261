use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "escrow_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Pending,
    Held,
    Released,
    Refunded,
}

impl EscrowStatus {
    /// Active escrows block a second funding of the same target.
    pub fn is_active(&self) -> bool {
        matches!(self, EscrowStatus::Pending | EscrowStatus::Held)
    }

    pub fn to_str(&self) -> &str {
        match self {
            EscrowStatus::Pending => "pending",
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EscrowTarget {
    Job(Uuid),
    Contract(Uuid),
}

impl EscrowTarget {
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            EscrowTarget::Job(id) => Some(*id),
            EscrowTarget::Contract(_) => None,
        }
    }

    pub fn contract_id(&self) -> Option<Uuid> {
        match self {
            EscrowTarget::Contract(id) => Some(*id),
            EscrowTarget::Job(_) => None,
        }
    }
}

impl std::fmt::Display for EscrowTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscrowTarget::Job(id) => write!(f, "job {}", id),
            EscrowTarget::Contract(id) => write!(f, "contract {}", id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Escrow {
    pub id: Uuid,
    pub job_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,
    pub amount: i64, // minor units
    pub status: EscrowStatus,
    pub refund_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub held_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Escrow {
    pub fn target(&self) -> Option<EscrowTarget> {
        match (self.job_id, self.contract_id) {
            (Some(job_id), None) => Some(EscrowTarget::Job(job_id)),
            (None, Some(contract_id)) => Some(EscrowTarget::Contract(contract_id)),
            _ => None,
        }
    }
}

/// Result of a status transition request. `changed` is false when the escrow
/// already sat in the requested status and nothing was written.
#[derive(Debug, Clone, Serialize)]
pub struct EscrowTransition {
    pub escrow: Escrow,
    pub changed: bool,
}
