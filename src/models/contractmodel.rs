use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Draft,
    PendingFunding,
    Active,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    PartiallyCompleted,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "assignment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Auto,
    Manual,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "contract_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "commission_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    Percentage,
    FixedAmount,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "billing_cycle", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Hourly,
    Weekly,
    Monthly,
}

impl BillingCycle {
    pub fn to_str(&self) -> &str {
        match self {
            BillingCycle::Hourly => "hourly",
            BillingCycle::Weekly => "weekly",
            BillingCycle::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub status: JobStatus,
    pub assignment_type: AssignmentType,
    pub parent_job_id: Option<Uuid>, // set on the re-shared remainder of another job
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contract {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_application_id: Option<Uuid>,
    pub hired_user_id: Uuid,
    pub parent_contract_id: Option<Uuid>,
    pub status: ContractStatus,
    pub gross_amount: i64, // minor units
    pub billing_cycle: BillingCycle,
    pub platform_commission_percent: Option<BigDecimal>,
    pub platform_commission_amount: Option<i64>,
    pub commission_type: Option<CommissionType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    pub fn commission_override(&self) -> CommissionOverride {
        CommissionOverride {
            commission_type: self.commission_type,
            percent: self.platform_commission_percent.clone(),
            amount: self.platform_commission_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubContractLink {
    pub id: Uuid,
    pub root_contract_id: Uuid,
    pub parent_contract_id: Uuid,
    pub sub_contract_id: Uuid,
    pub reshared_job_id: Uuid,
    pub split_percentage: BigDecimal,
    pub split_amount: i64,
    pub platform_commission_percent: Option<BigDecimal>,
    pub platform_commission_amount: Option<i64>,
    pub commission_type: Option<CommissionType>,
    pub created_at: DateTime<Utc>,
}

impl SubContractLink {
    pub fn commission_override(&self) -> CommissionOverride {
        CommissionOverride {
            commission_type: self.commission_type,
            percent: self.platform_commission_percent.clone(),
            amount: self.platform_commission_amount,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleCommissionPolicy {
    pub id: Uuid,
    pub role_id: Uuid,
    pub billing_cycle: BillingCycle,
    pub platform_commission_percent: Option<BigDecimal>,
    pub platform_commission_amount: Option<i64>,
    pub commission_type: CommissionType,
}

/// Commission fields carried by a contract or a sub-contract link. Only
/// meaningful when `commission_type` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommissionOverride {
    pub commission_type: Option<CommissionType>,
    pub percent: Option<BigDecimal>,
    pub amount: Option<i64>,
}

impl CommissionOverride {
    pub fn is_set(&self) -> bool {
        self.commission_type.is_some()
    }
}

/// Everything the store needs to persist a re-share atomically. The split
/// amount is decided inside the store transaction, under the reshared job lock.
#[derive(Debug, Clone)]
pub struct NewSubContract {
    pub root_contract_id: Uuid,
    pub parent_contract: Contract,
    pub reshared_job_id: Uuid,
    pub split_percentage: BigDecimal,
    pub split_bps: i64,
    pub recipient_user_id: Uuid,
    pub commission: CommissionOverride,
}
