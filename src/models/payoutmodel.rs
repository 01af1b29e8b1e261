use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{escrowmodel::Escrow, walletmodels::WalletTransaction};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Transferring,
    Transferred,
    Failed,
}

impl PayoutStatus {
    /// `failed` is re-drivable, so it counts as startable alongside `pending`.
    pub fn can_start_transfer(&self) -> bool {
        matches!(self, PayoutStatus::Pending | PayoutStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContractPayout {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub root_contract_id: Uuid,
    pub escrow_id: Uuid,
    pub user_id: Uuid,
    pub gross_share: i64,
    pub commission_amount: i64,
    pub amount: i64,
    pub status: PayoutStatus,
    pub stripe_transfer_id: Option<String>,
    pub error_message: Option<String>,
    pub wallet_transaction_id: Option<Uuid>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transferred_at: Option<DateTime<Utc>>,
}

/// A payout row computed from the contract tree, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutDraft {
    pub contract_id: Uuid,
    pub user_id: Uuid,
    pub gross_share: i64,
    pub commission_amount: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferSettlement {
    pub payout: ContractPayout,
    pub wallet_transaction: WalletTransaction,
    pub released_escrow: Option<Escrow>,
}
