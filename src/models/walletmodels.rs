// models/walletmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "wallet_transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionStatus {
    Initial,
    WithdrawalRequested,
    Processing,
    Processed,
    Failed,
    Cancelled,
    PayoutPending,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "wallet_transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    ContractPayout,
    Withdrawal,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: WalletTransactionType,
    pub amount: i64, // minor units
    pub status: WalletTransactionStatus,
    pub reference_id: String, // payout id for contract payouts
    pub escrow_id: Option<Uuid>,
    pub external_reference: Option<String>, // provider transfer id
    pub created_at: DateTime<Utc>,
}
