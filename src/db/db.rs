// db/db.rs
use sqlx::{Pool, Postgres};

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .field("size", &self.pool.size())
            .finish()
    }
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}

pub(crate) const CONTRACT_COLUMNS: &str = r#"
    id, job_id, job_application_id, hired_user_id, parent_contract_id, status,
    gross_amount, billing_cycle, platform_commission_percent, platform_commission_amount,
    commission_type, start_date, end_date, next_billing_date, created_at
"#;

pub(crate) const SUB_CONTRACT_COLUMNS: &str = r#"
    id, root_contract_id, parent_contract_id, sub_contract_id, reshared_job_id,
    split_percentage, split_amount, platform_commission_percent, platform_commission_amount,
    commission_type, created_at
"#;

pub(crate) const ESCROW_COLUMNS: &str = r#"
    id, job_id, contract_id, amount, status, refund_reason, created_at,
    held_at, released_at, refunded_at
"#;

pub(crate) const INSPECTION_COLUMNS: &str = r#"
    id, contract_id, inspection_type, driver_user_id, status, data, defects,
    photos, pod_photo, started_at, completed_at, submitted_at
"#;

pub(crate) const PAYOUT_COLUMNS: &str = r#"
    id, contract_id, root_contract_id, escrow_id, user_id, gross_share,
    commission_amount, amount, status, stripe_transfer_id, error_message,
    wallet_transaction_id, attempts, created_at, updated_at, transferred_at
"#;

pub(crate) const WALLET_TRANSACTION_COLUMNS: &str = r#"
    id, user_id, transaction_type, amount, status, reference_id, escrow_id,
    external_reference, created_at
"#;
