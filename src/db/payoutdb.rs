// db/payoutdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::db::{DBClient, CONTRACT_COLUMNS, ESCROW_COLUMNS, INSPECTION_COLUMNS, PAYOUT_COLUMNS, WALLET_TRANSACTION_COLUMNS};
use super::escrowdb::update_escrow_status;
use super::{PayoutExt, WalletExt};
use crate::models::{
    contractmodel::Contract,
    escrowmodel::{Escrow, EscrowStatus},
    inspectionmodel::TripInspection,
    payoutmodel::*,
    walletmodels::WalletTransaction,
};
use crate::service::{
    error::ServiceError,
    escrow_service::plan_transition,
    inspection_service::check_payout_readiness,
    payout_service::{check_escrow_covers, check_transfer_allowed, check_tree_unchanged},
};

#[async_trait]
impl PayoutExt for DBClient {
    async fn create_payouts(
        &self,
        root_contract_id: Uuid,
        escrow_id: Uuid,
        tree_contract_ids: &[Uuid],
        tree_link_ids: &[Uuid],
        drafts: Vec<PayoutDraft>,
    ) -> Result<(Vec<ContractPayout>, bool), ServiceError> {
        let mut tx = self.pool.begin().await?;

        // The escrow row lock serializes concurrent prepares for the same tree.
        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {} FROM escrows WHERE id = $1 FOR UPDATE",
            ESCROW_COLUMNS
        ))
        .bind(escrow_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::EscrowNotFound(escrow_id))?;

        let existing = sqlx::query_as::<_, ContractPayout>(&format!(
            "SELECT {} FROM contract_payouts WHERE root_contract_id = $1 ORDER BY created_at ASC, id ASC",
            PAYOUT_COLUMNS
        ))
        .bind(root_contract_id)
        .fetch_all(&mut *tx)
        .await?;

        if !existing.is_empty() {
            tx.commit().await?;
            return Ok((existing, false));
        }

        let root = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {} FROM contracts WHERE id = $1",
            CONTRACT_COLUMNS
        ))
        .bind(root_contract_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::ContractNotFound(root_contract_id))?;

        check_escrow_covers(&escrow, root.gross_amount).map_err(|reason| {
            ServiceError::NotReadyForPayout {
                contract_id: root_contract_id,
                reason,
            }
        })?;

        // Re-shares take the escrow lock too, so this is the committed tree.
        let committed_link_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM sub_contracts WHERE root_contract_id = $1",
        )
        .bind(root_contract_id)
        .fetch_all(&mut *tx)
        .await?;

        check_tree_unchanged(root_contract_id, tree_link_ids, &committed_link_ids)?;

        let inspections = sqlx::query_as::<_, TripInspection>(&format!(
            "SELECT {} FROM trip_inspections WHERE contract_id = ANY($1)",
            INSPECTION_COLUMNS
        ))
        .bind(tree_contract_ids)
        .fetch_all(&mut *tx)
        .await?;

        check_payout_readiness(&inspections).map_err(|reason| ServiceError::NotReadyForPayout {
            contract_id: root_contract_id,
            reason,
        })?;

        let mut payouts = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let payout = sqlx::query_as::<_, ContractPayout>(&format!(
                r#"
                INSERT INTO contract_payouts
                    (contract_id, root_contract_id, escrow_id, user_id, gross_share,
                     commission_amount, amount, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
                RETURNING {}
                "#,
                PAYOUT_COLUMNS
            ))
            .bind(draft.contract_id)
            .bind(root_contract_id)
            .bind(escrow.id)
            .bind(draft.user_id)
            .bind(draft.gross_share)
            .bind(draft.commission_amount)
            .bind(draft.amount)
            .fetch_one(&mut *tx)
            .await?;

            payouts.push(payout);
        }

        tx.commit().await?;

        Ok((payouts, true))
    }

    async fn get_payout(&self, payout_id: Uuid) -> Result<Option<ContractPayout>, ServiceError> {
        let payout = sqlx::query_as::<_, ContractPayout>(&format!(
            "SELECT {} FROM contract_payouts WHERE id = $1",
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payout)
    }

    async fn list_payouts_for_root(&self, root_contract_id: Uuid) -> Result<Vec<ContractPayout>, ServiceError> {
        let payouts = sqlx::query_as::<_, ContractPayout>(&format!(
            "SELECT {} FROM contract_payouts WHERE root_contract_id = $1 ORDER BY created_at ASC, id ASC",
            PAYOUT_COLUMNS
        ))
        .bind(root_contract_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }

    async fn begin_transfer(&self, payout_id: Uuid) -> Result<Option<ContractPayout>, ServiceError> {
        let Some(escrow_id) = sqlx::query_scalar::<_, Uuid>(
            "SELECT escrow_id FROM contract_payouts WHERE id = $1",
        )
        .bind(payout_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let mut tx = self.pool.begin().await?;

        // Lock order: escrow, then payout. A shared lock lets siblings start
        // together while keeping a refund out.
        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {} FROM escrows WHERE id = $1 FOR SHARE",
            ESCROW_COLUMNS
        ))
        .bind(escrow_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::EscrowNotFound(escrow_id))?;

        let current = sqlx::query_as::<_, ContractPayout>(&format!(
            "SELECT {} FROM contract_payouts WHERE id = $1 FOR UPDATE",
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .fetch_one(&mut *tx)
        .await?;

        if !current.status.can_start_transfer() {
            tx.commit().await?;
            return Ok(None);
        }

        check_transfer_allowed(&escrow)?;

        let payout = sqlx::query_as::<_, ContractPayout>(&format!(
            r#"
            UPDATE contract_payouts
            SET status = 'transferring',
                attempts = attempts + 1,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(payout))
    }

    async fn complete_transfer(
        &self,
        payout_id: Uuid,
        transfer_id: String,
    ) -> Result<TransferSettlement, ServiceError> {
        let escrow_id = sqlx::query_scalar::<_, Uuid>("SELECT escrow_id FROM contract_payouts WHERE id = $1")
            .bind(payout_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::PayoutNotFound(payout_id))?;

        let mut tx = self.pool.begin().await?;

        // Lock order: escrow, then payout.
        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {} FROM escrows WHERE id = $1 FOR UPDATE",
            ESCROW_COLUMNS
        ))
        .bind(escrow_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::EscrowNotFound(escrow_id))?;

        let payout = sqlx::query_as::<_, ContractPayout>(&format!(
            "SELECT {} FROM contract_payouts WHERE id = $1 FOR UPDATE",
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::PayoutNotFound(payout_id))?;

        match payout.status {
            PayoutStatus::Transferring | PayoutStatus::Failed => {}
            PayoutStatus::Transferred => {
                let wallet_transaction = sqlx::query_as::<_, WalletTransaction>(&format!(
                    "SELECT {} FROM wallet_transactions WHERE reference_id = $1 AND transaction_type = 'contract_payout'",
                    WALLET_TRANSACTION_COLUMNS
                ))
                .bind(payout.id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    ServiceError::DataIntegrity(format!("payout {} transferred without a wallet entry", payout.id))
                })?;

                tx.commit().await?;
                return Ok(TransferSettlement {
                    payout,
                    wallet_transaction,
                    released_escrow: None,
                });
            }
            PayoutStatus::Pending => {
                return Err(ServiceError::DataIntegrity(format!(
                    "transfer completed for payout {} that was never started",
                    payout.id
                )));
            }
        }

        let wallet_transaction = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            INSERT INTO wallet_transactions
                (user_id, transaction_type, amount, status, reference_id, escrow_id, external_reference)
            VALUES ($1, 'contract_payout', $2, 'processed', $3, $4, $5)
            RETURNING {}
            "#,
            WALLET_TRANSACTION_COLUMNS
        ))
        .bind(payout.user_id)
        .bind(payout.amount)
        .bind(payout.id.to_string())
        .bind(escrow.id)
        .bind(&transfer_id)
        .fetch_one(&mut *tx)
        .await?;

        let payout = sqlx::query_as::<_, ContractPayout>(&format!(
            r#"
            UPDATE contract_payouts
            SET status = 'transferred',
                stripe_transfer_id = $2,
                wallet_transaction_id = $3,
                error_message = NULL,
                transferred_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(payout.id)
        .bind(&transfer_id)
        .bind(wallet_transaction.id)
        .fetch_one(&mut *tx)
        .await?;

        // Read under the escrow lock, so the last sibling to land always sees
        // every other sibling's committed status.
        let outstanding: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM contract_payouts WHERE root_contract_id = $1 AND status <> 'transferred'",
        )
        .bind(payout.root_contract_id)
        .fetch_one(&mut *tx)
        .await?;

        let released_escrow = if outstanding == 0 {
            match plan_transition(&escrow, EscrowStatus::Released) {
                Ok(true) => Some(update_escrow_status(&mut tx, escrow.id, EscrowStatus::Released, None).await?),
                Ok(false) => None,
                Err(e) => {
                    tracing::error!(
                        "All payouts for contract {} transferred but escrow {} cannot be released: {}",
                        payout.root_contract_id,
                        escrow.id,
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        tx.commit().await?;

        Ok(TransferSettlement {
            payout,
            wallet_transaction,
            released_escrow,
        })
    }

    async fn fail_transfer(
        &self,
        payout_id: Uuid,
        attempt: i32,
        message: String,
    ) -> Result<ContractPayout, ServiceError> {
        let failed = sqlx::query_as::<_, ContractPayout>(&format!(
            r#"
            UPDATE contract_payouts
            SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'transferring' AND attempts = $3
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(payout_id)
        .bind(message)
        .bind(attempt)
        .fetch_optional(&self.pool)
        .await?;

        match failed {
            Some(payout) => Ok(payout),
            None => self
                .get_payout(payout_id)
                .await?
                .ok_or(ServiceError::PayoutNotFound(payout_id)),
        }
    }

    async fn fail_stale_transfers(
        &self,
        stale_before: DateTime<Utc>,
        message: String,
    ) -> Result<Vec<ContractPayout>, ServiceError> {
        let payouts = sqlx::query_as::<_, ContractPayout>(&format!(
            r#"
            UPDATE contract_payouts
            SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE status = 'transferring' AND updated_at < $1
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
        .bind(stale_before)
        .bind(message)
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }
}

#[async_trait]
impl WalletExt for DBClient {
    async fn list_wallet_transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError> {
        let transactions = sqlx::query_as::<_, WalletTransaction>(&format!(
            "SELECT {} FROM wallet_transactions WHERE user_id = $1 ORDER BY created_at DESC",
            WALLET_TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn get_wallet_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<WalletTransaction>, ServiceError> {
        let transaction = sqlx::query_as::<_, WalletTransaction>(&format!(
            "SELECT {} FROM wallet_transactions WHERE reference_id = $1 ORDER BY created_at DESC LIMIT 1",
            WALLET_TRANSACTION_COLUMNS
        ))
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }
}
