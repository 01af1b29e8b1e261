use async_trait::async_trait;
use uuid::Uuid;

use super::db::{DBClient, ESCROW_COLUMNS, PAYOUT_COLUMNS};
use super::EscrowExt;
use crate::models::{escrowmodel::*, payoutmodel::ContractPayout};
use crate::service::{
    error::ServiceError,
    escrow_service::{check_refundable, plan_transition},
};

#[async_trait]
impl EscrowExt for DBClient {
    async fn create_escrow(&self, target: EscrowTarget, amount: i64) -> Result<Escrow, ServiceError> {
        let result = sqlx::query_as::<_, Escrow>(&format!(
            r#"
            INSERT INTO escrows (job_id, contract_id, amount, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING {}
            "#,
            ESCROW_COLUMNS
        ))
        .bind(target.job_id())
        .bind(target.contract_id())
        .bind(amount)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(escrow) => Ok(escrow),
            // The partial unique indexes on active escrows reject the second funding.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(ServiceError::AlreadyFunded(target))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_escrow(&self, escrow_id: Uuid) -> Result<Option<Escrow>, ServiceError> {
        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {} FROM escrows WHERE id = $1",
            ESCROW_COLUMNS
        ))
        .bind(escrow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(escrow)
    }

    async fn get_active_escrow(&self, target: EscrowTarget) -> Result<Option<Escrow>, ServiceError> {
        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            r#"
            SELECT {} FROM escrows
            WHERE (job_id = $1 OR contract_id = $2)
              AND status IN ('pending', 'held')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            ESCROW_COLUMNS
        ))
        .bind(target.job_id())
        .bind(target.contract_id())
        .fetch_optional(&self.pool)
        .await?;

        Ok(escrow)
    }

    async fn transition_escrow(
        &self,
        escrow_id: Uuid,
        to: EscrowStatus,
        reason: Option<String>,
    ) -> Result<EscrowTransition, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let escrow = sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {} FROM escrows WHERE id = $1 FOR UPDATE",
            ESCROW_COLUMNS
        ))
        .bind(escrow_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::EscrowNotFound(escrow_id))?;

        if !plan_transition(&escrow, to)? {
            tx.commit().await?;
            return Ok(EscrowTransition { escrow, changed: false });
        }

        if to == EscrowStatus::Refunded {
            let payouts = sqlx::query_as::<_, ContractPayout>(&format!(
                "SELECT {} FROM contract_payouts WHERE escrow_id = $1",
                PAYOUT_COLUMNS
            ))
            .bind(escrow_id)
            .fetch_all(&mut *tx)
            .await?;

            check_refundable(&escrow, &payouts)?;
        }

        let escrow = update_escrow_status(&mut tx, escrow_id, to, reason).await?;

        tx.commit().await?;

        Ok(EscrowTransition { escrow, changed: true })
    }
}

/// Writes the new status and its timestamp. Callers hold the row lock and have
/// already validated the transition.
pub(crate) async fn update_escrow_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    escrow_id: Uuid,
    to: EscrowStatus,
    reason: Option<String>,
) -> Result<Escrow, ServiceError> {
    let escrow = sqlx::query_as::<_, Escrow>(&format!(
        r#"
        UPDATE escrows
        SET status = $2,
            held_at = CASE WHEN $2 = 'held'::escrow_status THEN NOW() ELSE held_at END,
            released_at = CASE WHEN $2 = 'released'::escrow_status THEN NOW() ELSE released_at END,
            refunded_at = CASE WHEN $2 = 'refunded'::escrow_status THEN NOW() ELSE refunded_at END,
            refund_reason = COALESCE($3, refund_reason)
        WHERE id = $1
        RETURNING {}
        "#,
        ESCROW_COLUMNS
    ))
    .bind(escrow_id)
    .bind(to)
    .bind(reason)
    .fetch_one(&mut **tx)
    .await?;

    Ok(escrow)
}
