// service/escrow_service.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::SettlementStore,
    models::{escrowmodel::*, payoutmodel::{ContractPayout, PayoutStatus}},
    service::error::ServiceError,
};

/// Forward-only escrow lifecycle: `pending -> held -> released | refunded`.
pub fn is_valid_transition(from: EscrowStatus, to: EscrowStatus) -> bool {
    match (from, to) {
        (EscrowStatus::Pending, EscrowStatus::Held) => true,
        (EscrowStatus::Held, EscrowStatus::Released) => true,
        (EscrowStatus::Held, EscrowStatus::Refunded) => true,
        _ => false,
    }
}

/// Decides whether a status change has to be written. `Ok(false)` means the
/// escrow already sits in `to` and the request is a no-op.
pub fn plan_transition(escrow: &Escrow, to: EscrowStatus) -> Result<bool, ServiceError> {
    if escrow.status == to {
        return Ok(false);
    }

    if !is_valid_transition(escrow.status, to) {
        return Err(ServiceError::InvalidEscrowTransition {
            escrow_id: escrow.id,
            from: escrow.status,
            to,
        });
    }

    Ok(true)
}

/// Once any payout backed by the escrow has reached the provider, the funds
/// are committed and the escrow can no longer be refunded.
pub fn check_refundable(escrow: &Escrow, payouts: &[ContractPayout]) -> Result<(), ServiceError> {
    let in_flight = payouts.iter().any(|p| {
        p.escrow_id == escrow.id
            && matches!(p.status, PayoutStatus::Transferring | PayoutStatus::Transferred)
    });

    if in_flight {
        return Err(ServiceError::PayoutsInFlight { escrow_id: escrow.id });
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct EscrowLedger {
    db_client: Arc<dyn SettlementStore>,
}

impl EscrowLedger {
    pub fn new(db_client: Arc<dyn SettlementStore>) -> Self {
        Self { db_client }
    }

    /// Records a `pending` escrow for the target. The caller confirms the
    /// external authorization with [`EscrowLedger::confirm_hold`].
    pub async fn fund(&self, target: EscrowTarget, amount: i64) -> Result<Escrow, ServiceError> {
        if amount <= 0 {
            return Err(ServiceError::Validation("Escrow amount must be positive".to_string()));
        }

        match target {
            EscrowTarget::Job(job_id) => {
                self.db_client
                    .get_job(job_id)
                    .await?
                    .ok_or(ServiceError::JobNotFound(job_id))?;
            }
            EscrowTarget::Contract(contract_id) => {
                self.db_client
                    .get_contract(contract_id)
                    .await?
                    .ok_or(ServiceError::ContractNotFound(contract_id))?;
            }
        }

        let escrow = self.db_client.create_escrow(target, amount).await?;

        tracing::info!(escrow_id = %escrow.id, amount, "Escrow funded for {}", target);

        Ok(escrow)
    }

    pub async fn confirm_hold(&self, escrow_id: Uuid) -> Result<Escrow, ServiceError> {
        self.transition(escrow_id, EscrowStatus::Held, None).await
    }

    pub async fn release(&self, escrow_id: Uuid) -> Result<Escrow, ServiceError> {
        self.transition(escrow_id, EscrowStatus::Released, None).await
    }

    pub async fn refund(&self, escrow_id: Uuid, reason: String) -> Result<Escrow, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::Validation("Refund reason is required".to_string()));
        }

        self.transition(escrow_id, EscrowStatus::Refunded, Some(reason)).await
    }

    pub async fn get(&self, escrow_id: Uuid) -> Result<Escrow, ServiceError> {
        self.db_client
            .get_escrow(escrow_id)
            .await?
            .ok_or(ServiceError::EscrowNotFound(escrow_id))
    }

    pub async fn active_for(&self, target: EscrowTarget) -> Result<Option<Escrow>, ServiceError> {
        self.db_client.get_active_escrow(target).await
    }

    async fn transition(
        &self,
        escrow_id: Uuid,
        to: EscrowStatus,
        reason: Option<String>,
    ) -> Result<Escrow, ServiceError> {
        let transition = self.db_client.transition_escrow(escrow_id, to, reason).await?;

        if transition.changed {
            tracing::info!(escrow_id = %escrow_id, "Escrow moved to {}", to.to_str());
        } else {
            tracing::debug!(escrow_id = %escrow_id, "Escrow already {}", to.to_str());
        }

        Ok(transition.escrow)
    }
}
