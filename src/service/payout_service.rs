// service/payout_service.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::SettlementStore,
    models::{
        escrowmodel::{Escrow, EscrowStatus, EscrowTarget},
        payoutmodel::*,
    },
    service::{
        contract_graph::{ContractGraph, ContractNode},
        error::ServiceError,
        escrow_service::EscrowLedger,
        payment_provider::{AccountRegistry, TransferProvider},
    },
    utils::{currency::format_minor_units, retry::{retry_transient, RetryPolicy}},
};

/// The escrow backing a payout set must be held and cover the root's gross.
pub fn check_escrow_covers(escrow: &Escrow, required_amount: i64) -> Result<(), String> {
    if escrow.status != EscrowStatus::Held {
        return Err(format!("escrow {} is {}, not held", escrow.id, escrow.status.to_str()));
    }

    if escrow.amount < required_amount {
        return Err(format!(
            "escrow {} holds {} but the contract is worth {}",
            escrow.id,
            format_minor_units(escrow.amount),
            format_minor_units(required_amount)
        ));
    }

    Ok(())
}

/// Transfers only leave against a held escrow.
pub fn check_transfer_allowed(escrow: &Escrow) -> Result<(), ServiceError> {
    if escrow.status != EscrowStatus::Held {
        return Err(ServiceError::EscrowNotHeld {
            escrow_id: escrow.id,
            status: escrow.status,
        });
    }

    Ok(())
}

/// The links committed for the root must be exactly the ones the drafts were
/// computed from.
pub fn check_tree_unchanged(
    root_contract_id: Uuid,
    planned_link_ids: &[Uuid],
    committed_link_ids: &[Uuid],
) -> Result<(), ServiceError> {
    let planned: HashSet<&Uuid> = planned_link_ids.iter().collect();
    let committed: HashSet<&Uuid> = committed_link_ids.iter().collect();

    if planned != committed {
        return Err(ServiceError::PayoutTreeChanged { root_contract_id });
    }

    Ok(())
}

/// One draft per node with a positive net amount.
pub fn payout_drafts(tree: &ContractNode) -> Result<Vec<PayoutDraft>, ServiceError> {
    let mut drafts = Vec::new();

    for node in tree.nodes() {
        if node.net_amount < 0 {
            return Err(ServiceError::Validation(format!(
                "Commission of {} exceeds the {} share on contract {}",
                format_minor_units(node.commission_amount),
                format_minor_units(node.retained_amount),
                node.contract.id
            )));
        }

        if node.net_amount == 0 {
            continue;
        }

        drafts.push(PayoutDraft {
            contract_id: node.contract.id,
            user_id: node.contract.hired_user_id,
            gross_share: node.retained_amount,
            commission_amount: node.commission_amount,
            amount: node.net_amount,
        });
    }

    if drafts.is_empty() {
        return Err(ServiceError::Validation(format!(
            "Contract tree {} produces no positive payout",
            tree.contract.id
        )));
    }

    Ok(drafts)
}

#[derive(Debug, Clone)]
pub struct PayoutEngine {
    db_client: Arc<dyn SettlementStore>,
    graph: ContractGraph,
    escrow_ledger: EscrowLedger,
    provider: Arc<dyn TransferProvider>,
    accounts: Arc<dyn AccountRegistry>,
    retry_policy: RetryPolicy,
}

impl PayoutEngine {
    pub fn new(
        db_client: Arc<dyn SettlementStore>,
        provider: Arc<dyn TransferProvider>,
        accounts: Arc<dyn AccountRegistry>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            graph: ContractGraph::new(db_client.clone()),
            escrow_ledger: EscrowLedger::new(db_client.clone()),
            db_client,
            provider,
            accounts,
            retry_policy,
        }
    }

    /// Creates the pending payout set for the tree containing `contract_id`.
    /// An existing set is returned unchanged.
    pub async fn prepare_payouts(&self, contract_id: Uuid) -> Result<Vec<ContractPayout>, ServiceError> {
        let root = self.graph.root_of(contract_id).await?;

        let existing = self.db_client.list_payouts_for_root(root.id).await?;
        if !existing.is_empty() {
            tracing::debug!(root_contract_id = %root.id, "Payouts already prepared");
            return Ok(existing);
        }

        let escrow = self.backing_escrow(root.id, root.job_id).await?;
        let tree = self.graph.resolve_tree(root.id).await?;
        let drafts = payout_drafts(&tree)?;
        let contract_ids = tree.contract_ids();
        let link_ids = tree.link_ids();

        let (payouts, created) = retry_transient(&self.retry_policy, "create_payouts", || {
            self.db_client
                .create_payouts(root.id, escrow.id, &contract_ids, &link_ids, drafts.clone())
        })
        .await?;

        if created {
            let total: i64 = payouts.iter().map(|p| p.amount).sum();
            tracing::info!(
                root_contract_id = %root.id,
                escrow_id = %escrow.id,
                payouts = payouts.len(),
                "Prepared payouts totalling {}",
                format_minor_units(total)
            );
        }

        Ok(payouts)
    }

    /// Drives one payout through the provider. Safe to call repeatedly: rows
    /// already transferring or transferred are returned as they are, and the
    /// payout id is the provider idempotency key.
    pub async fn execute_payout(&self, payout_id: Uuid) -> Result<ContractPayout, ServiceError> {
        let payout = self
            .db_client
            .get_payout(payout_id)
            .await?
            .ok_or(ServiceError::PayoutNotFound(payout_id))?;

        if !payout.status.can_start_transfer() {
            tracing::debug!(payout_id = %payout_id, "Payout already past pending");
            return Ok(payout);
        }

        let destination = self
            .accounts
            .destination_account(payout.user_id)
            .await?
            .ok_or(ServiceError::NoPayoutAccount(payout.user_id))?;

        let started = retry_transient(&self.retry_policy, "begin_transfer", || {
            self.db_client.begin_transfer(payout_id)
        })
        .await?;

        let Some(payout) = started else {
            // Lost the compare-and-swap to a concurrent trigger.
            return self
                .db_client
                .get_payout(payout_id)
                .await?
                .ok_or(ServiceError::PayoutNotFound(payout_id));
        };

        tracing::info!(
            payout_id = %payout.id,
            attempt = payout.attempts,
            "Starting transfer of {} to user {}",
            format_minor_units(payout.amount),
            payout.user_id
        );

        let idempotency_key = payout.id.to_string();
        match self
            .provider
            .create_transfer(&destination, payout.amount, &idempotency_key)
            .await
        {
            Ok(receipt) => {
                let settlement = retry_transient(&self.retry_policy, "complete_transfer", || {
                    self.db_client
                        .complete_transfer(payout.id, receipt.transfer_id.clone())
                })
                .await?;

                tracing::info!(
                    payout_id = %payout.id,
                    transfer_id = %receipt.transfer_id,
                    wallet_transaction_id = %settlement.wallet_transaction.id,
                    "Transfer succeeded"
                );
                if let Some(escrow) = &settlement.released_escrow {
                    tracing::info!(
                        escrow_id = %escrow.id,
                        root_contract_id = %settlement.payout.root_contract_id,
                        "All payouts transferred, escrow released"
                    );
                }

                Ok(settlement.payout)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(payout_id = %payout.id, "Transfer failed: {}", message);

                retry_transient(&self.retry_policy, "fail_transfer", || {
                    self.db_client
                        .fail_transfer(payout.id, payout.attempts, message.clone())
                })
                .await?;

                Err(ServiceError::ExternalTransfer {
                    payout_id: payout.id,
                    message,
                })
            }
        }
    }

    pub async fn list_payouts(&self, contract_id: Uuid) -> Result<Vec<ContractPayout>, ServiceError> {
        let root = self.graph.root_of(contract_id).await?;
        self.db_client.list_payouts_for_root(root.id).await
    }

    /// Marks transfers stuck in `transferring` longer than `older_than` as
    /// failed so they can be re-driven.
    pub async fn reconcile_stale_transfers(
        &self,
        older_than: chrono::Duration,
    ) -> Result<Vec<ContractPayout>, ServiceError> {
        let cutoff = Utc::now() - older_than;
        let message = format!(
            "Transfer did not complete within {}s; marked failed for re-drive",
            older_than.num_seconds()
        );

        let failed = self.db_client.fail_stale_transfers(cutoff, message).await?;

        for payout in &failed {
            tracing::warn!(
                payout_id = %payout.id,
                attempts = payout.attempts,
                "Stale transfer marked failed"
            );
        }

        Ok(failed)
    }

    /// The root contract's own escrow, falling back to its job's escrow.
    async fn backing_escrow(&self, root_contract_id: Uuid, job_id: Uuid) -> Result<Escrow, ServiceError> {
        if let Some(escrow) = self
            .escrow_ledger
            .active_for(EscrowTarget::Contract(root_contract_id))
            .await?
        {
            return Ok(escrow);
        }

        self.escrow_ledger
            .active_for(EscrowTarget::Job(job_id))
            .await?
            .ok_or_else(|| ServiceError::NotReadyForPayout {
                contract_id: root_contract_id,
                reason: "no active escrow for the contract or its job".to_string(),
            })
    }
}
