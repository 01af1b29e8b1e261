//! In-memory settlement store used by the test suite.
//!
//! Every trait method takes the state lock exactly once, so each call is
//! serialisable in the same way a single Postgres transaction is.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CommissionExt, ContractExt, EscrowExt, InspectionExt, PayoutExt, WalletExt};
use crate::models::{
    contractmodel::*,
    escrowmodel::*,
    inspectionmodel::*,
    payoutmodel::*,
    walletmodels::*,
};
use crate::service::{
    contract_graph::{check_tree_open, plan_split},
    error::ServiceError,
    escrow_service::{check_refundable, plan_transition},
    inspection_service::{check_completion, check_payout_readiness, plan_start, select_submission_pair},
    payment_provider::AccountRegistry,
    payout_service::{check_escrow_covers, check_transfer_allowed, check_tree_unchanged},
};

#[derive(Debug, Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    contracts: HashMap<Uuid, Contract>,
    sub_contracts: Vec<SubContractLink>,
    role_commissions: Vec<RoleCommissionPolicy>,
    user_roles: HashMap<Uuid, Uuid>,
    accounts: HashMap<Uuid, String>,
    escrows: Vec<Escrow>,
    inspections: Vec<TripInspection>,
    payouts: Vec<ContractPayout>,
    wallet_transactions: Vec<WalletTransaction>,
}

impl MemoryState {
    fn escrow_mut(&mut self, escrow_id: Uuid) -> Result<&mut Escrow, ServiceError> {
        self.escrows
            .iter_mut()
            .find(|e| e.id == escrow_id)
            .ok_or(ServiceError::EscrowNotFound(escrow_id))
    }

    fn payout_mut(&mut self, payout_id: Uuid) -> Result<&mut ContractPayout, ServiceError> {
        self.payouts
            .iter_mut()
            .find(|p| p.id == payout_id)
            .ok_or(ServiceError::PayoutNotFound(payout_id))
    }

    fn pair_rows(&self, contract_id: Uuid, driver_user_id: Uuid) -> Vec<TripInspection> {
        self.inspections
            .iter()
            .filter(|i| i.contract_id == contract_id && i.driver_user_id == driver_user_id)
            .cloned()
            .collect()
    }
}

fn apply_escrow_status(escrow: &mut Escrow, to: EscrowStatus, reason: Option<String>) {
    let now = Utc::now();
    escrow.status = to;
    match to {
        EscrowStatus::Held => escrow.held_at = Some(now),
        EscrowStatus::Released => escrow.released_at = Some(now),
        EscrowStatus::Refunded => escrow.refunded_at = Some(now),
        EscrowStatus::Pending => {}
    }
    if reason.is_some() {
        escrow.refund_reason = reason;
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_job(&self, owner_user_id: Uuid, parent_job_id: Option<Uuid>) -> Job {
        let job = Job {
            id: Uuid::new_v4(),
            owner_user_id,
            status: JobStatus::Active,
            assignment_type: AssignmentType::Manual,
            parent_job_id,
            created_at: Utc::now(),
        };
        self.state.lock().await.jobs.insert(job.id, job.clone());
        job
    }

    pub async fn insert_contract(&self, contract: Contract) -> Contract {
        self.state.lock().await.contracts.insert(contract.id, contract.clone());
        contract
    }

    pub async fn insert_role_commission(&self, policy: RoleCommissionPolicy) {
        self.state.lock().await.role_commissions.push(policy);
    }

    pub async fn set_user_role(&self, user_id: Uuid, role_id: Uuid) {
        self.state.lock().await.user_roles.insert(user_id, role_id);
    }

    pub async fn register_payout_account(&self, user_id: Uuid, account_id: &str) {
        self.state.lock().await.accounts.insert(user_id, account_id.to_string());
    }

    /// Backdates a payout so reconciliation treats it as stale.
    pub async fn backdate_payout(&self, payout_id: Uuid, updated_at: DateTime<Utc>) {
        if let Some(payout) = self.state.lock().await.payouts.iter_mut().find(|p| p.id == payout_id) {
            payout.updated_at = updated_at;
        }
    }
}

#[async_trait]
impl ContractExt for MemoryStore {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, ServiceError> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn get_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, ServiceError> {
        Ok(self.state.lock().await.contracts.get(&contract_id).cloned())
    }

    async fn get_contracts(&self, contract_ids: &[Uuid]) -> Result<Vec<Contract>, ServiceError> {
        let state = self.state.lock().await;
        let mut contracts: Vec<Contract> = contract_ids
            .iter()
            .filter_map(|id| state.contracts.get(id).cloned())
            .collect();
        contracts.sort_by_key(|c| c.created_at);
        Ok(contracts)
    }

    async fn get_sub_contract_links_by_root(
        &self,
        root_contract_id: Uuid,
    ) -> Result<Vec<SubContractLink>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .sub_contracts
            .iter()
            .filter(|l| l.root_contract_id == root_contract_id)
            .cloned()
            .collect())
    }

    async fn create_sub_contract(
        &self,
        new_sub_contract: NewSubContract,
    ) -> Result<(SubContractLink, Contract), ServiceError> {
        let mut state = self.state.lock().await;

        let job = state
            .jobs
            .get(&new_sub_contract.reshared_job_id)
            .cloned()
            .ok_or(ServiceError::JobNotFound(new_sub_contract.reshared_job_id))?;
        let parent = state
            .contracts
            .get(&new_sub_contract.parent_contract.id)
            .cloned()
            .ok_or(ServiceError::ContractNotFound(new_sub_contract.parent_contract.id))?;

        let root_contract_id = new_sub_contract.root_contract_id;
        let root_job_id = state
            .contracts
            .get(&root_contract_id)
            .map(|c| c.job_id)
            .ok_or(ServiceError::ContractNotFound(root_contract_id))?;
        let escrows: Vec<Escrow> = state
            .escrows
            .iter()
            .filter(|e| e.contract_id == Some(root_contract_id) || e.job_id == Some(root_job_id))
            .cloned()
            .collect();
        let payout_count = state
            .payouts
            .iter()
            .filter(|p| p.root_contract_id == root_contract_id)
            .count();
        check_tree_open(root_contract_id, &escrows, payout_count)?;

        let job_links: Vec<SubContractLink> = state
            .sub_contracts
            .iter()
            .filter(|l| l.reshared_job_id == job.id)
            .cloned()
            .collect();
        let parent_links: Vec<SubContractLink> = state
            .sub_contracts
            .iter()
            .filter(|l| l.parent_contract_id == parent.id)
            .cloned()
            .collect();

        let split_amount = plan_split(
            &parent,
            &job,
            &job_links,
            &parent_links,
            &new_sub_contract.split_percentage,
            new_sub_contract.split_bps,
        )?;

        let now = Utc::now();
        let commission = new_sub_contract.commission;
        let child = Contract {
            id: Uuid::new_v4(),
            job_id: job.id,
            job_application_id: None,
            hired_user_id: new_sub_contract.recipient_user_id,
            parent_contract_id: Some(parent.id),
            status: ContractStatus::Active,
            gross_amount: split_amount,
            billing_cycle: parent.billing_cycle,
            platform_commission_percent: commission.percent.clone(),
            platform_commission_amount: commission.amount,
            commission_type: commission.commission_type,
            start_date: Some(now),
            end_date: None,
            next_billing_date: None,
            created_at: now,
        };
        let link = SubContractLink {
            id: Uuid::new_v4(),
            root_contract_id: new_sub_contract.root_contract_id,
            parent_contract_id: parent.id,
            sub_contract_id: child.id,
            reshared_job_id: job.id,
            split_percentage: new_sub_contract.split_percentage,
            split_amount,
            platform_commission_percent: commission.percent,
            platform_commission_amount: commission.amount,
            commission_type: commission.commission_type,
            created_at: now,
        };

        state.contracts.insert(child.id, child.clone());
        state.sub_contracts.push(link.clone());

        Ok((link, child))
    }

    async fn get_user_role(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError> {
        Ok(self.state.lock().await.user_roles.get(&user_id).copied())
    }
}

#[async_trait]
impl CommissionExt for MemoryStore {
    async fn get_role_commission(
        &self,
        role_id: Uuid,
        billing_cycle: BillingCycle,
    ) -> Result<Option<RoleCommissionPolicy>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .role_commissions
            .iter()
            .find(|p| p.role_id == role_id && p.billing_cycle == billing_cycle)
            .cloned())
    }
}

#[async_trait]
impl EscrowExt for MemoryStore {
    async fn create_escrow(&self, target: EscrowTarget, amount: i64) -> Result<Escrow, ServiceError> {
        let mut state = self.state.lock().await;

        if state
            .escrows
            .iter()
            .any(|e| e.target() == Some(target) && e.status.is_active())
        {
            return Err(ServiceError::AlreadyFunded(target));
        }

        let escrow = Escrow {
            id: Uuid::new_v4(),
            job_id: target.job_id(),
            contract_id: target.contract_id(),
            amount,
            status: EscrowStatus::Pending,
            refund_reason: None,
            created_at: Utc::now(),
            held_at: None,
            released_at: None,
            refunded_at: None,
        };
        state.escrows.push(escrow.clone());

        Ok(escrow)
    }

    async fn get_escrow(&self, escrow_id: Uuid) -> Result<Option<Escrow>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state.escrows.iter().find(|e| e.id == escrow_id).cloned())
    }

    async fn get_active_escrow(&self, target: EscrowTarget) -> Result<Option<Escrow>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .escrows
            .iter()
            .rev()
            .find(|e| e.target() == Some(target) && e.status.is_active())
            .cloned())
    }

    async fn transition_escrow(
        &self,
        escrow_id: Uuid,
        to: EscrowStatus,
        reason: Option<String>,
    ) -> Result<EscrowTransition, ServiceError> {
        let mut state = self.state.lock().await;
        let payouts: Vec<ContractPayout> = state
            .payouts
            .iter()
            .filter(|p| p.escrow_id == escrow_id)
            .cloned()
            .collect();
        let escrow = state.escrow_mut(escrow_id)?;

        let changed = plan_transition(escrow, to)?;
        if changed && to == EscrowStatus::Refunded {
            check_refundable(escrow, &payouts)?;
        }
        if changed {
            apply_escrow_status(escrow, to, reason);
        }

        Ok(EscrowTransition {
            escrow: escrow.clone(),
            changed,
        })
    }
}

#[async_trait]
impl InspectionExt for MemoryStore {
    async fn start_inspection(
        &self,
        contract_id: Uuid,
        driver_user_id: Uuid,
        inspection_type: InspectionType,
    ) -> Result<(TripInspection, bool), ServiceError> {
        let mut state = self.state.lock().await;

        let existing = state.pair_rows(contract_id, driver_user_id);
        if let Some(open) = plan_start(contract_id, driver_user_id, inspection_type, &existing)? {
            return Ok((open, false));
        }

        let inspection = TripInspection {
            id: Uuid::new_v4(),
            contract_id,
            inspection_type,
            driver_user_id,
            status: InspectionStatus::Started,
            data: None,
            defects: None,
            photos: None,
            pod_photo: None,
            started_at: Utc::now(),
            completed_at: None,
            submitted_at: None,
        };
        state.inspections.push(inspection.clone());

        Ok((inspection, true))
    }

    async fn get_inspection(&self, inspection_id: Uuid) -> Result<Option<TripInspection>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state.inspections.iter().find(|i| i.id == inspection_id).cloned())
    }

    async fn complete_inspection(
        &self,
        inspection_id: Uuid,
        driver_user_id: Uuid,
        patch: InspectionPatch,
    ) -> Result<TripInspection, ServiceError> {
        let mut state = self.state.lock().await;
        let inspection = state
            .inspections
            .iter_mut()
            .find(|i| i.id == inspection_id)
            .ok_or(ServiceError::InspectionNotFound(inspection_id))?;

        check_completion(inspection, driver_user_id)?;
        inspection.apply_patch(patch);
        inspection.status = InspectionStatus::Completed;
        inspection.completed_at = Some(Utc::now());

        Ok(inspection.clone())
    }

    async fn submit_inspections(
        &self,
        contract_id: Uuid,
        driver_user_id: Uuid,
    ) -> Result<Vec<TripInspection>, ServiceError> {
        let mut state = self.state.lock().await;

        let rows = state.pair_rows(contract_id, driver_user_id);
        let pair = select_submission_pair(contract_id, driver_user_id, &rows)?;

        let now = Utc::now();
        let mut submitted = Vec::with_capacity(2);
        for inspection in state.inspections.iter_mut().filter(|i| pair.contains(&i.id)) {
            inspection.status = InspectionStatus::Submitted;
            inspection.submitted_at = Some(now);
            submitted.push(inspection.clone());
        }

        Ok(submitted)
    }

    async fn list_inspections(&self, contract_ids: &[Uuid]) -> Result<Vec<TripInspection>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .inspections
            .iter()
            .filter(|i| contract_ids.contains(&i.contract_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PayoutExt for MemoryStore {
    async fn create_payouts(
        &self,
        root_contract_id: Uuid,
        escrow_id: Uuid,
        tree_contract_ids: &[Uuid],
        tree_link_ids: &[Uuid],
        drafts: Vec<PayoutDraft>,
    ) -> Result<(Vec<ContractPayout>, bool), ServiceError> {
        let mut state = self.state.lock().await;

        let escrow = state
            .escrows
            .iter()
            .find(|e| e.id == escrow_id)
            .cloned()
            .ok_or(ServiceError::EscrowNotFound(escrow_id))?;

        let existing: Vec<ContractPayout> = state
            .payouts
            .iter()
            .filter(|p| p.root_contract_id == root_contract_id)
            .cloned()
            .collect();
        if !existing.is_empty() {
            return Ok((existing, false));
        }

        let root = state
            .contracts
            .get(&root_contract_id)
            .cloned()
            .ok_or(ServiceError::ContractNotFound(root_contract_id))?;

        check_escrow_covers(&escrow, root.gross_amount).map_err(|reason| {
            ServiceError::NotReadyForPayout {
                contract_id: root_contract_id,
                reason,
            }
        })?;

        let committed_link_ids: Vec<Uuid> = state
            .sub_contracts
            .iter()
            .filter(|l| l.root_contract_id == root_contract_id)
            .map(|l| l.id)
            .collect();
        check_tree_unchanged(root_contract_id, tree_link_ids, &committed_link_ids)?;

        let inspections: Vec<TripInspection> = state
            .inspections
            .iter()
            .filter(|i| tree_contract_ids.contains(&i.contract_id))
            .cloned()
            .collect();
        check_payout_readiness(&inspections).map_err(|reason| ServiceError::NotReadyForPayout {
            contract_id: root_contract_id,
            reason,
        })?;

        let now = Utc::now();
        let payouts: Vec<ContractPayout> = drafts
            .into_iter()
            .map(|draft| ContractPayout {
                id: Uuid::new_v4(),
                contract_id: draft.contract_id,
                root_contract_id,
                escrow_id,
                user_id: draft.user_id,
                gross_share: draft.gross_share,
                commission_amount: draft.commission_amount,
                amount: draft.amount,
                status: PayoutStatus::Pending,
                stripe_transfer_id: None,
                error_message: None,
                wallet_transaction_id: None,
                attempts: 0,
                created_at: now,
                updated_at: now,
                transferred_at: None,
            })
            .collect();
        state.payouts.extend(payouts.iter().cloned());

        Ok((payouts, true))
    }

    async fn get_payout(&self, payout_id: Uuid) -> Result<Option<ContractPayout>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state.payouts.iter().find(|p| p.id == payout_id).cloned())
    }

    async fn list_payouts_for_root(&self, root_contract_id: Uuid) -> Result<Vec<ContractPayout>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .payouts
            .iter()
            .filter(|p| p.root_contract_id == root_contract_id)
            .cloned()
            .collect())
    }

    async fn begin_transfer(&self, payout_id: Uuid) -> Result<Option<ContractPayout>, ServiceError> {
        let mut state = self.state.lock().await;
        let Some(escrow_id) = state
            .payouts
            .iter()
            .find(|p| p.id == payout_id && p.status.can_start_transfer())
            .map(|p| p.escrow_id)
        else {
            return Ok(None);
        };

        let escrow = state
            .escrows
            .iter()
            .find(|e| e.id == escrow_id)
            .ok_or(ServiceError::EscrowNotFound(escrow_id))?;
        check_transfer_allowed(escrow)?;

        let payout = state.payout_mut(payout_id)?;
        payout.status = PayoutStatus::Transferring;
        payout.attempts += 1;
        payout.error_message = None;
        payout.updated_at = Utc::now();

        Ok(Some(payout.clone()))
    }

    async fn complete_transfer(
        &self,
        payout_id: Uuid,
        transfer_id: String,
    ) -> Result<TransferSettlement, ServiceError> {
        let mut state = self.state.lock().await;
        let payout = state.payout_mut(payout_id)?.clone();

        match payout.status {
            PayoutStatus::Transferring | PayoutStatus::Failed => {}
            PayoutStatus::Transferred => {
                let reference = payout.id.to_string();
                let wallet_transaction = state
                    .wallet_transactions
                    .iter()
                    .find(|t| t.reference_id == reference)
                    .cloned()
                    .ok_or_else(|| {
                        ServiceError::DataIntegrity(format!("payout {} transferred without a wallet entry", payout.id))
                    })?;
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

        let now = Utc::now();
        let wallet_transaction = WalletTransaction {
            id: Uuid::new_v4(),
            user_id: payout.user_id,
            transaction_type: WalletTransactionType::ContractPayout,
            amount: payout.amount,
            status: WalletTransactionStatus::Processed,
            reference_id: payout.id.to_string(),
            escrow_id: Some(payout.escrow_id),
            external_reference: Some(transfer_id.clone()),
            created_at: now,
        };
        state.wallet_transactions.push(wallet_transaction.clone());

        let updated = {
            let row = state.payout_mut(payout_id)?;
            row.status = PayoutStatus::Transferred;
            row.stripe_transfer_id = Some(transfer_id);
            row.wallet_transaction_id = Some(wallet_transaction.id);
            row.error_message = None;
            row.transferred_at = Some(now);
            row.updated_at = now;
            row.clone()
        };

        let all_transferred = state
            .payouts
            .iter()
            .filter(|p| p.root_contract_id == updated.root_contract_id)
            .all(|p| p.status == PayoutStatus::Transferred);

        let mut released_escrow = None;
        if all_transferred {
            let escrow = state.escrow_mut(updated.escrow_id)?;
            match plan_transition(escrow, EscrowStatus::Released) {
                Ok(true) => {
                    apply_escrow_status(escrow, EscrowStatus::Released, None);
                    released_escrow = Some(escrow.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        "All payouts for contract {} transferred but escrow {} cannot be released: {}",
                        updated.root_contract_id,
                        escrow.id,
                        e
                    );
                }
            }
        }

        Ok(TransferSettlement {
            payout: updated,
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
        let mut state = self.state.lock().await;
        let payout = state.payout_mut(payout_id)?;

        if payout.status == PayoutStatus::Transferring && payout.attempts == attempt {
            payout.status = PayoutStatus::Failed;
            payout.error_message = Some(message);
            payout.updated_at = Utc::now();
        }

        Ok(payout.clone())
    }

    async fn fail_stale_transfers(
        &self,
        stale_before: DateTime<Utc>,
        message: String,
    ) -> Result<Vec<ContractPayout>, ServiceError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut failed = Vec::new();
        for payout in state
            .payouts
            .iter_mut()
            .filter(|p| p.status == PayoutStatus::Transferring && p.updated_at < stale_before)
        {
            payout.status = PayoutStatus::Failed;
            payout.error_message = Some(message.clone());
            payout.updated_at = now;
            failed.push(payout.clone());
        }

        Ok(failed)
    }
}

#[async_trait]
impl WalletExt for MemoryStore {
    async fn list_wallet_transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .wallet_transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_wallet_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<WalletTransaction>, ServiceError> {
        let state = self.state.lock().await;
        Ok(state
            .wallet_transactions
            .iter()
            .rev()
            .find(|t| t.reference_id == reference_id)
            .cloned())
    }
}

#[async_trait]
impl AccountRegistry for MemoryStore {
    async fn destination_account(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        Ok(self.state.lock().await.accounts.get(&user_id).cloned())
    }
}
