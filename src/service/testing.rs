//! Shared fixtures for service tests.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{memory::MemoryStore, EscrowExt, InspectionExt, SettlementStore},
    models::{
        contractmodel::*,
        escrowmodel::{Escrow, EscrowStatus, EscrowTarget},
        inspectionmodel::{InspectionPatch, InspectionType},
    },
    service::payment_provider::{TransferError, TransferProvider, TransferReceipt},
};

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

pub fn contract(job_id: Uuid, hired_user_id: Uuid, gross_amount: i64, parent_contract_id: Option<Uuid>) -> Contract {
    let now = Utc::now();
    Contract {
        id: Uuid::new_v4(),
        job_id,
        job_application_id: None,
        hired_user_id,
        parent_contract_id,
        status: ContractStatus::Active,
        gross_amount,
        billing_cycle: BillingCycle::Weekly,
        platform_commission_percent: None,
        platform_commission_amount: None,
        commission_type: None,
        start_date: Some(now),
        end_date: None,
        next_billing_date: None,
        created_at: now,
    }
}

pub fn percent_policy(role_id: Uuid, billing_cycle: BillingCycle, percent: &str) -> RoleCommissionPolicy {
    RoleCommissionPolicy {
        id: Uuid::new_v4(),
        role_id,
        billing_cycle,
        platform_commission_percent: Some(dec(percent)),
        platform_commission_amount: None,
        commission_type: CommissionType::Percentage,
    }
}

pub fn fixed_policy(role_id: Uuid, billing_cycle: BillingCycle, amount: i64) -> RoleCommissionPolicy {
    RoleCommissionPolicy {
        id: Uuid::new_v4(),
        role_id,
        billing_cycle,
        platform_commission_percent: None,
        platform_commission_amount: Some(amount),
        commission_type: CommissionType::FixedAmount,
    }
}

/// A memory store seeded with a carrier role charged 10% on every billing cycle.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub owner: Uuid,
    pub carrier_role: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let carrier_role = Uuid::new_v4();
        for cycle in [BillingCycle::Hourly, BillingCycle::Weekly, BillingCycle::Monthly] {
            store.insert_role_commission(percent_policy(carrier_role, cycle, "10")).await;
        }

        Self {
            store,
            owner: Uuid::new_v4(),
            carrier_role,
        }
    }

    pub fn store(&self) -> Arc<dyn SettlementStore> {
        self.store.clone()
    }

    pub async fn carrier_without_account(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store.set_user_role(user_id, self.carrier_role).await;
        user_id
    }

    pub async fn carrier(&self) -> Uuid {
        let user_id = self.carrier_without_account().await;
        self.store
            .register_payout_account(user_id, &format!("acct_{}", user_id.simple()))
            .await;
        user_id
    }

    pub async fn root_contract(&self, gross_amount: i64) -> Contract {
        let job = self.store.insert_job(self.owner, None).await;
        let hired = self.carrier().await;
        self.store.insert_contract(contract(job.id, hired, gross_amount, None)).await
    }

    pub async fn reshared_job(&self, parent: &Contract) -> Job {
        self.store.insert_job(parent.hired_user_id, Some(parent.job_id)).await
    }

    pub async fn held_escrow(&self, target: EscrowTarget, amount: i64) -> Escrow {
        let escrow = self.store.create_escrow(target, amount).await.unwrap();
        self.store
            .transition_escrow(escrow.id, EscrowStatus::Held, None)
            .await
            .unwrap()
            .escrow
    }

    /// Runs a full pre/post cycle for the driver and submits it.
    pub async fn submitted_trip(&self, contract_id: Uuid, driver_user_id: Uuid) {
        for inspection_type in [InspectionType::Pre, InspectionType::Post] {
            let (inspection, _) = self
                .store
                .start_inspection(contract_id, driver_user_id, inspection_type)
                .await
                .unwrap();
            self.store
                .complete_inspection(inspection.id, driver_user_id, InspectionPatch::default())
                .await
                .unwrap();
        }
        self.store.submit_inspections(contract_id, driver_user_id).await.unwrap();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    #[default]
    None,
    /// The request never reaches the provider.
    BeforeTransfer,
    /// The provider books the transfer but the response is lost.
    AfterTransfer,
}

#[derive(Debug, Default)]
struct SimulatedState {
    mode: FailureMode,
    transfers: HashMap<String, String>,
    calls: HashMap<String, usize>,
}

/// Records at most one transfer per idempotency key, like the real provider.
#[derive(Debug, Default)]
pub struct SimulatedTransferProvider {
    state: Mutex<SimulatedState>,
}

impl SimulatedTransferProvider {
    pub fn set_failure(&self, mode: FailureMode) {
        self.state.lock().unwrap().mode = mode;
    }

    pub fn transfer_count(&self) -> usize {
        self.state.lock().unwrap().transfers.len()
    }

    pub fn calls_for(&self, idempotency_key: &str) -> usize {
        self.state.lock().unwrap().calls.get(idempotency_key).copied().unwrap_or(0)
    }

    pub fn transfer_id_for(&self, idempotency_key: &str) -> Option<String> {
        self.state.lock().unwrap().transfers.get(idempotency_key).cloned()
    }
}

#[async_trait]
impl TransferProvider for SimulatedTransferProvider {
    async fn create_transfer(
        &self,
        _destination_account_id: &str,
        _amount: i64,
        idempotency_key: &str,
    ) -> Result<TransferReceipt, TransferError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(idempotency_key.to_string()).or_default() += 1;

        if state.mode == FailureMode::BeforeTransfer {
            return Err(TransferError::Transport("connection reset".to_string()));
        }

        let next = state.transfers.len() + 1;
        let transfer_id = state
            .transfers
            .entry(idempotency_key.to_string())
            .or_insert_with(|| format!("tr_sim_{}", next))
            .clone();

        if state.mode == FailureMode::AfterTransfer {
            return Err(TransferError::Transport("timed out waiting for provider".to_string()));
        }

        Ok(TransferReceipt { transfer_id })
    }
}
