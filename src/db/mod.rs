pub mod accountdb;
pub mod commissiondb;
pub mod contractdb;
pub mod db;
pub mod escrowdb;
pub mod inspectiondb;
#[cfg(test)]
pub mod memory;
pub mod payoutdb;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    models::{
        contractmodel::*,
        escrowmodel::*,
        inspectionmodel::*,
        payoutmodel::*,
        walletmodels::WalletTransaction,
    },
    service::{error::ServiceError, payment_provider::AccountRegistry},
};

#[async_trait]
pub trait ContractExt {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, ServiceError>;

    async fn get_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, ServiceError>;

    async fn get_contracts(&self, contract_ids: &[Uuid]) -> Result<Vec<Contract>, ServiceError>;

    async fn get_sub_contract_links_by_root(
        &self,
        root_contract_id: Uuid,
    ) -> Result<Vec<SubContractLink>, ServiceError>;

    // Locks the reshared job and the parent contract, re-checks the split
    // invariant against committed links, then inserts the child contract and
    // its link in the same transaction.
    async fn create_sub_contract(
        &self,
        new_sub_contract: NewSubContract,
    ) -> Result<(SubContractLink, Contract), ServiceError>;

    async fn get_user_role(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError>;
}

#[async_trait]
pub trait CommissionExt {
    async fn get_role_commission(
        &self,
        role_id: Uuid,
        billing_cycle: BillingCycle,
    ) -> Result<Option<RoleCommissionPolicy>, ServiceError>;
}

#[async_trait]
pub trait EscrowExt {
    /// Inserts a `pending` escrow; fails with `AlreadyFunded` if the target
    /// already has a pending or held escrow.
    async fn create_escrow(&self, target: EscrowTarget, amount: i64) -> Result<Escrow, ServiceError>;

    async fn get_escrow(&self, escrow_id: Uuid) -> Result<Option<Escrow>, ServiceError>;

    async fn get_active_escrow(&self, target: EscrowTarget) -> Result<Option<Escrow>, ServiceError>;

    /// Compare-and-swap status change under a row lock. A refund is refused
    /// once any payout backed by the escrow is transferring or transferred.
    async fn transition_escrow(
        &self,
        escrow_id: Uuid,
        to: EscrowStatus,
        reason: Option<String>,
    ) -> Result<EscrowTransition, ServiceError>;
}

#[async_trait]
pub trait InspectionExt {
    /// Returns the inspection and whether it was newly created.
    async fn start_inspection(
        &self,
        contract_id: Uuid,
        driver_user_id: Uuid,
        inspection_type: InspectionType,
    ) -> Result<(TripInspection, bool), ServiceError>;

    async fn get_inspection(&self, inspection_id: Uuid) -> Result<Option<TripInspection>, ServiceError>;

    async fn complete_inspection(
        &self,
        inspection_id: Uuid,
        driver_user_id: Uuid,
        patch: InspectionPatch,
    ) -> Result<TripInspection, ServiceError>;

    /// Flips the open pre/post pair to `submitted` in one transaction.
    async fn submit_inspections(
        &self,
        contract_id: Uuid,
        driver_user_id: Uuid,
    ) -> Result<Vec<TripInspection>, ServiceError>;

    async fn list_inspections(&self, contract_ids: &[Uuid]) -> Result<Vec<TripInspection>, ServiceError>;
}

#[async_trait]
pub trait PayoutExt {
    /// Re-checks escrow and inspection preconditions under the escrow lock,
    /// along with the committed links of the tree, and inserts every draft, or
    /// returns the existing set for the root untouched. The flag is true when
    /// rows were created by this call.
    async fn create_payouts(
        &self,
        root_contract_id: Uuid,
        escrow_id: Uuid,
        tree_contract_ids: &[Uuid],
        tree_link_ids: &[Uuid],
        drafts: Vec<PayoutDraft>,
    ) -> Result<(Vec<ContractPayout>, bool), ServiceError>;

    async fn get_payout(&self, payout_id: Uuid) -> Result<Option<ContractPayout>, ServiceError>;

    async fn list_payouts_for_root(&self, root_contract_id: Uuid) -> Result<Vec<ContractPayout>, ServiceError>;

    /// `pending | failed -> transferring`. `None` when the row is in any other
    /// state; `EscrowNotHeld` when the backing escrow is no longer held.
    async fn begin_transfer(&self, payout_id: Uuid) -> Result<Option<ContractPayout>, ServiceError>;

    /// `transferring -> transferred`, wallet entry, and escrow release once the
    /// last sibling lands, all in one transaction.
    async fn complete_transfer(
        &self,
        payout_id: Uuid,
        transfer_id: String,
    ) -> Result<TransferSettlement, ServiceError>;

    /// `transferring -> failed` with the provider's message, only while the row
    /// is still on the given attempt.
    async fn fail_transfer(
        &self,
        payout_id: Uuid,
        attempt: i32,
        message: String,
    ) -> Result<ContractPayout, ServiceError>;

    async fn fail_stale_transfers(
        &self,
        stale_before: DateTime<Utc>,
        message: String,
    ) -> Result<Vec<ContractPayout>, ServiceError>;
}

#[async_trait]
pub trait WalletExt {
    async fn list_wallet_transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError>;

    async fn get_wallet_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<WalletTransaction>, ServiceError>;
}

pub trait SettlementStore:
    ContractExt + CommissionExt + EscrowExt + InspectionExt + PayoutExt + WalletExt + AccountRegistry + Send + Sync + std::fmt::Debug
{
}

impl<T> SettlementStore for T where
    T: ContractExt + CommissionExt + EscrowExt + InspectionExt + PayoutExt + WalletExt + AccountRegistry + Send + Sync + std::fmt::Debug
{
}
