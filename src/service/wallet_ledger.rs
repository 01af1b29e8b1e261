use std::sync::Arc;

use uuid::Uuid;

use crate::{db::SettlementStore, models::walletmodels::WalletTransaction, service::error::ServiceError};

/// Read side of the append-only wallet log. Entries are only written by
/// payout settlement.
#[derive(Debug, Clone)]
pub struct WalletLedger {
    db_client: Arc<dyn SettlementStore>,
}

impl WalletLedger {
    pub fn new(db_client: Arc<dyn SettlementStore>) -> Self {
        Self { db_client }
    }

    pub async fn history(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, ServiceError> {
        self.db_client.list_wallet_transactions(user_id).await
    }

    pub async fn by_reference(&self, reference_id: &str) -> Result<Option<WalletTransaction>, ServiceError> {
        self.db_client.get_wallet_transaction_by_reference(reference_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{contractmodel::CommissionOverride, escrowmodel::EscrowTarget, walletmodels::*},
        service::{
            contract_graph::ContractGraph,
            payout_service::PayoutEngine,
            testing::{dec, Fixture, SimulatedTransferProvider},
        },
        utils::retry::RetryPolicy,
    };

    #[tokio::test]
    async fn test_history_shows_processed_payout_for_recipient() {
        let fx = Fixture::new().await;
        let ledger = WalletLedger::new(fx.store());
        let engine = PayoutEngine::new(
            fx.store(),
            Arc::new(SimulatedTransferProvider::default()),
            fx.store.clone(),
            RetryPolicy::default(),
        );

        // Root carrier keeps half, the recipient carries the other half.
        let root = fx.root_contract(2_000).await;
        let job = fx.reshared_job(&root).await;
        let recipient = fx.carrier().await;
        ContractGraph::new(fx.store())
            .create_sub_contract(root.id, job.id, dec("50"), recipient, CommissionOverride::default())
            .await
            .unwrap();
        fx.held_escrow(EscrowTarget::Contract(root.id), 2_000).await;
        fx.submitted_trip(root.id, Uuid::new_v4()).await;

        let payouts = engine.prepare_payouts(root.id).await.unwrap();
        for payout in &payouts {
            engine.execute_payout(payout.id).await.unwrap();
        }

        let history = ledger.history(recipient).await.unwrap();
        assert_eq!(history.len(), 1);
        let entry = &history[0];
        assert_eq!(entry.transaction_type, WalletTransactionType::ContractPayout);
        assert_eq!(entry.status, WalletTransactionStatus::Processed);
        assert_eq!(entry.amount, 900);

        let by_ref = ledger.by_reference(&entry.reference_id).await.unwrap().unwrap();
        assert_eq!(by_ref.id, entry.id);

        assert!(ledger.history(Uuid::new_v4()).await.unwrap().is_empty());
        assert!(ledger.by_reference("missing").await.unwrap().is_none());
    }
}
