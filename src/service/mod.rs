pub mod background_jobs;
pub mod commission_service;
pub mod contract_graph;
pub mod error;
pub mod escrow_service;
pub mod inspection_service;
pub mod payment_provider;
pub mod payout_service;
pub mod wallet_ledger;

#[cfg(test)]
pub mod testing;
