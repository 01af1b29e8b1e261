pub mod contractmodel;
pub mod escrowmodel;
pub mod inspectionmodel;
pub mod payoutmodel;
pub mod walletmodels;
