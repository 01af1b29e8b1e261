pub mod settlementdtos;
