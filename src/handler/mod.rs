pub mod inspection;
pub mod settlement;
pub mod wallet;
