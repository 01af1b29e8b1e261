pub mod currency;
pub mod decimal;
pub mod retry;
pub mod token;
