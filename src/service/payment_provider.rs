// service/payment_provider.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::Config, service::error::ServiceError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferReceipt {
    pub transfer_id: String,
}

/// Provider failures are opaque to the engine: the message is recorded on the
/// payout and the row is left re-drivable.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer request failed: {0}")]
    Transport(String),

    #[error("provider rejected transfer ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unreadable provider response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait TransferProvider: Send + Sync + std::fmt::Debug {
    async fn create_transfer(
        &self,
        destination_account_id: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<TransferReceipt, TransferError>;
}

/// Resolves a recipient to the connected account that receives transfers.
#[async_trait]
pub trait AccountRegistry: Send + Sync + std::fmt::Debug {
    async fn destination_account(&self, user_id: Uuid) -> Result<Option<String>, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct StripeTransfer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    code: Option<String>,
}

fn parse_transfer_response(status: u16, body: &str) -> Result<TransferReceipt, TransferError> {
    if (200..300).contains(&status) {
        let transfer: StripeTransfer =
            serde_json::from_str(body).map_err(|e| TransferError::InvalidResponse(e.to_string()))?;
        return Ok(TransferReceipt {
            transfer_id: transfer.id,
        });
    }

    let message = serde_json::from_str::<StripeErrorBody>(body)
        .ok()
        .and_then(|b| match (b.error.message, b.error.code) {
            (Some(message), Some(code)) => Some(format!("{} ({})", message, code)),
            (Some(message), None) => Some(message),
            (None, code) => code,
        })
        .unwrap_or_else(|| "Transfer failed".to_string());

    Err(TransferError::Rejected { status, message })
}

#[derive(Debug, Clone)]
pub struct StripeTransferProvider {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
    currency: String,
}

impl StripeTransferProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: config.stripe_secret_key.clone(),
            api_base: config.stripe_api_base.trim_end_matches('/').to_string(),
            currency: config.payout_currency.clone(),
        }
    }
}

#[async_trait]
impl TransferProvider for StripeTransferProvider {
    async fn create_transfer(
        &self,
        destination_account_id: &str,
        amount: i64,
        idempotency_key: &str,
    ) -> Result<TransferReceipt, TransferError> {
        let amount = amount.to_string();
        let form = [
            ("amount", amount.as_str()),
            ("currency", self.currency.as_str()),
            ("destination", destination_account_id),
            ("metadata[payout_id]", idempotency_key),
        ];

        let response = self
            .client
            .post(format!("{}/v1/transfers", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;

        parse_transfer_response(status, &body)
    }
}
