use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::{
        contractmodel::BillingCycle,
        escrowmodel::{EscrowStatus, EscrowTarget},
    },
};

/// Failure classes callers act on: fix the input, re-read state, fix
/// configuration, re-drive a transfer, or halt and alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    NotFound,
    PolicyNotFound,
    ExternalTransfer,
    DataIntegrity,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Contract {0} not found")]
    ContractNotFound(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Escrow {0} not found")]
    EscrowNotFound(Uuid),

    #[error("Inspection {0} not found")]
    InspectionNotFound(Uuid),

    #[error("Payout {0} not found")]
    PayoutNotFound(Uuid),

    #[error("No role recorded for user {0}")]
    UserRoleNotFound(Uuid),

    #[error("An active escrow already exists for {0}")]
    AlreadyFunded(EscrowTarget),

    #[error("Invalid escrow transition for {escrow_id}: {from:?} -> {to:?}")]
    InvalidEscrowTransition {
        escrow_id: Uuid,
        from: EscrowStatus,
        to: EscrowStatus,
    },

    #[error("Contract {contract_id} is not active")]
    ContractNotActive { contract_id: Uuid },

    #[error("A completed pre-trip inspection is required for contract {contract_id} and driver {driver_user_id}")]
    PreInspectionRequired {
        contract_id: Uuid,
        driver_user_id: Uuid,
    },

    #[error("User {user_id} does not own inspection {inspection_id}")]
    NotOwner { inspection_id: Uuid, user_id: Uuid },

    #[error("Inspection {0} was already submitted")]
    AlreadySubmitted(Uuid),

    #[error("Inspections for contract {contract_id} and driver {driver_user_id} are incomplete: {reason}")]
    IncompleteInspections {
        contract_id: Uuid,
        driver_user_id: Uuid,
        reason: String,
    },

    #[error("Split of {requested}% on job {reshared_job_id} exceeds 100% (already allocated {allocated}%)")]
    SplitExceeded {
        reshared_job_id: Uuid,
        allocated: BigDecimal,
        requested: BigDecimal,
    },

    #[error("Contract {contract_id} is not ready for payout: {reason}")]
    NotReadyForPayout { contract_id: Uuid, reason: String },

    #[error("Contract tree {root_contract_id} is already in settlement: {reason}")]
    SettlementStarted { root_contract_id: Uuid, reason: String },

    #[error("Contract tree {root_contract_id} changed while its payouts were being prepared")]
    PayoutTreeChanged { root_contract_id: Uuid },

    #[error("Escrow {escrow_id} has payouts transferring or transferred")]
    PayoutsInFlight { escrow_id: Uuid },

    #[error("Escrow {escrow_id} is {}, transfers against it are halted", .status.to_str())]
    EscrowNotHeld { escrow_id: Uuid, status: EscrowStatus },

    #[error("No commission policy for role {role_id} on a {} billing cycle", .billing_cycle.to_str())]
    PolicyNotFound {
        role_id: Uuid,
        billing_cycle: BillingCycle,
    },

    #[error("No payout account registered for user {0}")]
    NoPayoutAccount(Uuid),

    #[error("Transfer for payout {payout_id} failed: {message}")]
    ExternalTransfer { payout_id: Uuid, message: String },

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) | ServiceError::SplitExceeded { .. } => ErrorKind::Validation,

            ServiceError::ContractNotFound(_)
            | ServiceError::JobNotFound(_)
            | ServiceError::EscrowNotFound(_)
            | ServiceError::InspectionNotFound(_)
            | ServiceError::PayoutNotFound(_)
            | ServiceError::UserRoleNotFound(_) => ErrorKind::NotFound,

            ServiceError::AlreadyFunded(_)
            | ServiceError::InvalidEscrowTransition { .. }
            | ServiceError::ContractNotActive { .. }
            | ServiceError::PreInspectionRequired { .. }
            | ServiceError::NotOwner { .. }
            | ServiceError::AlreadySubmitted(_)
            | ServiceError::IncompleteInspections { .. }
            | ServiceError::NotReadyForPayout { .. }
            | ServiceError::SettlementStarted { .. }
            | ServiceError::PayoutTreeChanged { .. }
            | ServiceError::PayoutsInFlight { .. }
            | ServiceError::EscrowNotHeld { .. }
            | ServiceError::NoPayoutAccount(_) => ErrorKind::StateConflict,

            ServiceError::PolicyNotFound { .. } => ErrorKind::PolicyNotFound,

            ServiceError::ExternalTransfer { .. } => ErrorKind::ExternalTransfer,

            ServiceError::DataIntegrity(_) => ErrorKind::DataIntegrity,

            ServiceError::Database(_) | ServiceError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Database failures that are worth retrying with backoff: serialization
    /// failures, deadlocks, pool exhaustion and dropped connections.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Database(sqlx::Error::Database(db_err)) => {
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            ServiceError::Database(sqlx::Error::PoolTimedOut)
            | ServiceError::Database(sqlx::Error::Io(_)) => true,
            _ => false,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error.kind() {
            ErrorKind::Validation => HttpError::bad_request(error.to_string()),
            ErrorKind::NotFound => HttpError::not_found(error.to_string()),
            ErrorKind::StateConflict => match error {
                ServiceError::IncompleteInspections { .. } | ServiceError::PreInspectionRequired { .. } => {
                    HttpError::conflict(format!("{}: {}", ErrorMessage::InspectionIncomplete.to_string(), error))
                }
                ServiceError::AlreadySubmitted(_) => {
                    HttpError::conflict(ErrorMessage::InspectionAlreadySubmitted.to_string())
                }
                ServiceError::NotOwner { .. } => {
                    HttpError::forbidden(ErrorMessage::PermissionDenied.to_string())
                }
                _ => HttpError::conflict(error.to_string()),
            },
            ErrorKind::ExternalTransfer => {
                tracing::warn!("{}", error);
                HttpError::bad_gateway(ErrorMessage::PaymentProcessingDelayed.to_string())
            }
            ErrorKind::PolicyNotFound => {
                tracing::error!("commission configuration gap: {}", error);
                HttpError::server_error(error.to_string())
            }
            ErrorKind::DataIntegrity => {
                tracing::error!("data integrity violation: {}", error);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
            ErrorKind::Internal => {
                tracing::error!("{}", error);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
        }
    }
}
