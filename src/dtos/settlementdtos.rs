use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    contractmodel::{CommissionOverride, CommissionType},
    escrowmodel::EscrowTarget,
    inspectionmodel::{InspectionPatch, InspectionType},
};

// Escrow DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct FundEscrowDto {
    pub job_id: Option<Uuid>,
    pub contract_id: Option<Uuid>,

    #[validate(range(min = 1, message = "Escrow amount must be positive"))]
    pub amount: i64,
}

impl FundEscrowDto {
    /// An escrow backs exactly one of a job or a contract.
    pub fn target(&self) -> Result<EscrowTarget, String> {
        match (self.job_id, self.contract_id) {
            (Some(job_id), None) => Ok(EscrowTarget::Job(job_id)),
            (None, Some(contract_id)) => Ok(EscrowTarget::Contract(contract_id)),
            _ => Err("Provide exactly one of job_id or contract_id".to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RefundEscrowDto {
    #[validate(length(min = 1, max = 500, message = "Refund reason must be between 1 and 500 characters"))]
    pub reason: String,
}

// Inspection DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct StartInspectionDto {
    #[serde(rename = "type")]
    pub inspection_type: InspectionType,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CompleteInspectionDto {
    pub data: Option<serde_json::Value>,
    pub defects: Option<serde_json::Value>,

    #[validate(length(max = 50, message = "At most 50 photos per inspection"))]
    pub photos: Option<Vec<String>>,

    #[validate(length(min = 1, message = "Proof of delivery photo cannot be empty"))]
    pub pod_photo: Option<String>,
}

impl From<CompleteInspectionDto> for InspectionPatch {
    fn from(dto: CompleteInspectionDto) -> Self {
        InspectionPatch {
            data: dto.data,
            defects: dto.defects,
            photos: dto.photos,
            pod_photo: dto.pod_photo,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InspectionQueryDto {
    pub driver_user_id: Option<Uuid>,
}

// Contract graph DTOs
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateSubContractDto {
    pub reshared_job_id: Uuid,
    pub recipient_user_id: Uuid,
    pub split_percentage: BigDecimal,

    pub commission_type: Option<CommissionType>,
    pub commission_percent: Option<BigDecimal>,

    #[validate(range(min = 0, message = "Commission amount cannot be negative"))]
    pub commission_amount: Option<i64>,
}

impl CreateSubContractDto {
    pub fn commission_override(&self) -> CommissionOverride {
        CommissionOverride {
            commission_type: self.commission_type,
            percent: self.commission_percent.clone(),
            amount: self.commission_amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &str, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.to_string(),
            data: Some(data),
        }
    }
}
