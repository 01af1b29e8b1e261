// service/inspection_service.rs
use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::SettlementStore,
    models::{contractmodel::ContractStatus, inspectionmodel::*},
    service::error::ServiceError,
};

/// Decides what `start` does for a (contract, driver) pair given every row the
/// pair already has. `Some` is the open inspection to hand back unchanged.
pub fn plan_start(
    contract_id: Uuid,
    driver_user_id: Uuid,
    inspection_type: InspectionType,
    existing: &[TripInspection],
) -> Result<Option<TripInspection>, ServiceError> {
    if let Some(open) = existing
        .iter()
        .find(|i| i.inspection_type == inspection_type && !i.status.is_terminal())
    {
        return Ok(Some(open.clone()));
    }

    if inspection_type == InspectionType::Post
        && !existing
            .iter()
            .any(|i| i.inspection_type == InspectionType::Pre && i.status == InspectionStatus::Completed)
    {
        return Err(ServiceError::PreInspectionRequired {
            contract_id,
            driver_user_id,
        });
    }

    Ok(None)
}

pub fn check_completion(inspection: &TripInspection, driver_user_id: Uuid) -> Result<(), ServiceError> {
    if inspection.driver_user_id != driver_user_id {
        return Err(ServiceError::NotOwner {
            inspection_id: inspection.id,
            user_id: driver_user_id,
        });
    }

    if inspection.status == InspectionStatus::Submitted {
        return Err(ServiceError::AlreadySubmitted(inspection.id));
    }

    Ok(())
}

/// Picks the open pre/post pair to submit: exactly one of each, both completed.
pub fn select_submission_pair(
    contract_id: Uuid,
    driver_user_id: Uuid,
    rows: &[TripInspection],
) -> Result<[Uuid; 2], ServiceError> {
    let incomplete = |reason: String| ServiceError::IncompleteInspections {
        contract_id,
        driver_user_id,
        reason,
    };

    let open: Vec<&TripInspection> = rows.iter().filter(|i| !i.status.is_terminal()).collect();

    if open.is_empty() {
        if let Some(last) = rows.iter().filter(|i| i.status.is_terminal()).last() {
            return Err(ServiceError::AlreadySubmitted(last.id));
        }
        return Err(incomplete("no inspections recorded".to_string()));
    }

    let pre: Vec<&&TripInspection> = open.iter().filter(|i| i.inspection_type == InspectionType::Pre).collect();
    let post: Vec<&&TripInspection> = open.iter().filter(|i| i.inspection_type == InspectionType::Post).collect();

    if pre.len() != 1 || post.len() != 1 {
        return Err(incomplete(format!(
            "expected one pre and one post inspection, found {} pre and {} post",
            pre.len(),
            post.len()
        )));
    }

    for inspection in [pre[0], post[0]] {
        if inspection.status != InspectionStatus::Completed {
            return Err(incomplete(format!(
                "{} inspection {} is not completed",
                inspection.inspection_type.to_str(),
                inspection.id
            )));
        }
    }

    Ok([pre[0].id, post[0].id])
}

/// Payout gate over every inspection in a contract tree: at least one pair has
/// a submitted pre and post, and no pair that started inspections is left with
/// an unsubmitted one.
pub fn check_payout_readiness(rows: &[TripInspection]) -> Result<(), String> {
    let mut pairs: HashMap<(Uuid, Uuid), Vec<&TripInspection>> = HashMap::new();
    for row in rows {
        pairs.entry((row.contract_id, row.driver_user_id)).or_default().push(row);
    }

    if pairs.is_empty() {
        return Err("no trip inspections have been submitted".to_string());
    }

    for ((contract_id, driver_user_id), inspections) in &pairs {
        if inspections.iter().any(|i| !i.status.is_terminal()) {
            return Err(format!(
                "driver {} has unsubmitted inspections on contract {}",
                driver_user_id, contract_id
            ));
        }

        let submitted = |t: InspectionType| inspections.iter().any(|i| i.inspection_type == t);
        if !submitted(InspectionType::Pre) || !submitted(InspectionType::Post) {
            return Err(format!(
                "driver {} has not submitted both inspections on contract {}",
                driver_user_id, contract_id
            ));
        }
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct InspectionGate {
    db_client: Arc<dyn SettlementStore>,
}

impl InspectionGate {
    pub fn new(db_client: Arc<dyn SettlementStore>) -> Self {
        Self { db_client }
    }

    pub async fn start(
        &self,
        contract_id: Uuid,
        driver_user_id: Uuid,
        inspection_type: InspectionType,
    ) -> Result<TripInspection, ServiceError> {
        let contract = self
            .db_client
            .get_contract(contract_id)
            .await?
            .ok_or(ServiceError::ContractNotFound(contract_id))?;

        if contract.status != ContractStatus::Active {
            return Err(ServiceError::ContractNotActive { contract_id });
        }

        let (inspection, created) = self
            .db_client
            .start_inspection(contract_id, driver_user_id, inspection_type)
            .await?;

        if created {
            tracing::info!(
                contract_id = %contract_id,
                driver_user_id = %driver_user_id,
                inspection_id = %inspection.id,
                "Started {} inspection",
                inspection_type.to_str()
            );
        }

        Ok(inspection)
    }

    pub async fn complete(
        &self,
        inspection_id: Uuid,
        driver_user_id: Uuid,
        patch: InspectionPatch,
    ) -> Result<TripInspection, ServiceError> {
        let inspection = self
            .db_client
            .complete_inspection(inspection_id, driver_user_id, patch)
            .await?;

        tracing::info!(
            contract_id = %inspection.contract_id,
            inspection_id = %inspection.id,
            "Completed {} inspection",
            inspection.inspection_type.to_str()
        );

        Ok(inspection)
    }

    /// Flips the completed pre/post pair to `submitted`. Success authorizes
    /// payout preparation for the contract tree.
    pub async fn submit_for_payment(
        &self,
        contract_id: Uuid,
        driver_user_id: Uuid,
    ) -> Result<Vec<TripInspection>, ServiceError> {
        let submitted = self.db_client.submit_inspections(contract_id, driver_user_id).await?;

        tracing::info!(
            contract_id = %contract_id,
            driver_user_id = %driver_user_id,
            "Inspections submitted for payment"
        );

        Ok(submitted)
    }

    pub async fn get(&self, inspection_id: Uuid) -> Result<TripInspection, ServiceError> {
        self.db_client
            .get_inspection(inspection_id)
            .await?
            .ok_or(ServiceError::InspectionNotFound(inspection_id))
    }

    pub async fn list(
        &self,
        contract_id: Uuid,
        driver_user_id: Option<Uuid>,
    ) -> Result<Vec<TripInspection>, ServiceError> {
        let rows = self.db_client.list_inspections(&[contract_id]).await?;

        Ok(match driver_user_id {
            Some(driver) => rows.into_iter().filter(|i| i.driver_user_id == driver).collect(),
            None => rows,
        })
    }
}
