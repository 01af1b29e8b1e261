use async_trait::async_trait;
use uuid::Uuid;

use super::db::{DBClient, INSPECTION_COLUMNS};
use super::InspectionExt;
use crate::models::inspectionmodel::*;
use crate::service::{
    error::ServiceError,
    inspection_service::{check_completion, plan_start, select_submission_pair},
};

/// Serializes every mutation on one (contract, driver) inspection pair. Rows
/// may not exist yet when `start` runs, so a row lock is not enough.
async fn lock_inspection_pair(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contract_id: Uuid,
    driver_user_id: Uuid,
) -> Result<(), ServiceError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("trip_inspection:{}:{}", contract_id, driver_user_id))
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn pair_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contract_id: Uuid,
    driver_user_id: Uuid,
) -> Result<Vec<TripInspection>, ServiceError> {
    let rows = sqlx::query_as::<_, TripInspection>(&format!(
        r#"
        SELECT {} FROM trip_inspections
        WHERE contract_id = $1 AND driver_user_id = $2
        ORDER BY started_at ASC
        FOR UPDATE
        "#,
        INSPECTION_COLUMNS
    ))
    .bind(contract_id)
    .bind(driver_user_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows)
}

#[async_trait]
impl InspectionExt for DBClient {
    async fn start_inspection(
        &self,
        contract_id: Uuid,
        driver_user_id: Uuid,
        inspection_type: InspectionType,
    ) -> Result<(TripInspection, bool), ServiceError> {
        let mut tx = self.pool.begin().await?;
        lock_inspection_pair(&mut tx, contract_id, driver_user_id).await?;

        let existing = pair_rows(&mut tx, contract_id, driver_user_id).await?;
        if let Some(open) = plan_start(contract_id, driver_user_id, inspection_type, &existing)? {
            tx.commit().await?;
            return Ok((open, false));
        }

        let inspection = sqlx::query_as::<_, TripInspection>(&format!(
            r#"
            INSERT INTO trip_inspections (contract_id, inspection_type, driver_user_id, status, started_at)
            VALUES ($1, $2, $3, 'started', NOW())
            RETURNING {}
            "#,
            INSPECTION_COLUMNS
        ))
        .bind(contract_id)
        .bind(inspection_type)
        .bind(driver_user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((inspection, true))
    }

    async fn get_inspection(&self, inspection_id: Uuid) -> Result<Option<TripInspection>, ServiceError> {
        let inspection = sqlx::query_as::<_, TripInspection>(&format!(
            "SELECT {} FROM trip_inspections WHERE id = $1",
            INSPECTION_COLUMNS
        ))
        .bind(inspection_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inspection)
    }

    async fn complete_inspection(
        &self,
        inspection_id: Uuid,
        driver_user_id: Uuid,
        patch: InspectionPatch,
    ) -> Result<TripInspection, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let mut inspection = sqlx::query_as::<_, TripInspection>(&format!(
            "SELECT {} FROM trip_inspections WHERE id = $1 FOR UPDATE",
            INSPECTION_COLUMNS
        ))
        .bind(inspection_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::InspectionNotFound(inspection_id))?;

        check_completion(&inspection, driver_user_id)?;
        inspection.apply_patch(patch);

        let inspection = sqlx::query_as::<_, TripInspection>(&format!(
            r#"
            UPDATE trip_inspections
            SET data = $2, defects = $3, photos = $4, pod_photo = $5,
                status = 'completed', completed_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            INSPECTION_COLUMNS
        ))
        .bind(inspection.id)
        .bind(inspection.data)
        .bind(inspection.defects)
        .bind(inspection.photos)
        .bind(inspection.pod_photo)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(inspection)
    }

    async fn submit_inspections(
        &self,
        contract_id: Uuid,
        driver_user_id: Uuid,
    ) -> Result<Vec<TripInspection>, ServiceError> {
        let mut tx = self.pool.begin().await?;
        lock_inspection_pair(&mut tx, contract_id, driver_user_id).await?;

        let rows = pair_rows(&mut tx, contract_id, driver_user_id).await?;
        let [pre_id, post_id] = select_submission_pair(contract_id, driver_user_id, &rows)?;

        let submitted = sqlx::query_as::<_, TripInspection>(&format!(
            r#"
            UPDATE trip_inspections
            SET status = 'submitted', submitted_at = NOW()
            WHERE id = ANY($1)
            RETURNING {}
            "#,
            INSPECTION_COLUMNS
        ))
        .bind(vec![pre_id, post_id])
        .fetch_all(&mut *tx)
        .await?;

        if submitted.len() != 2 {
            // Rolled back on drop.
            return Err(ServiceError::DataIntegrity(format!(
                "expected to submit 2 inspections for contract {} driver {}, updated {}",
                contract_id,
                driver_user_id,
                submitted.len()
            )));
        }

        tx.commit().await?;

        Ok(submitted)
    }

    async fn list_inspections(&self, contract_ids: &[Uuid]) -> Result<Vec<TripInspection>, ServiceError> {
        if contract_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, TripInspection>(&format!(
            "SELECT {} FROM trip_inspections WHERE contract_id = ANY($1) ORDER BY started_at ASC",
            INSPECTION_COLUMNS
        ))
        .bind(contract_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
