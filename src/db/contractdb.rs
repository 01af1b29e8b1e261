// db/contractdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::db::{DBClient, CONTRACT_COLUMNS, ESCROW_COLUMNS, SUB_CONTRACT_COLUMNS};
use super::ContractExt;
use crate::models::{contractmodel::*, escrowmodel::Escrow};
use crate::service::{
    contract_graph::{check_tree_open, plan_split},
    error::ServiceError,
};

#[async_trait]
impl ContractExt for DBClient {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, ServiceError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, owner_user_id, status, assignment_type, parent_job_id, created_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, ServiceError> {
        let contract = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {} FROM contracts WHERE id = $1",
            CONTRACT_COLUMNS
        ))
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contract)
    }

    async fn get_contracts(&self, contract_ids: &[Uuid]) -> Result<Vec<Contract>, ServiceError> {
        if contract_ids.is_empty() {
            return Ok(Vec::new());
        }

        let contracts = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {} FROM contracts WHERE id = ANY($1) ORDER BY created_at ASC",
            CONTRACT_COLUMNS
        ))
        .bind(contract_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(contracts)
    }

    async fn get_sub_contract_links_by_root(
        &self,
        root_contract_id: Uuid,
    ) -> Result<Vec<SubContractLink>, ServiceError> {
        let links = sqlx::query_as::<_, SubContractLink>(&format!(
            "SELECT {} FROM sub_contracts WHERE root_contract_id = $1 ORDER BY created_at ASC, id ASC",
            SUB_CONTRACT_COLUMNS
        ))
        .bind(root_contract_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(links)
    }

    async fn create_sub_contract(
        &self,
        new_sub_contract: NewSubContract,
    ) -> Result<(SubContractLink, Contract), ServiceError> {
        let mut tx = self.pool.begin().await?;

        // Lock order: reshared job, parent contract, then the tree's escrows.
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, owner_user_id, status, assignment_type, parent_job_id, created_at
            FROM jobs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(new_sub_contract.reshared_job_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::JobNotFound(new_sub_contract.reshared_job_id))?;

        let parent = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {} FROM contracts WHERE id = $1 FOR UPDATE",
            CONTRACT_COLUMNS
        ))
        .bind(new_sub_contract.parent_contract.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ServiceError::ContractNotFound(new_sub_contract.parent_contract.id))?;

        let root_job_id = sqlx::query_scalar::<_, Uuid>("SELECT job_id FROM contracts WHERE id = $1")
            .bind(new_sub_contract.root_contract_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::ContractNotFound(new_sub_contract.root_contract_id))?;

        // Then every escrow of the tree, so a re-share and payout preparation
        // never interleave.
        let escrows = sqlx::query_as::<_, Escrow>(&format!(
            "SELECT {} FROM escrows WHERE contract_id = $1 OR job_id = $2 ORDER BY id FOR UPDATE",
            ESCROW_COLUMNS
        ))
        .bind(new_sub_contract.root_contract_id)
        .bind(root_job_id)
        .fetch_all(&mut *tx)
        .await?;

        let payout_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contract_payouts WHERE root_contract_id = $1")
                .bind(new_sub_contract.root_contract_id)
                .fetch_one(&mut *tx)
                .await?;

        check_tree_open(new_sub_contract.root_contract_id, &escrows, payout_count as usize)?;

        let job_links = sqlx::query_as::<_, SubContractLink>(&format!(
            "SELECT {} FROM sub_contracts WHERE reshared_job_id = $1",
            SUB_CONTRACT_COLUMNS
        ))
        .bind(job.id)
        .fetch_all(&mut *tx)
        .await?;

        let parent_links = sqlx::query_as::<_, SubContractLink>(&format!(
            "SELECT {} FROM sub_contracts WHERE parent_contract_id = $1",
            SUB_CONTRACT_COLUMNS
        ))
        .bind(parent.id)
        .fetch_all(&mut *tx)
        .await?;

        let split_amount = plan_split(
            &parent,
            &job,
            &job_links,
            &parent_links,
            &new_sub_contract.split_percentage,
            new_sub_contract.split_bps,
        )?;

        let child = sqlx::query_as::<_, Contract>(&format!(
            r#"
            INSERT INTO contracts
                (job_id, hired_user_id, parent_contract_id, status, gross_amount, billing_cycle,
                 platform_commission_percent, platform_commission_amount, commission_type, start_date)
            VALUES ($1, $2, $3, 'active', $4, $5, $6, $7, $8, NOW())
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        ))
        .bind(job.id)
        .bind(new_sub_contract.recipient_user_id)
        .bind(parent.id)
        .bind(split_amount)
        .bind(parent.billing_cycle)
        .bind(new_sub_contract.commission.percent.clone())
        .bind(new_sub_contract.commission.amount)
        .bind(new_sub_contract.commission.commission_type)
        .fetch_one(&mut *tx)
        .await?;

        let link = sqlx::query_as::<_, SubContractLink>(&format!(
            r#"
            INSERT INTO sub_contracts
                (root_contract_id, parent_contract_id, sub_contract_id, reshared_job_id,
                 split_percentage, split_amount, platform_commission_percent,
                 platform_commission_amount, commission_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            SUB_CONTRACT_COLUMNS
        ))
        .bind(new_sub_contract.root_contract_id)
        .bind(parent.id)
        .bind(child.id)
        .bind(job.id)
        .bind(new_sub_contract.split_percentage)
        .bind(split_amount)
        .bind(new_sub_contract.commission.percent)
        .bind(new_sub_contract.commission.amount)
        .bind(new_sub_contract.commission.commission_type)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((link, child))
    }

    async fn get_user_role(&self, user_id: Uuid) -> Result<Option<Uuid>, ServiceError> {
        let role_id = sqlx::query_scalar::<_, Option<Uuid>>("SELECT role_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .flatten();

        Ok(role_id)
    }
}
