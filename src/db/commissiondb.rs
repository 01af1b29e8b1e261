use async_trait::async_trait;
use uuid::Uuid;

use super::db::DBClient;
use super::CommissionExt;
use crate::models::contractmodel::{BillingCycle, RoleCommissionPolicy};
use crate::service::error::ServiceError;

#[async_trait]
impl CommissionExt for DBClient {
    async fn get_role_commission(
        &self,
        role_id: Uuid,
        billing_cycle: BillingCycle,
    ) -> Result<Option<RoleCommissionPolicy>, ServiceError> {
        let policy = sqlx::query_as::<_, RoleCommissionPolicy>(
            r#"
            SELECT id, role_id, billing_cycle, platform_commission_percent,
                   platform_commission_amount, commission_type
            FROM role_commissions
            WHERE role_id = $1 AND billing_cycle = $2
            "#,
        )
        .bind(role_id)
        .bind(billing_cycle)
        .fetch_optional(&self.pool)
        .await?;

        Ok(policy)
    }
}
