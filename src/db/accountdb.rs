use async_trait::async_trait;
use uuid::Uuid;

use super::db::DBClient;
use crate::service::{error::ServiceError, payment_provider::AccountRegistry};

#[async_trait]
impl AccountRegistry for DBClient {
    async fn destination_account(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        let account_id = sqlx::query_scalar::<_, String>(
            r#"
            SELECT external_account_id
            FROM connected_accounts
            WHERE user_id = $1 AND payouts_enabled = TRUE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account_id)
    }
}
