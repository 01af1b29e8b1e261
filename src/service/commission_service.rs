// service/commission_service.rs
use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::SettlementStore,
    models::contractmodel::{BillingCycle, CommissionOverride, CommissionType},
    service::error::ServiceError,
    utils::{currency::percent_of, decimal::PercentHelpers},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionSource {
    ContractOverride,
    RolePolicy,
}

/// A validated commission rule. Percentages are kept as basis points for the
/// arithmetic and as the stored decimal for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCommission {
    #[serde(rename = "type")]
    pub commission_type: CommissionType,
    pub percent: Option<BigDecimal>,
    pub fixed_amount: Option<i64>,
    pub source: CommissionSource,
    #[serde(skip)]
    bps: i64,
}

impl ResolvedCommission {
    pub fn from_fields(
        commission_type: CommissionType,
        percent: Option<&BigDecimal>,
        fixed_amount: Option<i64>,
        source: CommissionSource,
    ) -> Result<Self, ServiceError> {
        match commission_type {
            CommissionType::FixedAmount => {
                let amount = fixed_amount.ok_or_else(|| {
                    ServiceError::Validation("Fixed commission requires an amount".to_string())
                })?;
                if amount < 0 {
                    return Err(ServiceError::Validation(format!(
                        "Fixed commission amount must not be negative, got {}",
                        amount
                    )));
                }
                Ok(Self {
                    commission_type,
                    percent: None,
                    fixed_amount: Some(amount),
                    source,
                    bps: 0,
                })
            }
            CommissionType::Percentage => {
                let percent = percent.ok_or_else(|| {
                    ServiceError::Validation("Percentage commission requires a percent".to_string())
                })?;
                if !percent.is_valid_percent() {
                    return Err(ServiceError::Validation(format!(
                        "Commission percent must be within 0..=100 with at most two decimals, got {}",
                        percent
                    )));
                }
                let bps = percent.to_basis_points().unwrap_or_default();
                Ok(Self {
                    commission_type,
                    percent: Some(percent.clone()),
                    fixed_amount: None,
                    source,
                    bps,
                })
            }
        }
    }

    /// Commission owed on `share`. A fixed amount is charged as-is.
    pub fn commission_on(&self, share: i64) -> i64 {
        match self.commission_type {
            CommissionType::FixedAmount => self.fixed_amount.unwrap_or_default(),
            CommissionType::Percentage => percent_of(share, self.bps),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommissionPolicyResolver {
    db_client: Arc<dyn SettlementStore>,
}

impl CommissionPolicyResolver {
    pub fn new(db_client: Arc<dyn SettlementStore>) -> Self {
        Self { db_client }
    }

    /// An override with a commission type wins verbatim; otherwise the role
    /// policy for (role, billing cycle) applies. A missing policy is an error,
    /// never a silent zero.
    pub async fn resolve(
        &self,
        payee_role_id: Uuid,
        billing_cycle: BillingCycle,
        contract_override: Option<&CommissionOverride>,
    ) -> Result<ResolvedCommission, ServiceError> {
        if let Some(commission) = contract_override.filter(|o| o.is_set()) {
            if let Some(commission_type) = commission.commission_type {
                return ResolvedCommission::from_fields(
                    commission_type,
                    commission.percent.as_ref(),
                    commission.amount,
                    CommissionSource::ContractOverride,
                );
            }
        }

        let policy = self
            .db_client
            .get_role_commission(payee_role_id, billing_cycle)
            .await?
            .ok_or(ServiceError::PolicyNotFound {
                role_id: payee_role_id,
                billing_cycle,
            })?;

        ResolvedCommission::from_fields(
            policy.commission_type,
            policy.platform_commission_percent.as_ref(),
            policy.platform_commission_amount,
            CommissionSource::RolePolicy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{fixed_policy, percent_policy, Fixture};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_percentage_commission_rounds_half_even() {
        let c = ResolvedCommission::from_fields(
            CommissionType::Percentage,
            Some(&dec("12.5")),
            None,
            CommissionSource::RolePolicy,
        )
        .unwrap();

        assert_eq!(c.commission_on(10_000), 1_250);
        // 12.5% of 1 = 0.125 -> 0; of 4 = 0.5 -> 0; of 12 = 1.5 -> 2
        assert_eq!(c.commission_on(1), 0);
        assert_eq!(c.commission_on(4), 0);
        assert_eq!(c.commission_on(12), 2);
    }

    #[test]
    fn test_fixed_amount_short_circuits_percent() {
        let c = ResolvedCommission::from_fields(
            CommissionType::FixedAmount,
            Some(&dec("50")),
            Some(300),
            CommissionSource::ContractOverride,
        )
        .unwrap();

        assert_eq!(c.percent, None);
        assert_eq!(c.commission_on(10_000), 300);
        assert_eq!(c.commission_on(1_000_000), 300);
    }

    #[test]
    fn test_invalid_commission_fields_are_rejected() {
        for bad in ["-1", "100.01", "12.345"] {
            let err = ResolvedCommission::from_fields(
                CommissionType::Percentage,
                Some(&dec(bad)),
                None,
                CommissionSource::RolePolicy,
            )
            .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{}", bad);
        }

        let err = ResolvedCommission::from_fields(CommissionType::FixedAmount, None, Some(-5), CommissionSource::RolePolicy)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = ResolvedCommission::from_fields(CommissionType::Percentage, None, Some(5), CommissionSource::RolePolicy)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_override_wins_over_role_policy() {
        let fx = Fixture::new().await;
        let resolver = CommissionPolicyResolver::new(fx.store());

        let over = CommissionOverride {
            commission_type: Some(CommissionType::Percentage),
            percent: Some(dec("3")),
            amount: None,
        };
        let c = resolver
            .resolve(fx.carrier_role, BillingCycle::Weekly, Some(&over))
            .await
            .unwrap();
        assert_eq!(c.source, CommissionSource::ContractOverride);
        assert_eq!(c.commission_on(1_000), 30);

        // An override without a type falls through to the role policy.
        let unset = CommissionOverride {
            commission_type: None,
            percent: Some(dec("3")),
            amount: None,
        };
        let c = resolver
            .resolve(fx.carrier_role, BillingCycle::Weekly, Some(&unset))
            .await
            .unwrap();
        assert_eq!(c.source, CommissionSource::RolePolicy);
        assert_eq!(c.commission_on(1_000), 100);
    }

    #[tokio::test]
    async fn test_policy_is_keyed_by_role_and_billing_cycle() {
        let fx = Fixture::new().await;
        let resolver = CommissionPolicyResolver::new(fx.store());
        let role = Uuid::new_v4();
        fx.store.insert_role_commission(percent_policy(role, BillingCycle::Hourly, "20")).await;
        fx.store.insert_role_commission(fixed_policy(role, BillingCycle::Monthly, 700)).await;

        let hourly = resolver.resolve(role, BillingCycle::Hourly, None).await.unwrap();
        assert_eq!(hourly.commission_on(1_000), 200);

        let monthly = resolver.resolve(role, BillingCycle::Monthly, None).await.unwrap();
        assert_eq!(monthly.commission_on(1_000), 700);

        let err = resolver.resolve(role, BillingCycle::Weekly, None).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::PolicyNotFound { role_id, billing_cycle: BillingCycle::Weekly } if role_id == role
        ));
    }
}
