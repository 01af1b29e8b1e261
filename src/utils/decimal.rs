use bigdecimal::BigDecimal;
use num_traits::ToPrimitive;

use crate::utils::currency::BPS_SCALE;

pub trait PercentHelpers {
    /// Percent value (e.g. `12.5`) as basis points (`1250`). `None` when the
    /// value carries more than two decimal places.
    fn to_basis_points(&self) -> Option<i64>;

    /// True for values within `0..=100`.
    fn is_valid_percent(&self) -> bool;
}

impl PercentHelpers for BigDecimal {
    fn to_basis_points(&self) -> Option<i64> {
        let scaled = self * BigDecimal::from(100);
        if !scaled.is_integer() {
            return None;
        }
        scaled.to_i64()
    }

    fn is_valid_percent(&self) -> bool {
        self.to_basis_points()
            .map(|bps| (0..=BPS_SCALE).contains(&bps))
            .unwrap_or(false)
    }
}

pub fn bps_to_percent(bps: i64) -> BigDecimal {
    BigDecimal::from(bps) / BigDecimal::from(100)
}
