/// Currency utility functions for settlement amounts.
///
/// All monetary values are carried as i64 minor units (1 unit = 100 minor units)
/// so split and commission arithmetic never touches floating point.

/// Basis points in one whole (100.00%).
pub const BPS_SCALE: i64 = 10_000;

/// Computes `value * numerator / denominator`, rounding half to even on the
/// final minor unit. The product is taken in i128 so large amounts cannot overflow.
pub fn mul_div_half_even(value: i64, numerator: i64, denominator: i64) -> i64 {
    debug_assert!(denominator != 0, "denominator must be non-zero");

    let product = value as i128 * numerator as i128;
    let denominator = denominator as i128;
    let negative = (product < 0) != (denominator < 0);
    let (product, denominator) = (product.abs(), denominator.abs());

    let mut quotient = product / denominator;
    let twice_remainder = (product % denominator) * 2;
    if twice_remainder > denominator || (twice_remainder == denominator && quotient % 2 == 1) {
        quotient += 1;
    }

    let quotient = if negative { -quotient } else { quotient };
    quotient as i64
}

/// Share of `amount` for a percentage expressed in basis points.
pub fn percent_of(amount: i64, bps: i64) -> i64 {
    mul_div_half_even(amount, bps, BPS_SCALE)
}

/// Format minor units with two decimal places, e.g. `12345` -> `"123.45"`.
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
