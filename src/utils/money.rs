use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Quantize to two decimal places, half-up, scale pinned to 2 so the
/// serialized form is stable. Applied at every persistence boundary so
/// regeneration stays byte-identical.
pub fn round2(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

pub fn percent_of(base: Decimal, rate: Decimal) -> Decimal {
    base * rate / dec!(100)
}
