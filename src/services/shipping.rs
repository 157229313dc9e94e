//! Shipping fee calculation.

use rust_decimal::{Decimal, RoundingStrategy};

/// Orders at or above this subtotal ship free.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(1_200_000, 0, 0, false, 0);
pub const BASE_SHIPPING_FEE: Decimal = Decimal::from_parts(45_000, 0, 0, false, 0);
/// 1.2
pub const REMOTE_SURCHARGE_FACTOR: Decimal = Decimal::from_parts(12, 0, 0, false, 1);

pub const REMOTE_PROVINCES: [&str; 4] = ["سیستان و بلوچستان", "کهگیلویه و بویراحمد", "ایلام", "خراسان جنوبی"];

pub fn is_remote_province(province: &str) -> bool {
    REMOTE_PROVINCES.contains(&province.trim())
}

pub fn calc_shipping(subtotal: Decimal, province: &str) -> Decimal {
    if subtotal >= FREE_SHIPPING_THRESHOLD {
        return Decimal::ZERO;
    }
    if is_remote_province(province) {
        (BASE_SHIPPING_FEE * REMOTE_SURCHARGE_FACTOR).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
    } else {
        BASE_SHIPPING_FEE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_free_above_threshold() {
        for subtotal in [dec!(1200000), dec!(1200000.01), dec!(9000000)] {
            assert_eq!(calc_shipping(subtotal, "تهران"), Decimal::ZERO);
            assert_eq!(calc_shipping(subtotal, "ایلام"), Decimal::ZERO);
        }
    }

    #[test]
    fn test_base_and_remote_fee() {
        assert_eq!(calc_shipping(Decimal::ZERO, "تهران"), dec!(45000));
        assert_eq!(calc_shipping(Decimal::ZERO, "سیستان و بلوچستان"), dec!(54000));
        assert_eq!(calc_shipping(dec!(1199999.99), "خراسان جنوبی"), dec!(54000));
    }

    #[test]
    fn test_constants() {
        assert_eq!(FREE_SHIPPING_THRESHOLD, dec!(1200000));
        assert_eq!(REMOTE_SURCHARGE_FACTOR, dec!(1.2));
    }
}
