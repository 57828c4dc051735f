//! 고정 소수점 반올림 헬퍼.
//!
//! 모든 금액/수량은 8자리 소수점 정밀도를 가집니다. 연산별로 반올림
//! 모드가 다릅니다:
//!
//! - 수수료/평가 집계: 반올림 (half-up, [`round_amount`])
//! - 예약/지출 자본: 올림 ([`round_reservation`]) — 예약이 실제 비용보다
//!   작아지는 일이 없도록 합니다.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// 금액/수량 소수점 자릿수
pub const AMOUNT_SCALE: u32 = 8;

/// 집계용 반올림 (half-up, 8자리)
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// 예약/지출용 올림 (8자리)
pub fn round_reservation(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::AwayFromZero)
}

/// 수수료 계산: base × rate(%) / 100, half-up 8자리
pub fn fee_amount(base: Decimal, rate_percent: Decimal) -> Decimal {
    round_amount(base * rate_percent / dec!(100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_amount_half_up() {
        assert_eq!(round_amount(dec!(0.000000015)), dec!(0.00000002));
        assert_eq!(round_amount(dec!(0.000000014)), dec!(0.00000001));
    }

    #[test]
    fn test_round_reservation_never_under() {
        assert_eq!(round_reservation(dec!(0.000000011)), dec!(0.00000002));
        assert_eq!(round_reservation(dec!(0.00000001)), dec!(0.00000001));
    }

    #[test]
    fn test_fee_amount() {
        // 수량 10, taker 5% ⇒ 0.5
        assert_eq!(fee_amount(dec!(10), dec!(5)), dec!(0.5));
        // 수량 10 × 가격 4, taker 5% ⇒ 2.0
        assert_eq!(fee_amount(dec!(40), dec!(5)), dec!(2.0));
    }
}
