//! 전략 인터페이스.
//!
//! 엔진은 캔들마다 전략 콜백을 호출하며, 최근 캔들과 현재 원장
//! 스냅샷이 담긴 읽기 전용 뷰를 넘기고 신규 주문 요청 목록을
//! 돌려받습니다. 전략 스크립팅/샌드박싱은 이 크레이트 밖의
//! 협력자입니다.

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use backtest_core::{
    round_amount, Kline, Order, OrderIntent, OrderKind, StrategyModule, AMOUNT_SCALE,
};

/// 전략이 반환하는 주문 요청
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub intent: OrderIntent,
    pub kind: OrderKind,
    pub quantity: Decimal,
}

/// 전략에 제공되는 읽기 전용 뷰
pub struct StrategyView<'a> {
    /// 현재 캔들까지의 전체 스트림 (마지막이 현재 캔들)
    pub klines: &'a [Kline],
    /// 원장 스냅샷
    pub module: &'a StrategyModule,
    /// 대기 중인 주문
    pub open_orders: Vec<Order>,
}

impl StrategyView<'_> {
    pub fn current(&self) -> Option<&Kline> {
        self.klines.last()
    }
}

/// 전략 에러 (콜백 내부 실패)
pub type StrategyError = Box<dyn std::error::Error + Send + Sync>;

/// 캔들 단위 전략 콜백
#[async_trait]
pub trait Strategy: Send {
    async fn on_kline(&mut self, view: &StrategyView<'_>)
        -> Result<Vec<OrderRequest>, StrategyError>;
}

// ==================== 내장 SMA 교차 전략 ====================

/// 단순 이동평균 교차 전략.
///
/// 골든 크로스에 가용 자본의 일정 비율로 시장가 진입, 데드 크로스에
/// 전량 시장가 청산합니다.
pub struct SmaCrossStrategy {
    fast_period: usize,
    slow_period: usize,
    position_fraction: Decimal,
    was_fast_above: Option<bool>,
}

impl SmaCrossStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            position_fraction: dec!(0.5),
            was_fast_above: None,
        }
    }

    pub fn with_position_fraction(mut self, fraction: Decimal) -> Self {
        self.position_fraction = fraction;
        self
    }

    fn sma(klines: &[Kline], period: usize) -> Option<Decimal> {
        if klines.len() < period || period == 0 {
            return None;
        }
        let sum: Decimal = klines[klines.len() - period..]
            .iter()
            .map(|k| k.close)
            .sum();
        Some(sum / Decimal::from(period as u64))
    }
}

#[async_trait]
impl Strategy for SmaCrossStrategy {
    async fn on_kline(
        &mut self,
        view: &StrategyView<'_>,
    ) -> Result<Vec<OrderRequest>, StrategyError> {
        let (fast, slow) = match (
            Self::sma(view.klines, self.fast_period),
            Self::sma(view.klines, self.slow_period),
        ) {
            (Some(fast), Some(slow)) => (fast, slow),
            _ => return Ok(Vec::new()),
        };
        let fast_above = fast > slow;
        let previous = self.was_fast_above.replace(fast_above);

        let current = match view.current() {
            Some(kline) => kline,
            None => return Ok(Vec::new()),
        };

        match previous {
            // 골든 크로스: 보유가 없고 대기 주문도 없으면 진입
            Some(false) if fast_above => {
                if view.module.available_asset_qty > Decimal::ZERO
                    || !view.open_orders.is_empty()
                {
                    return Ok(Vec::new());
                }
                let budget = round_amount(view.module.available_capital * self.position_fraction);
                let quantity = (budget / current.close)
                    .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero);
                if quantity <= Decimal::ZERO {
                    return Ok(Vec::new());
                }
                Ok(vec![OrderRequest {
                    intent: OrderIntent::Entry,
                    kind: OrderKind::Market,
                    quantity,
                }])
            }
            // 데드 크로스: 전량 청산
            Some(true) if !fast_above => {
                let quantity = view.module.available_asset_qty;
                if quantity <= Decimal::ZERO {
                    return Ok(Vec::new());
                }
                Ok(vec![OrderRequest {
                    intent: OrderIntent::Exit,
                    kind: OrderKind::Market,
                    quantity,
                }])
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backtest_core::Timeframe;
    use chrono::{TimeZone, Utc};

    fn klines_with_closes(closes: &[Decimal]) -> Vec<Kline> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Kline {
                exchange: "binance".to_string(),
                symbol: "BTCUSDT".to_string(),
                timeframe: Timeframe::H1,
                open_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64),
                close_time: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64),
                open: *close,
                high: *close + dec!(1),
                low: *close - dec!(1),
                close: *close,
                volume: dec!(1),
                quote_volume: None,
                num_trades: None,
            })
            .collect()
    }

    #[test]
    fn test_sma() {
        let klines = klines_with_closes(&[dec!(10), dec!(20), dec!(30)]);
        assert_eq!(SmaCrossStrategy::sma(&klines, 2), Some(dec!(25)));
        assert_eq!(SmaCrossStrategy::sma(&klines, 3), Some(dec!(20)));
        assert_eq!(SmaCrossStrategy::sma(&klines, 4), None);
    }

    #[tokio::test]
    async fn test_golden_cross_emits_entry() {
        let mut strategy = SmaCrossStrategy::new(1, 3);
        let module = StrategyModule::new(dec!(1000));
        // 하락 후 급등: fast(1) < slow(3) → fast > slow 전환
        let klines = klines_with_closes(&[dec!(100), dec!(90), dec!(80), dec!(120)]);

        let mut requests = Vec::new();
        for i in 3..=4 {
            let view = StrategyView {
                klines: &klines[..i.min(klines.len())],
                module: &module,
                open_orders: Vec::new(),
            };
            requests = strategy.on_kline(&view).await.unwrap();
        }
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].intent, OrderIntent::Entry);
        assert!(matches!(requests[0].kind, OrderKind::Market));
    }
}
