//! 백테스트 실행 루프.
//!
//! 캔들을 시간 순서로 하나씩 처리합니다. 캔들 하나의 처리 순서:
//!
//! 1. 대기 주문 체결 판정 → 원장 적용 (회계 거부는 해당 주문만 거부)
//! 2. 열린 거래 평가/자본 곡선 갱신
//! 3. 전략 콜백 호출, 신규 주문 접수 (시장가/크로스 지정가는 즉시 체결)
//! 4. 재평가 + 진행률 보고
//!
//! 범위 종료 시 남은 대기 주문은 취소되고, 열린 거래는 마지막 캔들
//! 종가에 합성 MARKET 청산으로 닫힙니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use backtest_core::{
    round_reservation, Kline, Order, OrderIntent, OrderKind, StrategyModule, Trade,
};

use crate::config::BacktestConfig;
use crate::error::{EngineError, EngineResult};
use crate::matching::{AdmitResult, FillCandidate, MatchingEngine};
use crate::portfolio::Portfolio;
use crate::strategy::{OrderRequest, Strategy, StrategyView};

/// 백테스트 결과 리포트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    /// 터미널 상태에 도달한 모든 주문
    pub orders: Vec<Order>,
    /// 마감된 거래 (FIFO 순서)
    pub trades: Vec<Trade>,
    /// 최종 원장 스냅샷
    pub module: StrategyModule,
    pub kline_count: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 백테스트 엔진
pub struct BacktestEngine {
    config: BacktestConfig,
    matching: MatchingEngine,
    portfolio: Portfolio,
    orders: Vec<Order>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> EngineResult<Self> {
        config.validate()?;
        let portfolio = Portfolio::new(
            config.initial_capital,
            config.maker_fee_rate,
            config.taker_fee_rate,
        );
        Ok(Self {
            config,
            matching: MatchingEngine::new(),
            portfolio,
            orders: Vec::new(),
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// 캔들 스트림 전체를 실행하고 리포트를 반환합니다.
    ///
    /// `progress`는 캔들 하나가 끝날 때마다 0~100 진행률로 호출됩니다.
    #[instrument(skip_all, fields(klines = klines.len()))]
    pub async fn run<S, F>(
        &mut self,
        strategy: &mut S,
        klines: &[Kline],
        mut progress: F,
    ) -> EngineResult<BacktestReport>
    where
        S: Strategy,
        F: FnMut(u8) + Send,
    {
        let (first, last) = match (klines.first(), klines.last()) {
            (Some(first), Some(last)) => (first.clone(), last.clone()),
            _ => return Err(EngineError::Data("캔들 스트림이 비어 있음".to_string())),
        };

        let total = klines.len();
        for (index, kline) in klines.iter().enumerate() {
            kline.validate()?;
            self.process_kline(strategy, klines, index).await?;
            progress((((index + 1) * 100) / total) as u8);
        }

        self.finish(&last)?;

        info!(
            orders = self.orders.len(),
            trades = self.portfolio.closed_trades().len(),
            equity = %self.portfolio.module().equity,
            "백테스트 완료"
        );
        Ok(BacktestReport {
            orders: self.orders.clone(),
            trades: self.portfolio.closed_trades().to_vec(),
            module: self.portfolio.module().clone(),
            kline_count: total,
            start: first.open_time,
            end: last.close_time,
        })
    }

    async fn process_kline<S: Strategy>(
        &mut self,
        strategy: &mut S,
        klines: &[Kline],
        index: usize,
    ) -> EngineResult<()> {
        let kline = &klines[index];

        // 1. 대기 주문 판정 (접수 순서 = 판정 순서)
        for candidate in self.matching.on_kline(kline) {
            self.settle(candidate, kline);
        }

        // 2. 평가 갱신
        self.portfolio.mark(kline);

        // 3. 전략 호출
        let requests = {
            let view = StrategyView {
                klines: &klines[..=index],
                module: self.portfolio.module(),
                open_orders: self.matching.open_orders(),
            };
            strategy
                .on_kline(&view)
                .await
                .map_err(|e| EngineError::Strategy(e.to_string()))?
        };

        // 4. 신규 주문 접수
        for request in requests {
            self.admit_request(request, kline);
        }

        // 5. 즉시 체결분 반영 후 재평가
        self.portfolio.mark(kline);
        Ok(())
    }

    /// 주문 요청 접수: 검증 → 예약 → book 등록 또는 즉시 체결.
    fn admit_request(&mut self, request: OrderRequest, kline: &Kline) {
        let order = match Order::new(
            request.intent,
            request.kind,
            request.quantity,
            kline.close_time,
        ) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "주문 요청 검증 실패, 무시");
                return;
            }
        };

        if let OrderKind::Cancel { target_id } = &order.kind {
            let target_id = *target_id;
            self.apply_cancel(order, target_id, kline);
            return;
        }

        // 예약량: 진입은 최악 체결가 기준 자본(올림), 청산은 수량
        let est_price = match &order.kind {
            OrderKind::Market => kline.close,
            OrderKind::Limit { price } => *price,
            OrderKind::StopMarket { stop_price } => *stop_price,
            OrderKind::StopLimit { limit_price, .. } => *limit_price,
            OrderKind::Cancel { .. } => kline.close,
        };
        let reserved = match order.intent {
            OrderIntent::Entry => round_reservation(order.quantity * est_price),
            OrderIntent::Exit => order.quantity,
        };

        let mut order = order;
        if let Err(e) = self.portfolio.reserve_for(&order, reserved) {
            warn!(order_id = %order.id, error = %e, "예약 실패, 주문 거부");
            order.reject(e.to_string());
            self.orders.push(order);
            return;
        }

        order.submit(kline.close_time);
        match self.matching.admit(order, reserved, kline) {
            AdmitResult::Rested => {}
            AdmitResult::Immediate(candidate) => self.settle(candidate, kline),
        }
    }

    /// 체결 후보를 원장에 적용합니다. 회계 거부 시 예약을 돌려주고
    /// 해당 주문만 REJECTED 처리하며 실행은 계속됩니다.
    fn settle(&mut self, candidate: FillCandidate, kline: &Kline) {
        match self.portfolio.apply_fill(candidate, kline.close_time) {
            Ok(order) => self.orders.push(order),
            Err((candidate, e)) => {
                warn!(order_id = %candidate.order.id, error = %e, "회계 거부");
                self.portfolio
                    .release_for(candidate.order.intent, candidate.reserved);
                let mut order = candidate.order;
                order.reject(e.to_string());
                self.orders.push(order);
            }
        }
    }

    fn apply_cancel(&mut self, mut cancel_order: Order, target_id: Uuid, kline: &Kline) {
        cancel_order.submit(kline.close_time);
        match self.matching.cancel(target_id, kline.close_time) {
            Some(resting) => {
                self.portfolio
                    .release_for(resting.order.intent, resting.reserved);
                self.orders.push(resting.order);
                cancel_order.complete(kline.close_time);
            }
            None => cancel_order.reject("취소 대상 주문을 찾을 수 없음"),
        }
        self.orders.push(cancel_order);
    }

    /// 종료 처리: 대기 주문 취소, 강제 청산, 최종 평가.
    fn finish(&mut self, last: &Kline) -> EngineResult<()> {
        for resting in self.matching.drain() {
            let mut order = resting.order;
            self.portfolio.release_for(order.intent, resting.reserved);
            order.cancel(last.close_time);
            self.orders.push(order);
        }

        if let Some(exit) = self.portfolio.force_close_all(last)? {
            info!(order_id = %exit.id, price = %last.close, "범위 종료 강제 청산");
            self.orders.push(exit);
        }

        self.portfolio.mark(last);
        Ok(())
    }
}

// ==================== 테스트 전략 ====================


#[cfg(test)]
mod tests {
    use super::test_strategies::ScriptedStrategy;
    use super::*;
    use async_trait::async_trait;
    use backtest_core::{OrderStatus, Timeframe};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    use crate::strategy::StrategyError;

    fn create_test_klines(count: usize, start_price: Decimal, trend: Decimal) -> Vec<Kline> {
        (0..count)
            .map(|i| {
                let price = start_price + trend * Decimal::from(i as u64);
                Kline {
                    exchange: "binance".to_string(),
                    symbol: "BTCUSDT".to_string(),
                    timeframe: Timeframe::H1,
                    open_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                        + chrono::Duration::hours(i as i64),
                    close_time: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()
                        + chrono::Duration::hours(i as i64),
                    open: price,
                    high: price + dec!(2),
                    low: price - dec!(2),
                    close: price,
                    volume: dec!(10),
                    quote_volume: None,
                    num_trades: None,
                }
            })
            .collect()
    }

    fn entry(kind: OrderKind, quantity: Decimal) -> OrderRequest {
        OrderRequest {
            intent: OrderIntent::Entry,
            kind,
            quantity,
        }
    }

    fn zero_fee_config() -> BacktestConfig {
        BacktestConfig::default()
            .with_initial_capital(dec!(10000))
            .with_fee_rates(dec!(0), dec!(0))
    }

    #[tokio::test]
    async fn test_market_entry_and_forced_liquidation() {
        let mut engine = BacktestEngine::new(zero_fee_config()).unwrap();
        let mut strategy = ScriptedStrategy::new(HashMap::from([(
            0usize,
            vec![entry(OrderKind::Market, dec!(1))],
        )]));
        // 종가 100 → 104
        let klines = create_test_klines(5, dec!(100), dec!(1));

        let report = engine.run(&mut strategy, &klines, |_| {}).await.unwrap();

        // 진입 체결 + 강제 청산
        assert_eq!(report.orders.len(), 2);
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].realized_return, Some(dec!(4)));
        assert_eq!(report.module.available_asset_qty, dec!(0));
        assert_eq!(report.module.available_capital, dec!(10004));
        assert_eq!(report.module.equity, dec!(10004));
    }

    #[tokio::test]
    async fn test_resting_limit_fills_as_maker() {
        let config = BacktestConfig::default().with_fee_rates(dec!(1), dec!(2));
        let mut engine = BacktestEngine::new(config).unwrap();
        // 종가 100에서 지정가 95 진입 → 크로스 아님, 대기
        let mut strategy = ScriptedStrategy::new(HashMap::from([(
            0usize,
            vec![entry(OrderKind::Limit { price: dec!(95) }, dec!(10))],
        )]));
        // 하락 추세: 두 번째 캔들 범위 [96,100]... 세 번째에서 95 터치
        let klines = create_test_klines(4, dec!(100), dec!(-3));

        let report = engine.run(&mut strategy, &klines, |_| {}).await.unwrap();

        let fill = report
            .orders
            .iter()
            .find(|o| o.status == OrderStatus::Filled && o.intent == OrderIntent::Entry)
            .unwrap();
        assert_eq!(fill.filled_price, Some(dec!(95)));
        // 메이커 1%: 10 × 1% = 0.1 (자산 통화)
        assert_eq!(fill.fee, Some(dec!(0.1)));
        assert_eq!(report.module.fees.asset, dec!(0.1));
    }

    /// 크로스 지정가 수수료 예시: 수량 10, 지정가 5, 체결가 4, 테이커 5%
    #[tokio::test]
    async fn test_crossed_limit_pays_taker() {
        let config = BacktestConfig::default()
            .with_initial_capital(dec!(1000))
            .with_fee_rates(dec!(1), dec!(5));
        let mut engine = BacktestEngine::new(config).unwrap();
        let mut strategy = ScriptedStrategy::new(HashMap::from([(
            0usize,
            vec![entry(OrderKind::Limit { price: dec!(5) }, dec!(10))],
        )]));
        let klines = create_test_klines(2, dec!(4), dec!(0));

        let report = engine.run(&mut strategy, &klines, |_| {}).await.unwrap();

        let fill = report
            .orders
            .iter()
            .find(|o| o.status == OrderStatus::Filled && o.intent == OrderIntent::Entry)
            .unwrap();
        assert_eq!(fill.filled_price, Some(dec!(4)));
        assert_eq!(fill.fee, Some(dec!(0.5)));
        assert_eq!(report.module.fees.asset, dec!(0.5));
    }

    #[tokio::test]
    async fn test_insufficient_capital_rejects_order_and_continues() {
        let config = zero_fee_config().with_initial_capital(dec!(100));
        let mut engine = BacktestEngine::new(config).unwrap();
        let mut strategy = ScriptedStrategy::new(HashMap::from([(
            0usize,
            // 100 × 1000 = 100,000 자본 필요 → 거부
            vec![entry(OrderKind::Market, dec!(1000))],
        )]));
        let klines = create_test_klines(3, dec!(100), dec!(0));

        let report = engine.run(&mut strategy, &klines, |_| {}).await.unwrap();

        assert_eq!(report.orders.len(), 1);
        assert_eq!(report.orders[0].status, OrderStatus::Rejected);
        assert!(report.orders[0].reason.is_some());
        // 원장은 그대로, 실행은 끝까지 진행
        assert_eq!(report.module.available_capital, dec!(100));
        assert_eq!(report.kline_count, 3);
    }

    #[tokio::test]
    async fn test_unfilled_resting_order_canceled_at_end() {
        let mut engine = BacktestEngine::new(zero_fee_config()).unwrap();
        let mut strategy = ScriptedStrategy::new(HashMap::from([(
            0usize,
            // 절대 닿지 않는 지정가
            vec![entry(OrderKind::Limit { price: dec!(1) }, dec!(10))],
        )]));
        let klines = create_test_klines(3, dec!(100), dec!(0));

        let report = engine.run(&mut strategy, &klines, |_| {}).await.unwrap();

        assert_eq!(report.orders.len(), 1);
        assert_eq!(report.orders[0].status, OrderStatus::Canceled);
        // 예약 자본 반환 확인
        assert_eq!(report.module.available_capital, dec!(10000));
        assert_eq!(report.module.in_orders_capital, dec!(0));
    }

    /// 첫 캔들에 지정가를 내고 다음 캔들에 취소하는 전략
    struct CancelingStrategy {
        tick: usize,
    }

    #[async_trait]
    impl Strategy for CancelingStrategy {
        async fn on_kline(
            &mut self,
            view: &StrategyView<'_>,
        ) -> Result<Vec<OrderRequest>, StrategyError> {
            let tick = self.tick;
            self.tick += 1;
            match tick {
                0 => Ok(vec![entry(OrderKind::Limit { price: dec!(50) }, dec!(2))]),
                1 => {
                    let target_id = view.open_orders[0].id;
                    Ok(vec![OrderRequest {
                        intent: OrderIntent::Entry,
                        kind: OrderKind::Cancel { target_id },
                        quantity: dec!(0),
                    }])
                }
                _ => Ok(Vec::new()),
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_releases_reservation() {
        let mut engine = BacktestEngine::new(zero_fee_config()).unwrap();
        let mut strategy = CancelingStrategy { tick: 0 };
        let klines = create_test_klines(3, dec!(100), dec!(0));

        let report = engine.run(&mut strategy, &klines, |_| {}).await.unwrap();

        let canceled = report
            .orders
            .iter()
            .find(|o| o.status == OrderStatus::Canceled)
            .unwrap();
        assert!(matches!(canceled.kind, OrderKind::Limit { .. }));
        let cancel_order = report
            .orders
            .iter()
            .find(|o| matches!(o.kind, OrderKind::Cancel { .. }))
            .unwrap();
        assert_eq!(cancel_order.status, OrderStatus::Filled);
        assert_eq!(report.module.available_capital, dec!(10000));
        assert_eq!(report.module.in_orders_capital, dec!(0));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_reaches_100() {
        let mut engine = BacktestEngine::new(zero_fee_config()).unwrap();
        let mut strategy = ScriptedStrategy::new(HashMap::new());
        let klines = create_test_klines(7, dec!(100), dec!(1));

        let mut reported = Vec::new();
        engine
            .run(&mut strategy, &klines, |pct| reported.push(pct))
            .await
            .unwrap();

        assert_eq!(reported.len(), 7);
        assert!(reported.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*reported.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_empty_kline_stream_is_an_error() {
        let mut engine = BacktestEngine::new(zero_fee_config()).unwrap();
        let mut strategy = ScriptedStrategy::new(HashMap::new());
        let err = engine.run(&mut strategy, &[], |_| {}).await.unwrap_err();
        assert!(matches!(err, EngineError::Data(_)));
    }
}
