//! 포트폴리오: 원장 적용과 거래 마감.
//!
//! 체결 후보를 받아 원장([`StrategyModule`])에 적용합니다. 원장 연산이
//! check-then-apply이므로 여기서도 실패 가능한 연산(예약 소진)을 가장
//! 먼저 수행해 부분 커밋이 생기지 않게 합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::debug;

use backtest_core::{
    fee_amount, round_amount, round_reservation, AccountingError, FeeCurrency, Kline, Order,
    OrderIntent, OrderKind, StrategyModule, Trade,
};

use crate::error::{EngineError, EngineResult};
use crate::matching::{FeeRole, FillCandidate};

/// 포트폴리오 상태
pub struct Portfolio {
    module: StrategyModule,
    open_trades: VecDeque<Trade>,
    closed_trades: Vec<Trade>,
    maker_fee_rate: Decimal,
    taker_fee_rate: Decimal,
}

impl Portfolio {
    pub fn new(initial_capital: Decimal, maker_fee_rate: Decimal, taker_fee_rate: Decimal) -> Self {
        Self {
            module: StrategyModule::new(initial_capital),
            open_trades: VecDeque::new(),
            closed_trades: Vec::new(),
            maker_fee_rate,
            taker_fee_rate,
        }
    }

    pub fn module(&self) -> &StrategyModule {
        &self.module
    }

    pub fn open_trades(&self) -> &VecDeque<Trade> {
        &self.open_trades
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.closed_trades
    }

    fn rate(&self, role: FeeRole) -> Decimal {
        match role {
            FeeRole::Maker => self.maker_fee_rate,
            FeeRole::Taker => self.taker_fee_rate,
        }
    }

    /// 주문 접수 시 예약: 진입은 자본, 청산은 수량
    pub fn reserve_for(&mut self, order: &Order, reserved: Decimal) -> Result<(), AccountingError> {
        match order.intent {
            OrderIntent::Entry => self.module.reserve_capital(reserved),
            OrderIntent::Exit => self.module.reserve_asset(reserved),
        }
    }

    /// 취소/거부 시 예약 반환
    pub fn release_for(&mut self, intent: OrderIntent, reserved: Decimal) {
        match intent {
            OrderIntent::Entry => self.module.release_capital(reserved),
            OrderIntent::Exit => self.module.release_asset(reserved),
        }
    }

    /// 체결 후보를 원장에 적용합니다.
    ///
    /// 회계 검증에 실패하면 후보를 그대로 돌려주며, 원장은 조금도
    /// 변경되지 않습니다. 호출자가 예약 반환과 주문 거부를 처리합니다.
    pub fn apply_fill(
        &mut self,
        candidate: FillCandidate,
        at: DateTime<Utc>,
    ) -> Result<Order, (FillCandidate, AccountingError)> {
        match candidate.order.intent {
            OrderIntent::Entry => self.apply_entry(candidate, at),
            OrderIntent::Exit => self.apply_exit(candidate, at),
        }
    }

    fn apply_entry(
        &mut self,
        candidate: FillCandidate,
        at: DateTime<Utc>,
    ) -> Result<Order, (FillCandidate, AccountingError)> {
        let qty = candidate.order.quantity;
        let cost = round_reservation(qty * candidate.price);

        // 실패 가능한 연산을 먼저: 이후 연산은 실패하지 않음
        if let Err(e) = self.module.consume_reserved_capital(candidate.reserved, cost) {
            return Err((candidate, e));
        }

        let fee = fee_amount(qty, self.rate(candidate.role));
        let net_qty = qty - fee;
        self.module.deposit_asset(net_qty);
        self.module.record_fee(FeeCurrency::Asset, fee);

        let mut order = candidate.order;
        order.fill(candidate.price, fee, FeeCurrency::Asset, at);
        debug!(order_id = %order.id, price = %candidate.price, fee = %fee, "진입 체결");

        self.open_trades
            .push_back(Trade::open(order.clone(), net_qty, cost, at));
        Ok(order)
    }

    fn apply_exit(
        &mut self,
        candidate: FillCandidate,
        at: DateTime<Utc>,
    ) -> Result<Order, (FillCandidate, AccountingError)> {
        let qty = candidate.order.quantity;

        if let Err(e) = self.module.consume_reserved_asset(candidate.reserved, qty) {
            return Err((candidate, e));
        }

        let proceeds = round_amount(qty * candidate.price);
        let fee = fee_amount(proceeds, self.rate(candidate.role));
        let net = round_amount(proceeds - fee);
        self.module.deposit_capital(net);
        self.module.record_fee(FeeCurrency::Capital, fee);

        let mut order = candidate.order;
        order.fill(candidate.price, fee, FeeCurrency::Capital, at);
        debug!(order_id = %order.id, price = %candidate.price, fee = %fee, "청산 체결");

        // 오래된 거래부터 FIFO로 마감
        let mut portions: Vec<Trade> = Vec::new();
        let mut remaining = qty;
        while remaining > Decimal::ZERO {
            let take_whole = match self.open_trades.front() {
                Some(front) => front.quantity <= remaining,
                None => break,
            };
            let portion = if take_whole {
                match self.open_trades.pop_front() {
                    Some(trade) => trade,
                    None => break,
                }
            } else {
                match self.open_trades.front_mut() {
                    Some(front) => front.split_off(remaining),
                    None => break,
                }
            };
            remaining -= portion.quantity;
            portions.push(portion);
        }

        // 순매각대금을 수량 비례 배분하되, 마지막 조각이 잔여분을 받아
        // 배분 합이 정확히 net이 되게 함
        let count = portions.len();
        let mut allocated = Decimal::ZERO;
        for (i, mut portion) in portions.into_iter().enumerate() {
            let share = if i + 1 == count {
                net - allocated
            } else {
                round_amount(net * portion.quantity / qty)
            };
            allocated += share;
            let realized = round_amount(share - portion.entry_cost);
            self.module.record_realized(realized);
            portion.close(order.clone(), realized, at);
            self.closed_trades.push(portion);
        }
        Ok(order)
    }

    /// 캔들 종가 기준으로 열린 거래와 자본 곡선을 갱신합니다.
    pub fn mark(&mut self, kline: &Kline) {
        let mut unrealized = Decimal::ZERO;
        for trade in self.open_trades.iter_mut() {
            trade.update_mark(kline.close);
            unrealized += trade.unrealized_return;
        }
        self.module.update_equity(round_amount(unrealized));
    }

    /// 종료 시 강제 청산: 남은 보유 전량을 마지막 캔들 종가에 합성
    /// MARKET 청산으로 닫습니다 (테이커 수수료).
    pub fn force_close_all(&mut self, kline: &Kline) -> EngineResult<Option<Order>> {
        if self.open_trades.is_empty() {
            return Ok(None);
        }
        let qty = self.module.available_asset_qty;
        if qty <= Decimal::ZERO {
            return Ok(None);
        }
        let mut order = Order::new(OrderIntent::Exit, OrderKind::Market, qty, kline.close_time)?;
        order.submit(kline.close_time);
        self.module.reserve_asset(qty)?;
        let candidate = FillCandidate {
            order,
            reserved: qty,
            price: kline.close,
            role: FeeRole::Taker,
        };
        match self.apply_fill(candidate, kline.close_time) {
            Ok(order) => Ok(Some(order)),
            Err((_, e)) => Err(EngineError::Accounting(e)),
        }
    }
}
