//! 전략 모듈 원장 (StrategyModule).
//!
//! 시뮬레이션 한 번에 대한 자본/자산 수량 회계를 담당합니다. 모든
//! 변경 연산은 원자적 check-then-apply로 동작합니다: 새 값을 먼저
//! 계산하고, 가용 자본/수량이 음수가 되면 원장을 건드리지 않은 채
//! [`AccountingError`]를 반환합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decimal::round_amount;
use crate::order::FeeCurrency;

/// 회계 에러. 해당 주문만 거부되며 시뮬레이션은 계속됩니다.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountingError {
    /// 가용 자본 부족
    #[error("가용 자본 부족: 필요 {required}, 가용 {available}")]
    InsufficientCapital {
        required: Decimal,
        available: Decimal,
    },

    /// 가용 자산 수량 부족
    #[error("가용 자산 수량 부족: 필요 {required}, 가용 {available}")]
    InsufficientAsset {
        required: Decimal,
        available: Decimal,
    },
}

/// 통화별 누적 수수료
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeTotals {
    /// 자본 통화로 지불한 수수료 (청산)
    pub capital: Decimal,
    /// 자산 통화로 지불한 수수료 (진입)
    pub asset: Decimal,
}

/// 포트폴리오 원장
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyModule {
    pub initial_capital: Decimal,
    pub total_capital: Decimal,
    pub available_capital: Decimal,
    pub in_orders_capital: Decimal,
    pub total_asset_qty: Decimal,
    pub available_asset_qty: Decimal,
    pub in_orders_asset_qty: Decimal,
    pub fees: FeeTotals,
    pub realized_return: Decimal,
    pub unrealized_return: Decimal,
    pub equity: Decimal,
    /// (equity − initial)의 러닝 최소값, 단조 감소
    pub max_drawdown: Decimal,
    /// (equity − initial)의 러닝 최대값, 단조 증가
    pub max_run_up: Decimal,
}

impl StrategyModule {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            total_capital: initial_capital,
            available_capital: initial_capital,
            in_orders_capital: Decimal::ZERO,
            total_asset_qty: Decimal::ZERO,
            available_asset_qty: Decimal::ZERO,
            in_orders_asset_qty: Decimal::ZERO,
            fees: FeeTotals::default(),
            realized_return: Decimal::ZERO,
            unrealized_return: Decimal::ZERO,
            equity: initial_capital,
            max_drawdown: Decimal::ZERO,
            max_run_up: Decimal::ZERO,
        }
    }

    fn sync_totals(&mut self) {
        self.total_capital = self.available_capital + self.in_orders_capital;
        self.total_asset_qty = self.available_asset_qty + self.in_orders_asset_qty;
    }

    // ==================== 자본 ====================

    /// 주문 접수 시 자본 예약 (가용 → 주문 중)
    pub fn reserve_capital(&mut self, amount: Decimal) -> Result<(), AccountingError> {
        let new_available = self.available_capital - amount;
        if new_available < Decimal::ZERO {
            return Err(AccountingError::InsufficientCapital {
                required: amount,
                available: self.available_capital,
            });
        }
        self.available_capital = new_available;
        self.in_orders_capital += amount;
        self.sync_totals();
        Ok(())
    }

    /// 취소/거부 시 예약 자본 반환
    pub fn release_capital(&mut self, amount: Decimal) {
        debug_assert!(self.in_orders_capital >= amount);
        self.in_orders_capital -= amount;
        self.available_capital += amount;
        self.sync_totals();
    }

    /// 체결 시 예약 자본 소진. 실제 비용이 예약보다 작으면 차액을
    /// 가용으로 반환하고, 크면 가용에서 추가 차감합니다.
    pub fn consume_reserved_capital(
        &mut self,
        reserved: Decimal,
        cost: Decimal,
    ) -> Result<(), AccountingError> {
        debug_assert!(self.in_orders_capital >= reserved);
        let new_available = self.available_capital + reserved - cost;
        if new_available < Decimal::ZERO {
            return Err(AccountingError::InsufficientCapital {
                required: cost,
                available: self.available_capital + reserved,
            });
        }
        self.in_orders_capital -= reserved;
        self.available_capital = new_available;
        self.sync_totals();
        Ok(())
    }

    /// 청산 대금 입금
    pub fn deposit_capital(&mut self, amount: Decimal) {
        self.available_capital += amount;
        self.sync_totals();
    }

    // ==================== 자산 수량 ====================

    pub fn reserve_asset(&mut self, qty: Decimal) -> Result<(), AccountingError> {
        let new_available = self.available_asset_qty - qty;
        if new_available < Decimal::ZERO {
            return Err(AccountingError::InsufficientAsset {
                required: qty,
                available: self.available_asset_qty,
            });
        }
        self.available_asset_qty = new_available;
        self.in_orders_asset_qty += qty;
        self.sync_totals();
        Ok(())
    }

    pub fn release_asset(&mut self, qty: Decimal) {
        debug_assert!(self.in_orders_asset_qty >= qty);
        self.in_orders_asset_qty -= qty;
        self.available_asset_qty += qty;
        self.sync_totals();
    }

    pub fn consume_reserved_asset(
        &mut self,
        reserved: Decimal,
        used: Decimal,
    ) -> Result<(), AccountingError> {
        debug_assert!(self.in_orders_asset_qty >= reserved);
        let new_available = self.available_asset_qty + reserved - used;
        if new_available < Decimal::ZERO {
            return Err(AccountingError::InsufficientAsset {
                required: used,
                available: self.available_asset_qty + reserved,
            });
        }
        self.in_orders_asset_qty -= reserved;
        self.available_asset_qty = new_available;
        self.sync_totals();
        Ok(())
    }

    /// 진입 체결로 받은 자산 입고 (진입 수수료 차감 후 수량)
    pub fn deposit_asset(&mut self, qty: Decimal) {
        self.available_asset_qty += qty;
        self.sync_totals();
    }

    // ==================== 손익/수수료 ====================

    pub fn record_fee(&mut self, currency: FeeCurrency, amount: Decimal) {
        match currency {
            FeeCurrency::Capital => self.fees.capital += amount,
            FeeCurrency::Asset => self.fees.asset += amount,
        }
    }

    pub fn record_realized(&mut self, amount: Decimal) {
        self.realized_return += amount;
    }

    /// 미실현 손익을 반영해 평가 자산(equity)과 러닝 run-up/drawdown을
    /// 갱신합니다. run-up/drawdown은 단조로 넓어지기만 하고 리셋되지
    /// 않습니다.
    pub fn update_equity(&mut self, unrealized: Decimal) {
        self.unrealized_return = unrealized;
        self.equity =
            round_amount(self.initial_capital + self.realized_return + self.unrealized_return);
        let excursion = self.equity - self.initial_capital;
        if excursion > self.max_run_up {
            self.max_run_up = excursion;
        }
        if excursion < self.max_drawdown {
            self.max_drawdown = excursion;
        }
    }
}
