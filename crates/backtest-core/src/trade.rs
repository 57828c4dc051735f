//! 거래(Trade) 기록.
//!
//! 진입 주문 체결 시 열리고, 청산 주문 체결 시 오래된 것부터(FIFO)
//! 닫힙니다. 닫힌 거래는 불변입니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::round_amount;
use crate::order::Order;

/// 진입~청산 단위의 거래
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub entry_order: Order,
    pub exit_order: Option<Order>,
    /// 보유 자산 수량 (진입 수수료 차감 후)
    pub quantity: Decimal,
    /// 진입에 지출된 자본
    pub entry_cost: Decimal,
    /// 현재가 기준 미실현 손익
    pub unrealized_return: Decimal,
    /// 보유 기간 중 최대 우호 변동폭
    pub max_favorable_excursion: Decimal,
    /// 청산 시 확정 손익 (proceeds − cost − fees)
    pub realized_return: Option<Decimal>,
    /// 보유 기간 중 미실현 손익의 최대값 (≥ 0)
    pub max_run_up: Decimal,
    /// 보유 기간 중 미실현 손익의 최소값 (≤ 0)
    pub max_drawdown: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn open(
        entry_order: Order,
        quantity: Decimal,
        entry_cost: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entry_order,
            exit_order: None,
            quantity,
            entry_cost,
            unrealized_return: Decimal::ZERO,
            max_favorable_excursion: Decimal::ZERO,
            realized_return: None,
            max_run_up: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            opened_at,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// 현재가로 미실현 손익과 변동폭 통계를 갱신합니다.
    pub fn update_mark(&mut self, price: Decimal) {
        if !self.is_open() {
            return;
        }
        let value = round_amount(self.quantity * price);
        self.unrealized_return = round_amount(value - self.entry_cost);
        if self.unrealized_return > self.max_favorable_excursion {
            self.max_favorable_excursion = self.unrealized_return;
        }
        if self.unrealized_return > self.max_run_up {
            self.max_run_up = self.unrealized_return;
        }
        if self.unrealized_return < self.max_drawdown {
            self.max_drawdown = self.unrealized_return;
        }
    }

    /// 부분 청산용 분할: `qty`만큼을 떼어 새 거래로 반환하고,
    /// 남은 수량/비용은 비례 배분합니다.
    ///
    /// `qty`는 보유 수량 미만이어야 합니다.
    pub fn split_off(&mut self, qty: Decimal) -> Trade {
        debug_assert!(qty > Decimal::ZERO && qty < self.quantity);
        let cost_portion = round_amount(self.entry_cost * qty / self.quantity);
        let mut portion = self.clone();
        portion.id = Uuid::new_v4();
        portion.quantity = qty;
        portion.entry_cost = cost_portion;
        self.quantity -= qty;
        self.entry_cost -= cost_portion;
        portion
    }

    /// 청산 주문 체결로 거래를 닫습니다. 이후 이 거래는 불변입니다.
    pub fn close(&mut self, exit_order: Order, realized: Decimal, closed_at: DateTime<Utc>) {
        debug_assert!(self.is_open());
        if realized > self.max_run_up {
            self.max_run_up = realized;
        }
        if realized < self.max_drawdown {
            self.max_drawdown = realized;
        }
        self.exit_order = Some(exit_order);
        self.realized_return = Some(realized);
        self.closed_at = Some(closed_at);
    }
}
