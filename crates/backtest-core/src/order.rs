//! 주문 상태 머신.
//!
//! 주문은 `PENDING → {SUBMITTED | OPENING} → [TRIGGERED] → FILLED |
//! CANCELED | REJECTED` 순서로만 진행합니다. 생성 시점의 식별 정보
//! (id, intent, kind, quantity)는 불변이며, 상태 의존 필드
//! (submitted_at, filled_price, fee, reason, canceled_at)는 진행에 따라
//! 추가만 되고 절대 제거/재작성되지 않습니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// 주문 방향: 진입(매수) / 청산(매도)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderIntent {
    Entry,
    Exit,
}

/// 주문 종류. 가격 조건은 생성 시 고정됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Market,
    Limit { price: Decimal },
    StopMarket { stop_price: Decimal },
    StopLimit { stop_price: Decimal, limit_price: Decimal },
    /// 대기 중인 다른 주문의 취소 요청
    Cancel { target_id: Uuid },
}

/// 주문 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    /// 접수됨 (취소만 가능한 과도 상태)
    Submitted,
    /// 체결 대기 중 (트리거 조건 감시)
    Opening,
    /// 스탑 조건 충족, 지정가 체결 대기
    Triggered,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }
}

/// 수수료 통화: 진입은 자산, 청산은 자본
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeeCurrency {
    Asset,
    Capital,
}

/// 주문 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub intent: OrderIntent,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_price: Option<Decimal>,
    pub filled_at: Option<DateTime<Utc>>,
    pub fee: Option<Decimal>,
    pub fee_currency: Option<FeeCurrency>,
    pub reason: Option<String>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// 주문 생성. 수량과 모든 가격 조건은 양수여야 합니다.
    pub fn new(
        intent: OrderIntent,
        kind: OrderKind,
        quantity: Decimal,
        created_at: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if quantity <= Decimal::ZERO && !matches!(kind, OrderKind::Cancel { .. }) {
            return Err(CoreError::Validation(format!(
                "주문 수량이 양수가 아님: {}",
                quantity
            )));
        }
        let prices: &[Decimal] = match &kind {
            OrderKind::Limit { price } => &[*price],
            OrderKind::StopMarket { stop_price } => &[*stop_price],
            OrderKind::StopLimit {
                stop_price,
                limit_price,
            } => &[*stop_price, *limit_price],
            OrderKind::Market | OrderKind::Cancel { .. } => &[],
        };
        for price in prices {
            if *price <= Decimal::ZERO {
                return Err(CoreError::Validation(format!(
                    "주문 가격이 양수가 아님: {}",
                    price
                )));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            intent,
            kind,
            quantity,
            status: OrderStatus::Pending,
            created_at,
            submitted_at: None,
            filled_price: None,
            filled_at: None,
            fee: None,
            fee_currency: None,
            reason: None,
            canceled_at: None,
        })
    }

    /// 현재 상태에서 체결 판정에 사용할 트리거 가격.
    ///
    /// STOP_LIMIT은 트리거 전에는 스탑 가격, 트리거 후에는 지정가를
    /// 반환합니다. MARKET/CANCEL은 트리거 가격이 없습니다.
    pub fn trigger_price(&self) -> Option<Decimal> {
        match &self.kind {
            OrderKind::Limit { price } => Some(*price),
            OrderKind::StopMarket { stop_price } => Some(*stop_price),
            OrderKind::StopLimit {
                stop_price,
                limit_price,
            } => {
                if self.status == OrderStatus::Triggered {
                    Some(*limit_price)
                } else {
                    Some(*stop_price)
                }
            }
            OrderKind::Market | OrderKind::Cancel { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 취소 가능한 상태인가 (터미널 이전 전부)
    pub fn is_cancelable(&self) -> bool {
        !self.is_terminal()
    }

    // ==================== 상태 전이 ====================

    pub fn submit(&mut self, at: DateTime<Utc>) {
        debug_assert_eq!(self.status, OrderStatus::Pending);
        self.status = OrderStatus::Submitted;
        self.submitted_at = Some(at);
    }

    pub fn open(&mut self) {
        debug_assert_eq!(self.status, OrderStatus::Submitted);
        self.status = OrderStatus::Opening;
    }

    pub fn trigger(&mut self) {
        debug_assert_eq!(self.status, OrderStatus::Opening);
        self.status = OrderStatus::Triggered;
    }

    pub fn fill(
        &mut self,
        price: Decimal,
        fee: Decimal,
        fee_currency: FeeCurrency,
        at: DateTime<Utc>,
    ) {
        debug_assert!(!self.is_terminal());
        self.status = OrderStatus::Filled;
        self.filled_price = Some(price);
        self.filled_at = Some(at);
        self.fee = Some(fee);
        self.fee_currency = Some(fee_currency);
    }

    /// 가격/수수료 없는 완료 처리 (취소 지시 주문 등)
    pub fn complete(&mut self, at: DateTime<Utc>) {
        debug_assert!(!self.is_terminal());
        self.status = OrderStatus::Filled;
        self.filled_at = Some(at);
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) {
        debug_assert!(self.is_cancelable());
        self.status = OrderStatus::Canceled;
        self.canceled_at = Some(at);
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        debug_assert!(!self.is_terminal());
        self.status = OrderStatus::Rejected;
        self.reason = Some(reason.into());
    }
}
