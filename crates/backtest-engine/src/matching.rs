//! 주문 체결 판정 상태 머신.
//!
//! 대기 주문 목록(book)을 접수 순서대로 유지하며 캔들마다 체결 여부를
//! 판정합니다. 돈 계산은 하지 않습니다. 체결 후보를 만들어 반환하면
//! [`crate::portfolio::Portfolio`]가 원장 적용을 결정합니다.
//!
//! # 체결 규칙
//!
//! - LIMIT / STOP_MARKET: 캔들 범위 `[low, high]`가 트리거 가격을
//!   포함하면 트리거 가격에 체결 (worst-case 모델)
//! - STOP_LIMIT: 스탑 터치 시 OPENING → TRIGGERED, 이후 캔들에서
//!   지정가로 체결 판정
//! - MARKET / 크로스된 LIMIT: 접수 캔들 종가에 즉시 체결
//! - 수수료 역할: 가격이 닿아서 체결된 순수 지정가만 메이커,
//!   나머지(시장가, 크로스, 스탑 트리거)는 테이커

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use backtest_core::{Kline, Order, OrderIntent, OrderKind, OrderStatus};

/// 체결 시 적용할 수수료 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeRole {
    Maker,
    Taker,
}

/// 대기 주문 + 접수 시 잡아둔 예약량
#[derive(Debug, Clone)]
pub struct RestingOrder {
    pub order: Order,
    /// 진입이면 예약 자본, 청산이면 예약 수량
    pub reserved: Decimal,
}

/// 체결 후보. 원장 적용 전이므로 주문은 아직 터미널이 아닙니다.
#[derive(Debug, Clone)]
pub struct FillCandidate {
    pub order: Order,
    pub reserved: Decimal,
    pub price: Decimal,
    pub role: FeeRole,
}

/// 접수 결과
pub enum AdmitResult {
    /// book에 등록됨 (OPENING)
    Rested,
    /// 즉시 체결 대상 (시장가, 크로스된 지정가)
    Immediate(FillCandidate),
}

/// 체결 엔진
#[derive(Default)]
pub struct MatchingEngine {
    book: Vec<RestingOrder>,
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 대기 중인 주문 스냅샷 (전략 뷰용)
    pub fn open_orders(&self) -> Vec<Order> {
        self.book.iter().map(|r| r.order.clone()).collect()
    }

    /// SUBMITTED 주문 접수. 즉시 체결 대상이면 후보를 반환하고,
    /// 아니면 OPENING으로 book에 올립니다.
    ///
    /// 크로스 판정은 접수 캔들의 종가 기준입니다. 진입 지정가가 현재가
    /// 이상(또는 청산 지정가가 현재가 이하)이면 이미 시장을 넘은
    /// 주문이므로 현재가에 테이커로 체결됩니다.
    pub fn admit(&mut self, mut order: Order, reserved: Decimal, kline: &Kline) -> AdmitResult {
        debug_assert_eq!(order.status, OrderStatus::Submitted);
        match &order.kind {
            OrderKind::Market => AdmitResult::Immediate(FillCandidate {
                order,
                reserved,
                price: kline.close,
                role: FeeRole::Taker,
            }),
            OrderKind::Limit { price } => {
                let crossed = match order.intent {
                    OrderIntent::Entry => *price >= kline.close,
                    OrderIntent::Exit => *price <= kline.close,
                };
                if crossed {
                    AdmitResult::Immediate(FillCandidate {
                        order,
                        reserved,
                        price: kline.close,
                        role: FeeRole::Taker,
                    })
                } else {
                    order.open();
                    self.book.push(RestingOrder { order, reserved });
                    AdmitResult::Rested
                }
            }
            OrderKind::StopMarket { .. } | OrderKind::StopLimit { .. } => {
                order.open();
                self.book.push(RestingOrder { order, reserved });
                AdmitResult::Rested
            }
            // CANCEL은 book에 올라가지 않음 (엔진이 직접 처리)
            OrderKind::Cancel { .. } => AdmitResult::Rested,
        }
    }

    /// 캔들 하나에 대해 대기 주문을 접수 순서대로 판정합니다.
    pub fn on_kline(&mut self, kline: &Kline) -> Vec<FillCandidate> {
        let mut candidates = Vec::new();
        let mut i = 0;
        while i < self.book.len() {
            let resting = &mut self.book[i];
            let decision = match &resting.order.kind {
                OrderKind::Limit { price } => {
                    if kline.contains(*price) {
                        Some((*price, FeeRole::Maker))
                    } else {
                        None
                    }
                }
                OrderKind::StopMarket { stop_price } => {
                    if kline.contains(*stop_price) {
                        Some((*stop_price, FeeRole::Taker))
                    } else {
                        None
                    }
                }
                OrderKind::StopLimit {
                    stop_price,
                    limit_price,
                } => match resting.order.status {
                    OrderStatus::Opening => {
                        if kline.contains(*stop_price) {
                            // 트리거만 하고 체결은 다음 캔들부터
                            resting.order.trigger();
                        }
                        None
                    }
                    OrderStatus::Triggered => {
                        if kline.contains(*limit_price) {
                            Some((*limit_price, FeeRole::Taker))
                        } else {
                            None
                        }
                    }
                    _ => None,
                },
                OrderKind::Market | OrderKind::Cancel { .. } => None,
            };

            match decision {
                Some((price, role)) => {
                    let resting = self.book.remove(i);
                    candidates.push(FillCandidate {
                        order: resting.order,
                        reserved: resting.reserved,
                        price,
                        role,
                    });
                }
                None => i += 1,
            }
        }
        candidates
    }

    /// 대상 주문 취소. book에서 제거하고 CANCELED로 전이한 뒤
    /// 예약량 반환을 위해 돌려줍니다.
    pub fn cancel(&mut self, target_id: Uuid, at: DateTime<Utc>) -> Option<RestingOrder> {
        let index = self.book.iter().position(|r| r.order.id == target_id)?;
        let mut resting = self.book.remove(index);
        resting.order.cancel(at);
        Some(resting)
    }

    /// 시뮬레이션 종료 시 남은 대기 주문 전부 회수
    pub fn drain(&mut self) -> Vec<RestingOrder> {
        std::mem::take(&mut self.book)
    }
}
