//! 백테스트 도메인 핵심 타입.
//!
//! 모든 상위 크레이트(backtest-data, backtest-engine, backtest-job)가
//! 공유하는 도메인 모델을 정의합니다.
//!
//! # 주요 구성요소
//!
//! - [`Kline`] / [`Timeframe`]: OHLCV 캔들과 타임프레임
//! - [`Order`] / [`OrderKind`] / [`OrderStatus`]: 주문 상태 머신
//! - [`Trade`]: 진입~청산 단위의 거래 기록
//! - [`StrategyModule`]: 자본/수량 원장 (원자적 check-then-apply)
//! - [`decimal`]: 8자리 고정 소수점 반올림 헬퍼

pub mod decimal;
pub mod error;
pub mod kline;
pub mod module;
pub mod order;
pub mod trade;

pub use decimal::{fee_amount, round_amount, round_reservation, AMOUNT_SCALE};
pub use error::{CoreError, CoreResult};
pub use kline::{Kline, Timeframe, TimeframeClass};
pub use module::{AccountingError, FeeTotals, StrategyModule};
pub use order::{FeeCurrency, Order, OrderIntent, OrderKind, OrderStatus};
pub use trade::Trade;
