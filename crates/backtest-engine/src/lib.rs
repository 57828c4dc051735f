//! 백테스트 실행 엔진.
//!
//! 캔들 스트림을 시간 순서로 하나씩 처리하며 주문 체결과 포트폴리오
//! 회계를 수행합니다. 체결 순서가 이후 원장 상태에 영향을 주므로 한
//! 시뮬레이션 내부는 엄격하게 순차 실행됩니다 (캔들 하나씩, 캔들 안에서
//! 주문 하나씩).
//!
//! # 주요 구성요소
//!
//! - [`BacktestConfig`]: 백테스트 설정 (초기 자본, 수수료율, lookback)
//! - [`BacktestEngine`]: 캔들 단위 실행 루프 + 종료 시 강제 청산
//! - [`MatchingEngine`]: 대기 주문 체결 판정 상태 머신
//! - [`Portfolio`]: 원장 적용, FIFO 거래 마감, 자본 곡선 통계
//! - [`Strategy`]: 캔들마다 호출되는 전략 콜백 인터페이스

pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod portfolio;
pub mod strategy;

pub use config::BacktestConfig;
pub use engine::{BacktestEngine, BacktestReport};
pub use error::{EngineError, EngineResult};
pub use matching::{AdmitResult, FeeRole, FillCandidate, MatchingEngine, RestingOrder};
pub use portfolio::Portfolio;
pub use strategy::{OrderRequest, SmaCrossStrategy, Strategy, StrategyView};
