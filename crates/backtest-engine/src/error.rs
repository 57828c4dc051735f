//! 에러 타입 정의.

use backtest_core::{AccountingError, CoreError};
use thiserror::Error;

/// 백테스트 엔진 에러.
///
/// 회계 에러([`AccountingError`])는 보통 해당 주문만 거부하고 실행을
/// 계속하므로 여기 포함되지 않습니다. 이 타입의 `Accounting` 변형은
/// 강제 청산처럼 실패해서는 안 되는 경로에서의 불변식 위반에만
/// 사용됩니다.
#[derive(Debug, Error)]
pub enum EngineError {
    /// 설정 오류
    #[error("설정 오류: {0}")]
    Config(String),

    /// 입력 데이터 오류 (빈 캔들 스트림 등)
    #[error("데이터 오류: {0}")]
    Data(String),

    /// 전략 콜백 실행 실패
    #[error("전략 실행 오류: {0}")]
    Strategy(String),

    /// 회계 불변식 위반
    #[error("회계 불변식 위반: {0}")]
    Accounting(#[from] AccountingError),

    /// 도메인 타입 검증 실패
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result 타입 별칭
pub type EngineResult<T> = std::result::Result<T, EngineError>;
