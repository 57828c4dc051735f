//! 에러 타입 정의.

use thiserror::Error;

/// 도메인 타입 검증 에러
#[derive(Debug, Error)]
pub enum CoreError {
    /// 유효성 검증 실패 (음수 가격, 역전된 시간 범위 등)
    #[error("유효성 검증 실패: {0}")]
    Validation(String),

    /// 알 수 없는 타임프레임 문자열
    #[error("지원하지 않는 타임프레임: {0}")]
    UnknownTimeframe(String),
}

/// Result 타입 별칭
pub type CoreResult<T> = std::result::Result<T, CoreError>;
