//! 에러 타입 정의.

use backtest_core::CoreError;
use thiserror::Error;

/// 데이터 수집 에러.
///
/// 404(NotFound)는 다른 전송 실패와 구분됩니다. 아카이브 꼬리 폴백
/// 판정에 필요하기 때문입니다.
#[derive(Debug, Error)]
pub enum DataError {
    /// 리소스 없음 (HTTP 404)
    #[error("리소스를 찾을 수 없음 (404): {0}")]
    NotFound(String),

    /// 범위 중간의 아카이브 누락. 아카이브는 중간에 구멍이 없어야 함
    #[error("아카이브 범위 중간 누락: {url}")]
    ArchiveGap { url: String },

    /// 404 이외의 전송 실패
    #[error("전송 실패: {0}")]
    Transport(String),

    /// 잘못된 조회 범위 (역전, 미래 등)
    #[error("잘못된 조회 범위: {0}")]
    InvalidRange(String),

    /// 응답/파일 파싱 실패
    #[error("파싱 실패: {0}")]
    Parse(String),

    /// 파일 시스템 에러 (스테이징 디렉터리 등)
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 도메인 타입 검증 실패
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// 재시도 가치가 있는 일시적 실패인가
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for DataError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, DataError>;
