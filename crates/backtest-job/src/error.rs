//! 작업 계층 에러 타입.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum JobError {
    /// 같은 전략에 이미 PENDING/RUNNING 실행이 존재
    #[error("전략 {strategy_id}에 이미 진행 중인 실행이 있음")]
    Capacity { strategy_id: String },

    #[error("실행 레코드를 찾을 수 없음: {0}")]
    NotFound(Uuid),

    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("워커 오류: {0}")]
    Worker(String),

    #[error("설정 오류: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, JobError>;
