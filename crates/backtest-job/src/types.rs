//! 실행 레코드 도메인 타입.
//!
//! 실행(execution)은 전략 하나의 백테스트 작업입니다. 상태는
//! `PENDING → RUNNING → {FINISHED | FAILED | TIMEOUT | INTERUPTED}`
//! 순서로만 진행하며, 터미널 상태 이후의 쓰기는 모두 무시됩니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use backtest_core::Timeframe;
use backtest_engine::{BacktestConfig, BacktestReport};

// ==================== 상태 ====================

/// 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Finished,
    Failed,
    /// 시간 초과로 강제 종료됨
    Timeout,
    /// 운영자 중단 (SIGINT). 철자는 저장 포맷 호환을 위해 고정
    #[serde(rename = "INTERUPTED")]
    Interupted,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Timeout | Self::Interupted
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Finished => write!(f, "FINISHED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Timeout => write!(f, "TIMEOUT"),
            JobStatus::Interupted => write!(f, "INTERUPTED"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "FINISHED" => Ok(JobStatus::Finished),
            "FAILED" => Ok(JobStatus::Failed),
            "TIMEOUT" => Ok(JobStatus::Timeout),
            "INTERUPTED" => Ok(JobStatus::Interupted),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

// ==================== 파라미터 ====================

fn default_fast_period() -> usize {
    10
}

fn default_slow_period() -> usize {
    30
}

fn default_position_fraction() -> Decimal {
    dec!(0.5)
}

/// SMA 교차 전략 파라미터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmaParams {
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,
    #[serde(default = "default_position_fraction")]
    pub position_fraction: Decimal,
}

impl Default for SmaParams {
    fn default() -> Self {
        Self {
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
            position_fraction: default_position_fraction(),
        }
    }
}

/// 실행 파라미터 (JSONB로 저장)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobParams {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub config: BacktestConfig,
    #[serde(default)]
    pub strategy: SmaParams,
}

// ==================== 실패 정보 ====================

/// 실패 원인. message는 최종 원인, chain은 바깥쪽부터의 원인 사슬
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    #[serde(default)]
    pub chain: Vec<String>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            chain: Vec::new(),
        }
    }

    /// 에러의 source 사슬을 펼쳐서 기록
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = vec![error.to_string()];
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: chain[0].clone(),
            chain,
        }
    }
}

// ==================== 실행 레코드 ====================

/// 실행 레코드. logs와 progress는 추가/증가만 됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub strategy_id: String,
    pub params: JobParams,
    pub status: JobStatus,
    /// 0 ~ 100, 단조 증가
    pub progress: u8,
    pub logs: Vec<String>,
    pub error: Option<JobFailure>,
    pub result: Option<BacktestReport>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    pub fn new(strategy_id: impl Into<String>, params: JobParams, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy_id: strategy_id.into(),
            params,
            status: JobStatus::Pending,
            progress: 0,
            logs: Vec::new(),
            error: None,
            result: None,
            created_at: at,
            updated_at: at,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_keeps_interupted_spelling() {
        let json = serde_json::to_string(&JobStatus::Interupted).unwrap();
        assert_eq!(json, "\"INTERUPTED\"");
        let parsed: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JobStatus::Interupted);
        assert_eq!("INTERUPTED".parse::<JobStatus>().unwrap(), JobStatus::Interupted);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        for status in [
            JobStatus::Finished,
            JobStatus::Failed,
            JobStatus::Timeout,
            JobStatus::Interupted,
        ] {
            assert!(status.is_terminal());
        }
    }

    #[test]
    fn test_failure_chain_from_error() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let failure = JobFailure::from_error(&inner);
        assert_eq!(failure.message, "disk full");
        assert_eq!(failure.chain.len(), 1);
    }
}
