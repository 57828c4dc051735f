//! 작업 오케스트레이터 설정.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{JobError, Result};

/// 오케스트레이터/워커 설정
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// 실행 레코드 저장소 (PostgreSQL)
    pub database_url: String,
    /// 워커 프로세스 하드 타임아웃 (ms)
    pub worker_timeout_ms: u64,
    /// 워커의 진행률 기록 주기 (ms)
    pub progress_flush_ms: u64,
    /// 워커 실행 파일. 비어 있으면 현재 실행 파일을 재사용
    pub worker_program: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/backtest".to_string(),
            worker_timeout_ms: 600_000,
            progress_flush_ms: 1_000,
            worker_program: None,
        }
    }
}

impl JobConfig {
    /// 환경변수에서 설정 로드. 없는 값은 기본값을 사용합니다.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            worker_timeout_ms: env_var_parse("JOB_WORKER_TIMEOUT_MS", defaults.worker_timeout_ms)?,
            progress_flush_ms: env_var_parse("JOB_PROGRESS_FLUSH_MS", defaults.progress_flush_ms)?,
            worker_program: env::var("JOB_WORKER_PROGRAM").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_timeout_ms == 0 {
            return Err(JobError::Config(
                "worker_timeout_ms는 1 이상이어야 함".to_string(),
            ));
        }
        if self.database_url.is_empty() {
            return Err(JobError::Config("database_url이 비어 있음".to_string()));
        }
        Ok(())
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    pub fn progress_flush_interval(&self) -> Duration {
        Duration::from_millis(self.progress_flush_ms)
    }
}

/// 환경변수를 파싱하고, 없으면 기본값을 반환합니다.
fn env_var_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| JobError::Config(format!("{} 환경변수 파싱 실패: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.worker_timeout_ms, 600_000);
        assert!(config.worker_program.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = JobConfig {
            worker_timeout_ms: 0,
            ..JobConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
