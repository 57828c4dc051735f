//! 실행 레코드 저장소.
//!
//! 저장소가 두 가지 불변식을 강제합니다.
//!
//! - 전략 하나당 PENDING/RUNNING 실행은 최대 1건 (부분 유니크 인덱스)
//! - 터미널 상태는 먼저 기록된 쪽이 이김: 이후의 상태/진행률/로그
//!   쓰기는 전부 무시됩니다
//!
//! 진행률은 단조 증가(GREATEST), 로그는 뒤에 추가만 됩니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use backtest_engine::BacktestReport;

use crate::error::{JobError, Result};
use crate::types::{ExecutionRecord, JobFailure, JobParams, JobStatus};

/// 실행 레코드 저장소 인터페이스
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 용량 검사 후 PENDING 레코드를 생성합니다.
    ///
    /// 같은 전략에 PENDING/RUNNING 실행이 이미 있으면
    /// [`JobError::Capacity`]를 반환합니다.
    async fn admit(&self, strategy_id: &str, params: JobParams) -> Result<ExecutionRecord>;

    async fn find(&self, id: Uuid) -> Result<ExecutionRecord>;

    /// 전략의 PENDING/RUNNING 실행 조회
    async fn find_active(&self, strategy_id: &str) -> Result<Option<ExecutionRecord>>;

    /// PENDING → RUNNING 전이
    async fn mark_running(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// 진행률/로그 기록. 진행률은 기존 값 이하로 내려가지 않고,
    /// 로그는 뒤에 추가됩니다. 터미널 이후의 호출은 무시됩니다.
    async fn write_progress(&self, id: Uuid, progress: u8, logs: &[String]) -> Result<()>;

    /// 터미널 상태 기록. 이미 터미널이면 아무것도 바꾸지 않고
    /// 저장된 레코드를 그대로 반환합니다.
    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<JobFailure>,
        result: Option<BacktestReport>,
        at: DateTime<Utc>,
    ) -> Result<ExecutionRecord>;
}

// ==================== PostgreSQL 구현 ====================

const TERMINAL_STATUSES: &str = "'FINISHED', 'FAILED', 'TIMEOUT', 'INTERUPTED'";

/// 실행 레코드 DB 행
#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: Uuid,
    strategy_id: String,
    params: serde_json::Value,
    status: String,
    progress: i16,
    logs: Vec<String>,
    error: Option<serde_json::Value>,
    result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRow {
    fn to_domain(self) -> Result<ExecutionRecord> {
        let status: JobStatus = serde_json::from_value(serde_json::Value::String(self.status))?;
        let error = match self.error {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        let result = match self.result {
            Some(value) => Some(serde_json::from_value(value)?),
            None => None,
        };
        Ok(ExecutionRecord {
            id: self.id,
            strategy_id: self.strategy_id,
            params: serde_json::from_value(self.params)?,
            status,
            progress: self.progress.clamp(0, 100) as u8,
            logs: self.logs,
            error,
            result,
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, strategy_id, params, status, progress, logs, error, result, \
     created_at, updated_at, finished_at";

/// PostgreSQL 저장소
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// 테이블과 활성 실행 유니크 인덱스 생성 (멱등)
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_executions (
                id UUID PRIMARY KEY,
                strategy_id TEXT NOT NULL,
                params JSONB NOT NULL,
                status TEXT NOT NULL,
                progress SMALLINT NOT NULL DEFAULT 0,
                logs TEXT[] NOT NULL DEFAULT '{}',
                error JSONB,
                result JSONB,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                finished_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // 전략당 활성(PENDING/RUNNING) 실행 1건 보장
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_backtest_executions_active
            ON backtest_executions (strategy_id)
            WHERE status IN ('PENDING', 'RUNNING')
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("실행 레코드 스키마 준비 완료");
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<ExecutionRecord> {
        let row: Option<ExecutionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM backtest_executions WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(JobError::NotFound(id))?.to_domain()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, params))]
    async fn admit(&self, strategy_id: &str, params: JobParams) -> Result<ExecutionRecord> {
        let record = ExecutionRecord::new(strategy_id, params, Utc::now());
        let insert = sqlx::query(
            r#"
            INSERT INTO backtest_executions
                (id, strategy_id, params, status, progress, logs, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 0, '{}', $5, $5)
            "#,
        )
        .bind(record.id)
        .bind(&record.strategy_id)
        .bind(serde_json::to_value(&record.params)?)
        .bind(record.status.to_string())
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => {
                info!(id = %record.id, strategy_id, "실행 접수");
                Ok(record)
            }
            // 활성 실행 유니크 인덱스 충돌 = 용량 초과
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(JobError::Capacity {
                    strategy_id: strategy_id.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, id: Uuid) -> Result<ExecutionRecord> {
        self.fetch(id).await
    }

    async fn find_active(&self, strategy_id: &str) -> Result<Option<ExecutionRecord>> {
        let row: Option<ExecutionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM backtest_executions \
             WHERE strategy_id = $1 AND status IN ('PENDING', 'RUNNING')",
            SELECT_COLUMNS
        ))
        .bind(strategy_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ExecutionRow::to_domain).transpose()
    }

    async fn mark_running(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE backtest_executions \
             SET status = 'RUNNING', updated_at = $2 \
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let record = self.fetch(id).await?;
            return Err(JobError::Worker(format!(
                "PENDING 상태가 아니어서 실행 전이 불가: {} ({})",
                id, record.status
            )));
        }
        Ok(())
    }

    async fn write_progress(&self, id: Uuid, progress: u8, logs: &[String]) -> Result<()> {
        let query = format!(
            "UPDATE backtest_executions \
             SET progress = GREATEST(progress, $2), logs = logs || $3, updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ({})",
            TERMINAL_STATUSES
        );
        sqlx::query(&query)
            .bind(id)
            .bind(progress.min(100) as i16)
            .bind(logs)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, error, result))]
    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<JobFailure>,
        result: Option<BacktestReport>,
        at: DateTime<Utc>,
    ) -> Result<ExecutionRecord> {
        debug_assert!(status.is_terminal());
        let query = format!(
            "UPDATE backtest_executions \
             SET status = $2, error = $3, result = $4, \
                 progress = CASE WHEN $2 = 'FINISHED' THEN 100 ELSE progress END, \
                 updated_at = $5, finished_at = $5 \
             WHERE id = $1 AND status NOT IN ({})",
            TERMINAL_STATUSES
        );
        let error_json = error.map(serde_json::to_value).transpose()?;
        let result_json = result.map(serde_json::to_value).transpose()?;
        let updated = sqlx::query(&query)
            .bind(id)
            .bind(status.to_string())
            .bind(error_json)
            .bind(result_json)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            debug!(id = %id, status = %status, "이미 터미널, 쓰기 무시");
        } else {
            info!(id = %id, status = %status, "실행 종료 기록");
        }
        self.fetch(id).await
    }
}

// ==================== 인메모리 구현 ====================

/// 테스트/단일 프로세스용 인메모리 저장소
#[derive(Default)]
pub struct MemoryJobStore {
    inner: tokio::sync::RwLock<std::collections::HashMap<Uuid, ExecutionRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn admit(&self, strategy_id: &str, params: JobParams) -> Result<ExecutionRecord> {
        let mut map = self.inner.write().await;
        let active = map
            .values()
            .any(|r| r.strategy_id == strategy_id && !r.is_terminal());
        if active {
            return Err(JobError::Capacity {
                strategy_id: strategy_id.to_string(),
            });
        }
        let record = ExecutionRecord::new(strategy_id, params, Utc::now());
        map.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find(&self, id: Uuid) -> Result<ExecutionRecord> {
        self.inner
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound(id))
    }

    async fn find_active(&self, strategy_id: &str) -> Result<Option<ExecutionRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .values()
            .find(|r| r.strategy_id == strategy_id && !r.is_terminal())
            .cloned())
    }

    async fn mark_running(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut map = self.inner.write().await;
        let record = map.get_mut(&id).ok_or(JobError::NotFound(id))?;
        if record.status != JobStatus::Pending {
            return Err(JobError::Worker(format!(
                "PENDING 상태가 아니어서 실행 전이 불가: {} ({})",
                id, record.status
            )));
        }
        record.status = JobStatus::Running;
        record.updated_at = at;
        Ok(())
    }

    async fn write_progress(&self, id: Uuid, progress: u8, logs: &[String]) -> Result<()> {
        let mut map = self.inner.write().await;
        let record = map.get_mut(&id).ok_or(JobError::NotFound(id))?;
        if record.is_terminal() {
            return Ok(());
        }
        record.progress = record.progress.max(progress.min(100));
        record.logs.extend_from_slice(logs);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<JobFailure>,
        result: Option<BacktestReport>,
        at: DateTime<Utc>,
    ) -> Result<ExecutionRecord> {
        debug_assert!(status.is_terminal());
        let mut map = self.inner.write().await;
        let record = map.get_mut(&id).ok_or(JobError::NotFound(id))?;
        if record.is_terminal() {
            return Ok(record.clone());
        }
        record.status = status;
        record.error = error;
        record.result = result;
        if status == JobStatus::Finished {
            record.progress = 100;
        }
        record.updated_at = at;
        record.finished_at = Some(at);
        Ok(record.clone())
    }
}
