//! 실행 접수와 워커 프로세스 감독.
//!
//! 워커는 별도 OS 프로세스로 스폰되어 전략 코드의 패닉/블로킹이
//! 오케스트레이터에 전파되지 않습니다. 하드 타임아웃을 넘기면 강제
//! 종료 후 TIMEOUT을 기록합니다.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::process::{Child, Command};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::JobConfig;
use crate::error::{JobError, Result};
use crate::store::JobStore;
use crate::types::{ExecutionRecord, JobFailure, JobParams, JobStatus};

/// 작업 오케스트레이터
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    config: JobConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>, config: JobConfig) -> Self {
        Self { store, config }
    }

    /// 실행 접수. 전략당 활성 실행 1건 제한은 저장소가 강제합니다.
    pub async fn schedule(&self, strategy_id: &str, params: JobParams) -> Result<ExecutionRecord> {
        self.store.admit(strategy_id, params).await
    }

    /// PENDING 실행을 워커 프로세스로 넘기고 종료까지 감독합니다.
    ///
    /// - 스폰 실패 → FAILED 기록 (RUNNING으로 방치하지 않음)
    /// - 타임아웃 → 강제 종료 후 TIMEOUT 기록
    /// - 종료 코드 0 → 워커가 기록한 터미널 상태를 그대로 반환
    /// - 비정상 종료 → FAILED 기록 (워커가 먼저 터미널을 기록했으면 무시됨)
    #[instrument(skip(self))]
    pub async fn dispatch(&self, execution_id: Uuid) -> Result<ExecutionRecord> {
        self.store.mark_running(execution_id, Utc::now()).await?;

        // 스폰에 실패해도 레코드가 RUNNING으로 남으면 안 됨: 전략 슬롯이
        // 영구히 점유되므로 FAILED를 먼저 기록한다
        let mut child = match self.spawn_worker(execution_id) {
            Ok(child) => child,
            Err(e) => {
                warn!(id = %execution_id, error = %e, "워커 스폰 실패, FAILED 기록");
                self.store
                    .finish(
                        execution_id,
                        JobStatus::Failed,
                        Some(JobFailure::new(e.to_string())),
                        None,
                        Utc::now(),
                    )
                    .await?;
                return Err(e);
            }
        };

        match tokio::time::timeout(self.config.worker_timeout(), child.wait()).await {
            // 하드 타임아웃: 강제 종료 후 TIMEOUT
            Err(_elapsed) => {
                warn!(id = %execution_id, timeout_ms = self.config.worker_timeout_ms, "워커 시간 초과, 강제 종료");
                if let Err(e) = child.start_kill() {
                    warn!(id = %execution_id, error = %e, "워커 강제 종료 실패");
                }
                let _ = child.wait().await;
                self.store
                    .finish(
                        execution_id,
                        JobStatus::Timeout,
                        Some(JobFailure::new("워커 하드 타임아웃 초과")),
                        None,
                        Utc::now(),
                    )
                    .await
            }
            Ok(Err(e)) => {
                self.store
                    .finish(
                        execution_id,
                        JobStatus::Failed,
                        Some(JobFailure::new(format!("워커 대기 실패: {}", e))),
                        None,
                        Utc::now(),
                    )
                    .await
            }
            Ok(Ok(exit)) if exit.success() => {
                // 정상 종료: 워커가 기록한 상태를 재조회
                let record = self.store.find(execution_id).await?;
                if record.is_terminal() {
                    Ok(record)
                } else {
                    self.store
                        .finish(
                            execution_id,
                            JobStatus::Failed,
                            Some(JobFailure::new("워커가 터미널 상태 기록 없이 종료됨")),
                            None,
                            Utc::now(),
                        )
                        .await
                }
            }
            Ok(Ok(exit)) => {
                let message = match exit.code() {
                    Some(code) => format!("워커 비정상 종료 (코드 {})", code),
                    None => "워커가 신호로 종료됨".to_string(),
                };
                warn!(id = %execution_id, %message, "워커 실패");
                self.store
                    .finish(
                        execution_id,
                        JobStatus::Failed,
                        Some(JobFailure::new(message)),
                        None,
                        Utc::now(),
                    )
                    .await
            }
        }
    }

    fn spawn_worker(&self, execution_id: Uuid) -> Result<Child> {
        let program = self.worker_program()?;
        info!(id = %execution_id, program = %program.display(), "워커 스폰");
        Command::new(&program)
            .arg("worker")
            .arg("--execution-id")
            .arg(execution_id.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::Worker(format!("워커 스폰 실패: {}", e)))
    }

    fn worker_program(&self) -> Result<PathBuf> {
        match &self.config.worker_program {
            Some(program) => Ok(PathBuf::from(program)),
            None => std::env::current_exe()
                .map_err(|e| JobError::Worker(format!("현재 실행 파일 경로 조회 실패: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::sample_params;
    use crate::store::MemoryJobStore;
    use std::os::unix::fs::PermissionsExt;

    /// 워커 대역 셸 스크립트 작성
    fn fake_worker(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("fake-worker.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn orchestrator_with(program: String, timeout_ms: u64) -> (Orchestrator, Arc<dyn JobStore>) {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
        let config = JobConfig {
            worker_program: Some(program),
            worker_timeout_ms: timeout_ms,
            ..JobConfig::default()
        };
        (Orchestrator::new(store.clone(), config), store)
    }

    #[tokio::test]
    async fn test_nonzero_exit_forces_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _store) = orchestrator_with(fake_worker(&dir, "exit 3"), 5_000);
        let record = orchestrator
            .schedule("sma-1", sample_params())
            .await
            .unwrap();

        let finished = orchestrator.dispatch(record.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(finished.error.unwrap().message.contains("3"));
    }

    #[tokio::test]
    async fn test_clean_exit_without_terminal_stamp_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _store) = orchestrator_with(fake_worker(&dir, "exit 0"), 5_000);
        let record = orchestrator
            .schedule("sma-1", sample_params())
            .await
            .unwrap();

        let finished = orchestrator.dispatch(record.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_hard_timeout_kills_worker_and_stamps_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _store) = orchestrator_with(fake_worker(&dir, "sleep 30"), 100);
        let record = orchestrator
            .schedule("sma-1", sample_params())
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let finished = orchestrator.dispatch(record.id).await.unwrap();
        assert_eq!(finished.status, JobStatus::Timeout);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_spawn_failure_stamps_failed_and_frees_capacity() {
        let (orchestrator, store) =
            orchestrator_with("/nonexistent/worker-binary".to_string(), 5_000);
        let record = orchestrator
            .schedule("sma-1", sample_params())
            .await
            .unwrap();

        assert!(orchestrator.dispatch(record.id).await.is_err());

        // RUNNING으로 방치되지 않고 FAILED가 기록됨
        let record = store.find(record.id).await.unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.error.unwrap().message.contains("스폰 실패"));

        // 터미널 기록으로 전략 슬롯이 해제되어 재접수 가능
        assert!(orchestrator.schedule("sma-1", sample_params()).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_requires_pending_record() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, store) = orchestrator_with(fake_worker(&dir, "exit 0"), 5_000);
        let record = orchestrator
            .schedule("sma-1", sample_params())
            .await
            .unwrap();
        store
            .finish(record.id, JobStatus::Interupted, None, None, Utc::now())
            .await
            .unwrap();

        assert!(orchestrator.dispatch(record.id).await.is_err());
    }
}
