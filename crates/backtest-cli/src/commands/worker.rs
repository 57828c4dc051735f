//! 워커 모드 진입점.
//!
//! 오케스트레이터가 `backtest worker --execution-id <id>` 형태로
//! 스폰합니다. 신호 수신 시에도 상태 기록 후 종료 코드 0으로
//! 빠져나갑니다.

use std::sync::Arc;

use uuid::Uuid;

use backtest_job::{run_worker, JobConfig, JobStore, PgJobStore};

pub async fn run_worker_command(execution_id: Uuid) -> anyhow::Result<()> {
    let config = JobConfig::from_env()?;
    let store = PgJobStore::connect(&config.database_url).await?;
    let store: Arc<dyn JobStore> = Arc::new(store);
    run_worker(store, &config, execution_id).await?;
    Ok(())
}
