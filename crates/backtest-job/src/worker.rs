//! 워커 프로세스 본체.
//!
//! 오케스트레이터가 RUNNING으로 전이한 실행 하나를 맡아 별도 OS
//! 프로세스에서 시뮬레이션을 수행합니다. 시뮬레이션은 스폰된 태스크에서
//! 돌고, 본체는 신호와 진행률 기록을 감독합니다.
//!
//! # 종료 규약
//!
//! - SIGTERM 수신 → TIMEOUT 기록 후 종료 코드 0
//! - SIGINT 수신 → INTERUPTED 기록 후 종료 코드 0
//! - 시뮬레이션 에러/패닉 → FAILED (원인 사슬 포함)
//! - 정상 완료 → FINISHED + 결과 리포트
//!
//! 상태 기록은 저장소의 first-terminal-write-wins 규칙을 따르므로
//! 오케스트레이터와 경합해도 안전합니다.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use backtest_data::{DataConfig, FetchRequest, HttpKlineSource, KlineFetcher};
use backtest_engine::{BacktestEngine, BacktestReport, SmaCrossStrategy};

use crate::config::JobConfig;
use crate::error::{JobError, Result};
use crate::store::JobStore;
use crate::types::{JobFailure, JobParams, JobStatus};

/// 시뮬레이션 태스크의 결과
pub type SimulationOutcome =
    std::result::Result<BacktestReport, Box<dyn std::error::Error + Send + Sync>>;

/// 실행 하나를 처리합니다. 오케스트레이터가 RUNNING으로 전이한 뒤
/// 호출되는 것을 전제로 하며, 그렇지 않으면 아무것도 하지 않습니다.
#[instrument(skip(store, config))]
pub async fn run_worker(
    store: Arc<dyn JobStore>,
    config: &JobConfig,
    execution_id: Uuid,
) -> Result<()> {
    let record = store.find(execution_id).await?;
    if record.status != JobStatus::Running {
        warn!(id = %execution_id, status = %record.status, "RUNNING 상태가 아님, 워커 종료");
        return Ok(());
    }

    let (progress_tx, progress_rx) = watch::channel(0u8);
    let (log_tx, log_rx) = mpsc::unbounded_channel();
    let params = record.params.clone();
    let handle = tokio::spawn(simulate(params, progress_tx, log_tx));

    supervise(store, config, execution_id, handle, progress_rx, log_rx).await
}

/// 수집 → 엔진 실행. 진행률과 로그는 채널로 흘려보냅니다.
async fn simulate(
    params: JobParams,
    progress: watch::Sender<u8>,
    logs: mpsc::UnboundedSender<String>,
) -> SimulationOutcome {
    let data_config = DataConfig::from_env()?;
    let source = HttpKlineSource::new(&data_config)?;
    let fetcher = KlineFetcher::new(source, data_config);

    let _ = logs.send(format!(
        "캔들 수집 시작: {} {} ({} ~ {})",
        params.symbol, params.timeframe, params.start, params.end
    ));
    let request = FetchRequest {
        symbol: params.symbol.clone(),
        timeframe: params.timeframe,
        start: params.start,
        end: params.end,
        lookback_count: params.config.lookback_count,
    };
    let klines = fetcher.fetch(&request).await?;
    let _ = logs.send(format!("캔들 {}개 수집 완료", klines.len()));

    let mut engine = BacktestEngine::new(params.config.clone())?;
    let mut strategy =
        SmaCrossStrategy::new(params.strategy.fast_period, params.strategy.slow_period)
            .with_position_fraction(params.strategy.position_fraction);
    let report = engine
        .run(&mut strategy, &klines, |pct| {
            let _ = progress.send(pct);
        })
        .await?;
    let _ = logs.send(format!(
        "시뮬레이션 완료: 주문 {}건, 거래 {}건",
        report.orders.len(),
        report.trades.len()
    ));
    Ok(report)
}

/// 시뮬레이션 태스크를 감독합니다: 주기적 진행률 기록, 신호 처리,
/// 종료 시 터미널 상태 기록.
pub(crate) async fn supervise(
    store: Arc<dyn JobStore>,
    config: &JobConfig,
    execution_id: Uuid,
    handle: JoinHandle<SimulationOutcome>,
    progress_rx: watch::Receiver<u8>,
    log_rx: mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| JobError::Worker(format!("SIGTERM 핸들러 등록 실패: {}", e)))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| JobError::Worker(format!("SIGINT 핸들러 등록 실패: {}", e)))?;
    supervise_with(
        store,
        config,
        execution_id,
        handle,
        progress_rx,
        log_rx,
        async move {
            sigterm.recv().await;
        },
        async move {
            sigint.recv().await;
        },
    )
    .await
}

/// [`supervise`]의 본체. 신호 스트림을 인자로 받아 종료 규약을
/// 실제 신호 전달 없이도 검증할 수 있습니다.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn supervise_with<T, I>(
    store: Arc<dyn JobStore>,
    config: &JobConfig,
    execution_id: Uuid,
    handle: JoinHandle<SimulationOutcome>,
    progress_rx: watch::Receiver<u8>,
    mut log_rx: mpsc::UnboundedReceiver<String>,
    sigterm: T,
    sigint: I,
) -> Result<()>
where
    T: Future<Output = ()>,
    I: Future<Output = ()>,
{
    tokio::pin!(sigterm);
    tokio::pin!(sigint);
    let mut ticker = tokio::time::interval(config.progress_flush_interval());
    let mut handle = handle;

    loop {
        tokio::select! {
            _ = &mut sigterm => {
                warn!(id = %execution_id, "SIGTERM 수신, TIMEOUT 기록 후 종료");
                handle.abort();
                flush(&store, execution_id, &progress_rx, &mut log_rx).await?;
                store
                    .finish(
                        execution_id,
                        JobStatus::Timeout,
                        Some(JobFailure::new("SIGTERM 수신")),
                        None,
                        Utc::now(),
                    )
                    .await?;
                return Ok(());
            }
            _ = &mut sigint => {
                warn!(id = %execution_id, "SIGINT 수신, INTERUPTED 기록 후 종료");
                handle.abort();
                flush(&store, execution_id, &progress_rx, &mut log_rx).await?;
                store
                    .finish(
                        execution_id,
                        JobStatus::Interupted,
                        Some(JobFailure::new("SIGINT 수신")),
                        None,
                        Utc::now(),
                    )
                    .await?;
                return Ok(());
            }
            _ = ticker.tick() => {
                flush(&store, execution_id, &progress_rx, &mut log_rx).await?;
            }
            outcome = &mut handle => {
                flush(&store, execution_id, &progress_rx, &mut log_rx).await?;
                match outcome {
                    Ok(Ok(report)) => {
                        info!(id = %execution_id, "시뮬레이션 성공");
                        store
                            .finish(execution_id, JobStatus::Finished, None, Some(report), Utc::now())
                            .await?;
                    }
                    Ok(Err(e)) => {
                        warn!(id = %execution_id, error = %e, "시뮬레이션 실패");
                        store
                            .finish(
                                execution_id,
                                JobStatus::Failed,
                                Some(JobFailure::from_error(e.as_ref())),
                                None,
                                Utc::now(),
                            )
                            .await?;
                    }
                    Err(join_err) => {
                        warn!(id = %execution_id, error = %join_err, "시뮬레이션 태스크 이상 종료");
                        let mut failure = JobFailure::new("시뮬레이션 태스크 이상 종료");
                        failure.chain.push(join_err.to_string());
                        store
                            .finish(execution_id, JobStatus::Failed, Some(failure), None, Utc::now())
                            .await?;
                    }
                }
                return Ok(());
            }
        }
    }
}

/// 밀린 로그와 현재 진행률을 저장소에 기록
async fn flush(
    store: &Arc<dyn JobStore>,
    execution_id: Uuid,
    progress_rx: &watch::Receiver<u8>,
    log_rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    let mut lines = Vec::new();
    while let Ok(line) = log_rx.try_recv() {
        lines.push(line);
    }
    let progress = *progress_rx.borrow();
    store.write_progress(execution_id, progress, &lines).await
}
