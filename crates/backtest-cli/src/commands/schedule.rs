//! 실행 접수/디스패치 커맨드.

use std::sync::Arc;

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::info;

use backtest_engine::BacktestConfig;
use backtest_job::{JobConfig, JobParams, JobStore, Orchestrator, PgJobStore, SmaParams};

use super::{parse_date, parse_timeframe};

pub struct ScheduleArgs {
    pub strategy_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub from: String,
    pub to: String,
    pub capital: String,
    pub fast: usize,
    pub slow: usize,
}

pub async fn run_schedule(args: ScheduleArgs) -> anyhow::Result<()> {
    let capital: Decimal = args
        .capital
        .parse()
        .with_context(|| format!("초기 자본 파싱 실패: {}", args.capital))?;
    let params = JobParams {
        symbol: args.symbol.clone(),
        timeframe: parse_timeframe(&args.timeframe)?,
        start: parse_date(&args.from)?,
        end: parse_date(&args.to)?,
        config: BacktestConfig::default().with_initial_capital(capital),
        strategy: SmaParams {
            fast_period: args.fast,
            slow_period: args.slow,
            ..SmaParams::default()
        },
    };

    let config = JobConfig::from_env()?;
    let store = PgJobStore::connect(&config.database_url).await?;
    store.ensure_schema().await?;
    let store: Arc<dyn JobStore> = Arc::new(store);
    let orchestrator = Orchestrator::new(store, config);

    let record = orchestrator.schedule(&args.strategy_id, params).await?;
    info!(id = %record.id, strategy_id = %args.strategy_id, "실행 접수 완료");
    println!("실행 접수: {}", record.id);

    let finished = orchestrator.dispatch(record.id).await?;
    println!("실행 종료: {} ({})", finished.id, finished.status);
    if let Some(failure) = &finished.error {
        println!("실패 원인: {}", failure.message);
    }
    if let Some(result) = &finished.result {
        println!(
            "최종 자본 {} / 거래 {}건",
            result.module.equity,
            result.trades.len()
        );
    }
    Ok(())
}
