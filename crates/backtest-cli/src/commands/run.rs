//! 로컬 백테스트 커맨드.
//!
//! 저장소 없이 수집 → 엔진 실행 → 요약 출력까지 한 번에 수행합니다.

use anyhow::Context;
use rust_decimal::Decimal;
use tracing::info;

use backtest_data::{DataConfig, FetchRequest, HttpKlineSource, KlineFetcher};
use backtest_engine::{BacktestConfig, BacktestEngine, BacktestReport, SmaCrossStrategy};

use super::{parse_date, parse_timeframe};

pub struct RunArgs {
    pub symbol: String,
    pub timeframe: String,
    pub from: String,
    pub to: String,
    pub capital: String,
    pub fast: usize,
    pub slow: usize,
    pub output: Option<String>,
}

pub async fn run_backtest(args: RunArgs) -> anyhow::Result<()> {
    let capital: Decimal = args
        .capital
        .parse()
        .with_context(|| format!("초기 자본 파싱 실패: {}", args.capital))?;
    let config = BacktestConfig::default().with_initial_capital(capital);

    let request = FetchRequest {
        symbol: args.symbol.clone(),
        timeframe: parse_timeframe(&args.timeframe)?,
        start: parse_date(&args.from)?,
        end: parse_date(&args.to)?,
        lookback_count: config.lookback_count,
    };

    let data_config = DataConfig::from_env()?;
    let source = HttpKlineSource::new(&data_config)?;
    let fetcher = KlineFetcher::new(source, data_config);
    let klines = fetcher.fetch(&request).await?;
    info!(symbol = %args.symbol, count = klines.len(), "캔들 수집 완료");

    let mut engine = BacktestEngine::new(config)?;
    let mut strategy = SmaCrossStrategy::new(args.fast, args.slow);
    let mut last_reported = 0u8;
    let report = engine
        .run(&mut strategy, &klines, |pct| {
            if pct >= last_reported.saturating_add(10) || pct == 100 {
                info!(progress = pct, "진행");
                last_reported = pct;
            }
        })
        .await?;

    print_summary(&report);
    if let Some(path) = &args.output {
        let file = std::fs::File::create(path)
            .with_context(|| format!("리포트 파일 생성 실패: {}", path))?;
        serde_json::to_writer_pretty(file, &report)?;
        println!("리포트 저장 → {}", path);
    }
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    let module = &report.module;
    println!("========== 백테스트 결과 ==========");
    println!("기간         : {} ~ {}", report.start, report.end);
    println!("캔들 수      : {}", report.kline_count);
    println!("주문 수      : {}", report.orders.len());
    println!("거래 수      : {}", report.trades.len());
    println!("초기 자본    : {}", module.initial_capital);
    println!("최종 자본    : {}", module.equity);
    println!("실현 손익    : {}", module.realized_return);
    println!(
        "수수료       : 자본 {} / 자산 {}",
        module.fees.capital, module.fees.asset
    );
    println!("최대 낙폭    : {}", module.max_drawdown);
    println!("최대 상승    : {}", module.max_run_up);
}
