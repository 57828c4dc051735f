//! 캔들 수집 커맨드.

use anyhow::Context;
use tracing::info;

use backtest_data::{DataConfig, FetchRequest, HttpKlineSource, KlineFetcher};

use super::{parse_date, parse_timeframe};

pub struct FetchArgs {
    pub symbol: String,
    pub timeframe: String,
    pub from: String,
    pub to: String,
    pub output: Option<String>,
    pub lookback: u32,
}

pub async fn run_fetch(args: FetchArgs) -> anyhow::Result<()> {
    let timeframe = parse_timeframe(&args.timeframe)?;
    let request = FetchRequest {
        symbol: args.symbol.clone(),
        timeframe,
        start: parse_date(&args.from)?,
        end: parse_date(&args.to)?,
        lookback_count: args.lookback,
    };

    let config = DataConfig::from_env()?;
    let source = HttpKlineSource::new(&config)?;
    let fetcher = KlineFetcher::new(source, config);
    let klines = fetcher.fetch(&request).await?;

    info!(symbol = %args.symbol, count = klines.len(), "수집 완료");
    if let Some(path) = &args.output {
        write_csv(path, &klines)?;
        println!("캔들 {}개 → {}", klines.len(), path);
    } else if let (Some(first), Some(last)) = (klines.first(), klines.last()) {
        println!(
            "캔들 {}개: {} ~ {} (종가 {} → {})",
            klines.len(),
            first.open_time,
            last.close_time,
            first.close,
            last.close
        );
    } else {
        println!("수집된 캔들이 없습니다");
    }
    Ok(())
}

fn write_csv(path: &str, klines: &[backtest_core::Kline]) -> anyhow::Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("CSV 파일 생성 실패: {}", path))?;
    writer.write_record([
        "open_time", "close_time", "open", "high", "low", "close", "volume",
    ])?;
    for kline in klines {
        writer.write_record([
            kline.open_time.timestamp_millis().to_string(),
            kline.close_time.timestamp_millis().to_string(),
            kline.open.to_string(),
            kline.high.to_string(),
            kline.low.to_string(),
            kline.close.to_string(),
            kline.volume.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
