//! CLI 서브커맨드 구현.

pub mod fetch;
pub mod migrate;
pub mod run;
pub mod schedule;
pub mod worker;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

use backtest_core::Timeframe;

/// `YYYY-MM-DD` 날짜를 UTC 자정으로 파싱
pub fn parse_date(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("날짜 형식이 잘못됨 (YYYY-MM-DD): {}", raw))?;
    let naive = date
        .and_hms_opt(0, 0, 0)
        .with_context(|| format!("날짜 변환 실패: {}", raw))?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}

pub fn parse_timeframe(raw: &str) -> anyhow::Result<Timeframe> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("타임프레임 파싱 실패: {}", e))
}
