//! 데이터 소스 추상화.
//!
//! 라이브 페이지 조회와 아카이브 파일 다운로드를 하나의 트레이트로
//! 묶습니다. 404는 [`DataError::NotFound`]로 구분해 반환해야 합니다.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

use backtest_core::{Kline, Timeframe};

use crate::config::DataConfig;
use crate::error::{DataError, Result};
use crate::retry::{with_retry, RetryConfig};

/// 캔들 데이터 소스.
///
/// 라이브 조회는 `limit` 행 단위로 페이지되며, 아카이브 다운로드는
/// 압축 파일 바이트를 그대로 반환합니다.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 시간 범위 `[start, end]`의 캔들을 최대 `limit`개 조회
    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Kline>>;

    /// 아카이브 파일 다운로드. 404는 `DataError::NotFound`
    async fn download_archive(&self, url: &str) -> Result<Vec<u8>>;
}

// ==================== HTTP 구현 ====================

/// reqwest 기반 소스 구현
pub struct HttpKlineSource {
    client: reqwest::Client,
    exchange: String,
    api_base_url: String,
    retry: RetryConfig,
}

impl HttpKlineSource {
    pub fn new(config: &DataConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            exchange: config.exchange.clone(),
            api_base_url: config.api_base_url.clone(),
            retry: config.retry.clone(),
        })
    }
}

#[async_trait]
impl MarketDataSource for HttpKlineSource {
    #[instrument(skip(self), fields(symbol = symbol, tf = %timeframe))]
    async fn fetch_page(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Kline>> {
        let url = format!("{}/api/v3/klines", self.api_base_url);
        let rows: Vec<Vec<serde_json::Value>> = with_retry(&self.retry, "fetch_page", || {
            let request = self
                .client
                .get(&url)
                .query(&[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.as_str().to_string()),
                    ("startTime", start.timestamp_millis().to_string()),
                    ("endTime", end.timestamp_millis().to_string()),
                    ("limit", limit.to_string()),
                ])
                .send();
            let url = url.clone();
            async move {
                let response = request.await?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(DataError::NotFound(url));
                }
                if !response.status().is_success() {
                    return Err(DataError::Transport(format!(
                        "캔들 조회 실패: HTTP {}",
                        response.status()
                    )));
                }
                Ok(response.json().await?)
            }
        })
        .await?;

        debug!(rows = rows.len(), "캔들 페이지 수신");
        rows.iter()
            .map(|row| parse_kline_row(row, &self.exchange, symbol, timeframe))
            .collect()
    }

    #[instrument(skip(self))]
    async fn download_archive(&self, url: &str) -> Result<Vec<u8>> {
        with_retry(&self.retry, "download_archive", || {
            let request = self.client.get(url).send();
            let url = url.to_string();
            async move {
                let response = request.await?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(DataError::NotFound(url));
                }
                if !response.status().is_success() {
                    return Err(DataError::Transport(format!(
                        "아카이브 다운로드 실패: HTTP {} ({})",
                        response.status(),
                        url
                    )));
                }
                Ok(response.bytes().await?.to_vec())
            }
        })
        .await
    }
}

// ==================== 행 파싱 ====================

/// 밀리초/마이크로초 타임스탬프를 정규화합니다.
/// (일부 아카이브는 마이크로초 단위를 사용)
pub(crate) fn timestamp_to_datetime(raw: i64) -> Result<DateTime<Utc>> {
    let millis = if raw > 100_000_000_000_000 {
        raw / 1000
    } else {
        raw
    };
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| DataError::Parse(format!("잘못된 타임스탬프: {}", raw)))
}

fn value_to_decimal(value: &serde_json::Value, field: &str) -> Result<Decimal> {
    let parsed = match value {
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| DataError::Parse(format!("{} 필드 파싱 실패: {}", field, value)))
}

fn value_to_i64(value: &serde_json::Value, field: &str) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| DataError::Parse(format!("{} 필드 파싱 실패: {}", field, value)))
}

/// 라이브 조회 응답의 행 하나를 캔들로 변환합니다.
///
/// 행 형식: `[openTime, open, high, low, close, volume, closeTime,
/// quoteVolume, numTrades, ...]`
pub(crate) fn parse_kline_row(
    row: &[serde_json::Value],
    exchange: &str,
    symbol: &str,
    timeframe: Timeframe,
) -> Result<Kline> {
    if row.len() < 7 {
        return Err(DataError::Parse(format!(
            "캔들 행 필드 부족: {}개",
            row.len()
        )));
    }
    let kline = Kline {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
        timeframe,
        open_time: timestamp_to_datetime(value_to_i64(&row[0], "open_time")?)?,
        close_time: timestamp_to_datetime(value_to_i64(&row[6], "close_time")?)?,
        open: value_to_decimal(&row[1], "open")?,
        high: value_to_decimal(&row[2], "high")?,
        low: value_to_decimal(&row[3], "low")?,
        close: value_to_decimal(&row[4], "close")?,
        volume: value_to_decimal(&row[5], "volume")?,
        quote_volume: row.get(7).map(|v| value_to_decimal(v, "quote_volume")).transpose()?,
        num_trades: row.get(8).map(|v| value_to_i64(v, "num_trades")).transpose()?,
    };
    kline.validate()?;
    Ok(kline)
}
