//! 캔들(Kline)과 타임프레임 정의.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

// ==================== 타임프레임 ====================

/// 캔들 타임프레임
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1s")]
    S1,
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    MN1,
}

/// 타임프레임 등급. 데이터 수집 채널 선택에 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeframeClass {
    /// 분 이하 (1s, 1m)
    Minute,
    /// 3m ~ 4h
    Intraday,
    /// 6h 이상
    Coarse,
}

impl Timeframe {
    /// 캔들 하나가 덮는 시간. 1M은 명목상 30일로 취급합니다.
    pub fn step(&self) -> Duration {
        match self {
            Self::S1 => Duration::seconds(1),
            Self::M1 => Duration::minutes(1),
            Self::M3 => Duration::minutes(3),
            Self::M5 => Duration::minutes(5),
            Self::M15 => Duration::minutes(15),
            Self::M30 => Duration::minutes(30),
            Self::H1 => Duration::hours(1),
            Self::H2 => Duration::hours(2),
            Self::H4 => Duration::hours(4),
            Self::H6 => Duration::hours(6),
            Self::H8 => Duration::hours(8),
            Self::H12 => Duration::hours(12),
            Self::D1 => Duration::days(1),
            Self::D3 => Duration::days(3),
            Self::W1 => Duration::weeks(1),
            Self::MN1 => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S1 => "1s",
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
            Self::MN1 => "1M",
        }
    }

    pub fn class(&self) -> TimeframeClass {
        match self {
            Self::S1 | Self::M1 => TimeframeClass::Minute,
            Self::M3 | Self::M5 | Self::M15 | Self::M30 | Self::H1 | Self::H2 | Self::H4 => {
                TimeframeClass::Intraday
            }
            Self::H6 | Self::H8 | Self::H12 | Self::D1 | Self::D3 | Self::W1 | Self::MN1 => {
                TimeframeClass::Coarse
            }
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1s" => Ok(Self::S1),
            "1m" => Ok(Self::M1),
            "3m" => Ok(Self::M3),
            "5m" => Ok(Self::M5),
            "15m" => Ok(Self::M15),
            "30m" => Ok(Self::M30),
            "1h" => Ok(Self::H1),
            "2h" => Ok(Self::H2),
            "4h" => Ok(Self::H4),
            "6h" => Ok(Self::H6),
            "8h" => Ok(Self::H8),
            "12h" => Ok(Self::H12),
            "1d" => Ok(Self::D1),
            "3d" => Ok(Self::D3),
            "1w" => Ok(Self::W1),
            "1M" => Ok(Self::MN1),
            other => Err(CoreError::UnknownTimeframe(other.to_string())),
        }
    }
}

// ==================== 캔들 ====================

/// OHLCV 캔들.
///
/// 조회 이후 불변이며 (exchange, symbol, timeframe, close_time)으로
/// 유일하게 식별됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Option<Decimal>,
    pub num_trades: Option<i64>,
}

impl Kline {
    /// 캔들 무결성 검증: 시간 순서, 양수 가격, 비음수 거래량.
    pub fn validate(&self) -> CoreResult<()> {
        if self.open_time >= self.close_time {
            return Err(CoreError::Validation(format!(
                "캔들 시간 역전: open={} close={}",
                self.open_time, self.close_time
            )));
        }
        for (name, price) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if price <= Decimal::ZERO {
                return Err(CoreError::Validation(format!(
                    "{} 가격이 양수가 아님: {}",
                    name, price
                )));
            }
        }
        if self.low > self.high {
            return Err(CoreError::Validation(format!(
                "low({}) > high({})",
                self.low, self.high
            )));
        }
        if self.volume < Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "거래량이 음수: {}",
                self.volume
            )));
        }
        if let Some(qv) = self.quote_volume {
            if qv < Decimal::ZERO {
                return Err(CoreError::Validation(format!("거래대금이 음수: {}", qv)));
            }
        }
        if let Some(n) = self.num_trades {
            if n < 0 {
                return Err(CoreError::Validation(format!("거래 횟수가 음수: {}", n)));
            }
        }
        Ok(())
    }

    /// 가격이 캔들 범위 `[low, high]`에 포함되는가
    pub fn contains(&self, price: Decimal) -> bool {
        self.low <= price && price <= self.high
    }
}
