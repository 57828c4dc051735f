//! 데이터 수집 설정.
//!
//! 비용 임계치와 베이스 URL은 전역 상태가 아니라 이 구조체로 주입됩니다.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DataError, Result};
use crate::retry::RetryConfig;

/// 수집 캐스케이드 설정
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// 거래소 식별자 (캔들 레코드에 기록)
    pub exchange: String,
    /// 라이브 조회 API 베이스 URL
    pub api_base_url: String,
    /// 아카이브 파일 베이스 URL
    pub archive_base_url: String,
    /// 라이브 조회 허용 최대 호출 수
    pub max_live_calls: u64,
    /// 라이브 호출 수가 월별 파일 수의 몇 배까지 허용되는지
    pub live_per_monthly_multiple: u64,
    /// 일별 아카이브 허용 최대 파일 수
    pub max_daily_files: u64,
    /// 범위 꼬리에서 404를 허용하고 폴백할 기간(일/월) 수
    pub trailing_fallback_periods: usize,
    /// 라이브 조회 페이지당 최대 행 수
    pub page_limit: u32,
    /// 순차 아카이브 다운로드 사이 지연 (ms)
    pub download_delay_ms: u64,
    /// 일시적 전송 실패 재시도 설정
    pub retry: RetryConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            exchange: "binance".to_string(),
            api_base_url: "https://api.binance.com".to_string(),
            archive_base_url: "https://data.binance.vision".to_string(),
            max_live_calls: 10,
            live_per_monthly_multiple: 5,
            max_daily_files: 10,
            trailing_fallback_periods: 2,
            page_limit: 1000,
            download_delay_ms: 200,
            retry: RetryConfig::default(),
        }
    }
}

impl DataConfig {
    /// 환경변수에서 설정 로드. 없는 값은 기본값을 사용합니다.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            exchange: env::var("DATA_EXCHANGE").unwrap_or(defaults.exchange),
            api_base_url: env::var("DATA_API_BASE_URL").unwrap_or(defaults.api_base_url),
            archive_base_url: env::var("DATA_ARCHIVE_BASE_URL")
                .unwrap_or(defaults.archive_base_url),
            max_live_calls: env_var_parse("DATA_MAX_LIVE_CALLS", defaults.max_live_calls)?,
            live_per_monthly_multiple: env_var_parse(
                "DATA_LIVE_PER_MONTHLY_MULTIPLE",
                defaults.live_per_monthly_multiple,
            )?,
            max_daily_files: env_var_parse("DATA_MAX_DAILY_FILES", defaults.max_daily_files)?,
            trailing_fallback_periods: env_var_parse(
                "DATA_TRAILING_FALLBACK_PERIODS",
                defaults.trailing_fallback_periods,
            )?,
            page_limit: env_var_parse("DATA_PAGE_LIMIT", defaults.page_limit)?,
            download_delay_ms: env_var_parse("DATA_DOWNLOAD_DELAY_MS", defaults.download_delay_ms)?,
            retry: RetryConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_limit == 0 {
            return Err(DataError::InvalidRange(
                "page_limit은 1 이상이어야 함".to_string(),
            ));
        }
        if self.api_base_url.is_empty() || self.archive_base_url.is_empty() {
            return Err(DataError::InvalidRange(
                "베이스 URL이 비어 있음".to_string(),
            ));
        }
        Ok(())
    }

    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }
}

/// 환경변수를 파싱하고, 없으면 기본값을 반환합니다.
fn env_var_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| DataError::Parse(format!("{} 환경변수 파싱 실패: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DataConfig::default();
        assert_eq!(config.max_live_calls, 10);
        assert_eq!(config.live_per_monthly_multiple, 5);
        assert_eq!(config.max_daily_files, 10);
        assert_eq!(config.trailing_fallback_periods, 2);
        assert_eq!(config.page_limit, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_page_limit() {
        let config = DataConfig {
            page_limit: 0,
            ..DataConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
