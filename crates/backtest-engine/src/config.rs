//! 백테스트 설정.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

fn default_initial_capital() -> Decimal {
    dec!(10000)
}

fn default_maker_fee_rate() -> Decimal {
    dec!(0.02)
}

fn default_taker_fee_rate() -> Decimal {
    dec!(0.04)
}

fn default_lookback_count() -> u32 {
    100
}

/// 백테스트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// 초기 자본 (자본 통화)
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,

    /// 메이커 수수료율 (%)
    #[serde(default = "default_maker_fee_rate")]
    pub maker_fee_rate: Decimal,

    /// 테이커 수수료율 (%)
    #[serde(default = "default_taker_fee_rate")]
    pub taker_fee_rate: Decimal,

    /// 전략 워밍업용 추가 캔들 수
    #[serde(default = "default_lookback_count")]
    pub lookback_count: u32,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            maker_fee_rate: default_maker_fee_rate(),
            taker_fee_rate: default_taker_fee_rate(),
            lookback_count: default_lookback_count(),
        }
    }
}

impl BacktestConfig {
    pub fn with_initial_capital(mut self, capital: Decimal) -> Self {
        self.initial_capital = capital;
        self
    }

    pub fn with_fee_rates(mut self, maker: Decimal, taker: Decimal) -> Self {
        self.maker_fee_rate = maker;
        self.taker_fee_rate = taker;
        self
    }

    pub fn with_lookback_count(mut self, count: u32) -> Self {
        self.lookback_count = count;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(EngineError::Config(format!(
                "초기 자본은 양수여야 함: {}",
                self.initial_capital
            )));
        }
        for (name, rate) in [
            ("maker_fee_rate", self.maker_fee_rate),
            ("taker_fee_rate", self.taker_fee_rate),
        ] {
            if rate < Decimal::ZERO || rate >= dec!(100) {
                return Err(EngineError::Config(format!(
                    "{}는 0 이상 100 미만이어야 함: {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = BacktestConfig::default()
            .with_initial_capital(dec!(5000))
            .with_fee_rates(dec!(0.1), dec!(0.2))
            .with_lookback_count(50);
        assert_eq!(config.initial_capital, dec!(5000));
        assert_eq!(config.taker_fee_rate, dec!(0.2));
        assert_eq!(config.lookback_count, 50);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(BacktestConfig::default()
            .with_initial_capital(dec!(0))
            .validate()
            .is_err());
        assert!(BacktestConfig::default()
            .with_fee_rates(dec!(-1), dec!(0.1))
            .validate()
            .is_err());
        assert!(BacktestConfig::default()
            .with_fee_rates(dec!(0.1), dec!(100))
            .validate()
            .is_err());
    }
}
