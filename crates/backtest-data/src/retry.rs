//! 일시적 전송 실패 재시도.
//!
//! 지수 백오프 + 지터. 404는 재시도하지 않습니다 (아카이브 폴백
//! 판정에 즉시 필요).

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::Result;

/// 재시도 설정
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (첫 시도 제외)
    pub max_retries: u32,
    /// 기본 지연
    pub base_delay: Duration,
    /// 지연 상한
    pub max_delay: Duration,
    /// 백오프 배수
    pub backoff_multiplier: f64,
    /// 지터 추가 여부
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// 재시도 없음 (테스트용)
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// n번째 재시도 전 대기 시간
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64;
        let mut delay_ms = base * self.backoff_multiplier.powi(attempt as i32);
        if delay_ms > self.max_delay.as_millis() as f64 {
            delay_ms = self.max_delay.as_millis() as f64;
        }
        if self.add_jitter {
            let jitter = rand::thread_rng().gen_range(0.0..0.25);
            delay_ms *= 1.0 + jitter;
        }
        Duration::from_millis(delay_ms as u64)
    }
}

/// 일시적 실패에 한해 재시도하며 연산을 실행합니다.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, op_name: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                let delay = config.calculate_delay(attempt);
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "일시적 실패, 재시도"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
